// Library for tests to access modules

pub mod aggregator;
pub mod burst;
pub mod bus;
pub mod config;
pub mod error;
pub mod gate;
pub mod hub;
pub mod jitter;
pub mod models;
pub mod routes;
pub mod subscribers;
pub mod traffic_meter;
pub mod version;
pub mod warmup;
