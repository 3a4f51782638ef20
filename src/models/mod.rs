// Domain models: the published snapshot and the producer-side telemetry events

mod snapshot;
mod telemetry;

pub use snapshot::{DnsRaceResult, HyperSnapshot, PathStatus, QuicWarmupState};
pub use telemetry::{
    DnsProbe, DnsRaceSample, GameSnapshot, RouteSnapshot, RouteStatus, StreamingSession,
    StreamingSnapshot, TrafficSample, Transport,
};
