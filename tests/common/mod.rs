// Shared test helpers
#![allow(dead_code)]

use hyperstats::config::EngineConfig;
use hyperstats::models::*;
use std::collections::{BTreeMap, BTreeSet};

pub fn engine_config() -> EngineConfig {
    EngineConfig::default()
}

/// Traffic sample carrying `mbps` MB/s split evenly between rx and tx.
pub fn traffic(timestamp_ms: u64, mbps: f64) -> TrafficSample {
    TrafficSample {
        timestamp_ms,
        rx_bytes_per_sec: mbps * 500_000.0,
        tx_bytes_per_sec: mbps * 500_000.0,
    }
}

pub fn route(tag: &str, connections: u32) -> RouteSnapshot {
    RouteSnapshot {
        outbound_tags: BTreeMap::from([(tag.to_string(), connections)]),
        status: RouteStatus::Active,
    }
}

pub fn game(paths: &[&str], smoothed_rtt_ms: f64) -> GameSnapshot {
    GameSnapshot {
        pinned_routes: paths.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
        smoothed_rtt_ms,
        route_rtt_ms: BTreeMap::new(),
    }
}

pub fn streaming(quic_sessions: usize, tcp_sessions: usize) -> StreamingSnapshot {
    let mut active_sessions = BTreeMap::new();
    for i in 0..quic_sessions {
        active_sessions.insert(
            format!("quic-{i}"),
            StreamingSession {
                transport: Transport::Quic,
            },
        );
    }
    for i in 0..tcp_sessions {
        active_sessions.insert(
            format!("tcp-{i}"),
            StreamingSession {
                transport: Transport::Tcp,
            },
        );
    }
    StreamingSnapshot {
        transport_preferences: BTreeMap::new(),
        active_sessions,
    }
}
