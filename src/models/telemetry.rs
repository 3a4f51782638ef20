// Raw events emitted by the upstream producers (traffic meter, routing table,
// transport tracker, path optimizer, DNS racer)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One traffic meter reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSample {
    /// Monotonic milliseconds on the producer's clock.
    pub timestamp_ms: u64,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
}

impl TrafficSample {
    /// rx + tx in bytes/sec; non-finite or negative rates count as 0.
    pub fn combined_speed(&self) -> f64 {
        non_negative(self.rx_bytes_per_sec) + non_negative(self.tx_bytes_per_sec)
    }
}

pub(crate) fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStatus {
    Active,
    Error,
    Idle,
    #[serde(other)]
    Unknown,
}

/// Routing table view: outbound tag → live connection count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    pub outbound_tags: BTreeMap<String, u32>,
    pub status: RouteStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Transport {
    Quic,
    Tcp,
    Udp,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingSession {
    pub transport: Transport,
}

/// Transport-preference tracker view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingSnapshot {
    /// Domain → preferred transport.
    #[serde(default)]
    pub transport_preferences: BTreeMap<String, Transport>,
    /// Session id → session.
    #[serde(default)]
    pub active_sessions: BTreeMap<String, StreamingSession>,
}

impl StreamingSnapshot {
    pub fn active_quic_sessions(&self) -> usize {
        self.active_sessions
            .values()
            .filter(|s| s.transport == Transport::Quic)
            .count()
    }
}

/// Path/game optimizer view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    #[serde(default)]
    pub pinned_routes: BTreeSet<String>,
    #[serde(default)]
    pub smoothed_rtt_ms: f64,
    /// Per-route RTT, when the optimizer races paths individually.
    #[serde(default)]
    pub route_rtt_ms: BTreeMap<String, f64>,
}

/// One resolver's answer in a parallel DNS lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsProbe {
    pub resolver: String,
    pub latency_ms: u64,
    pub ttl_seconds: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRaceSample {
    pub results: Vec<DnsProbe>,
}
