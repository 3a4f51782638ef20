// HyperSnapshot: the one canonical aggregate published to dashboards

use serde::{Deserialize, Serialize};

/// Multi-path health derived from the number of active paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathStatus {
    #[default]
    Unknown,
    Stabilizing,
    Racing,
    Dropping,
}

impl PathStatus {
    /// 0 paths → DROPPING, 1 → STABILIZING, more → RACING.
    pub fn from_active_paths(count: u32) -> Self {
        match count {
            0 => PathStatus::Dropping,
            1 => PathStatus::Stabilizing,
            _ => PathStatus::Racing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuicWarmupState {
    #[default]
    Idle,
    Warming,
    Ready,
    Timeout,
}

/// One resolver's result in a parallel DNS race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRaceResult {
    pub resolver: String,
    /// Milliseconds behind the winning resolver (0 for the winner).
    pub delta_ms: u64,
    pub is_winner: bool,
    pub ttl_seconds: u32,
}

/// Immutable aggregate of every telemetry dimension. New values are derived with
/// struct update syntax from the previous snapshot; a published value is never mutated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HyperSnapshot {
    /// Wall-clock epoch milliseconds of the derivation.
    pub timestamp: u64,
    #[serde(rename = "throughputMBps")]
    pub throughput_mbps: f64,
    /// Always within [0, 1].
    pub burst_intensity: f64,
    pub is_quic_dominant: bool,
    /// Oldest first; never longer than the jitter history capacity.
    pub jitter_history: Vec<f64>,
    pub current_outbound_tag: Option<String>,
    pub session_pin_status: Option<String>,
    pub path_race_winner: Option<String>,
    pub path_status: PathStatus,
    pub active_path_count: u32,
    pub rtt_spread_ms: u32,
    pub dns_race_results: Vec<DnsRaceResult>,
    pub quic_warmup_state: QuicWarmupState,
    pub quic_warmup_time_remaining_ms: u64,
    pub packet_burst_count: u32,
    pub packets_per_second: u32,
}

impl HyperSnapshot {
    /// Value equality on everything except `timestamp`.
    ///
    /// Two derivations of the same state at different instants are the same content.
    pub fn same_content(&self, other: &Self) -> bool {
        self.same_traffic(other) && !self.differs_beyond_traffic(other)
    }

    /// True when any non-traffic dimension (routing, QUIC, paths, DNS) differs.
    pub fn differs_beyond_traffic(&self, other: &Self) -> bool {
        let Self {
            timestamp: _,
            throughput_mbps: _,
            burst_intensity: _,
            jitter_history: _,
            packet_burst_count: _,
            packets_per_second: _,
            is_quic_dominant,
            current_outbound_tag,
            session_pin_status,
            path_race_winner,
            path_status,
            active_path_count,
            rtt_spread_ms,
            dns_race_results,
            quic_warmup_state,
            quic_warmup_time_remaining_ms,
        } = self;
        *is_quic_dominant != other.is_quic_dominant
            || *current_outbound_tag != other.current_outbound_tag
            || *session_pin_status != other.session_pin_status
            || *path_race_winner != other.path_race_winner
            || *path_status != other.path_status
            || *active_path_count != other.active_path_count
            || *rtt_spread_ms != other.rtt_spread_ms
            || *dns_race_results != other.dns_race_results
            || *quic_warmup_state != other.quic_warmup_state
            || *quic_warmup_time_remaining_ms != other.quic_warmup_time_remaining_ms
    }

    fn same_traffic(&self, other: &Self) -> bool {
        self.throughput_mbps == other.throughput_mbps
            && self.burst_intensity == other.burst_intensity
            && self.jitter_history == other.jitter_history
            && self.packet_burst_count == other.packet_burst_count
            && self.packets_per_second == other.packets_per_second
    }
}
