// Per-dimension derivations: producer event → snapshot fields. Pure, clamped, total.

use crate::models::{
    DnsRaceResult, DnsRaceSample, GameSnapshot, RouteSnapshot, RouteStatus, StreamingSnapshot,
    Transport,
};

const BYTES_PER_MB: f64 = 1_000_000.0;

/// rx + tx in MB/s.
pub fn throughput_mbps(combined_bytes_per_sec: f64) -> f64 {
    let mbps = combined_bytes_per_sec / BYTES_PER_MB;
    if mbps.is_finite() { mbps.max(0.0) } else { 0.0 }
}

/// Busiest outbound tag while the routing table is ACTIVE. Ties go to the
/// lexicographically smallest tag; tags without connections never win.
pub fn current_outbound_tag(route: &RouteSnapshot) -> Option<String> {
    if route.status != RouteStatus::Active {
        return None;
    }
    route
        .outbound_tags
        .iter()
        .filter(|(_, connections)| **connections > 0)
        .fold(None::<(&String, u32)>, |best, (tag, &connections)| match best {
            Some((_, best_connections)) if best_connections >= connections => best,
            _ => Some((tag, connections)),
        })
        .map(|(tag, _)| tag.clone())
}

/// QUIC holds a strict majority of active session transports. With no sessions the
/// transport preferences decide instead.
pub fn is_quic_dominant(streaming: &StreamingSnapshot) -> bool {
    let (quic, total) = if streaming.active_sessions.is_empty() {
        let prefs = streaming.transport_preferences.values();
        (prefs.clone().filter(|&&t| t == Transport::Quic).count(), prefs.len())
    } else {
        (
            streaming.active_quic_sessions(),
            streaming.active_sessions.len(),
        )
    };
    total > 0 && quic * 2 > total
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPathFields {
    pub active_path_count: u32,
    pub session_pin_status: Option<String>,
    pub rtt_spread_ms: u32,
    pub path_race_winner: Option<String>,
}

pub fn multipath_fields(game: &GameSnapshot) -> MultiPathFields {
    let active_path_count = u32::try_from(game.pinned_routes.len()).unwrap_or(u32::MAX);
    let session_pin_status = (active_path_count > 0).then(|| format!("PINNED:{active_path_count}"));

    let mut raced: Vec<(&String, f64)> = game
        .route_rtt_ms
        .iter()
        .filter(|(_, rtt)| rtt.is_finite() && **rtt >= 0.0)
        .map(|(route, &rtt)| (route, rtt))
        .collect();
    // stable sort keeps name order among equal RTTs
    raced.sort_by(|a, b| a.1.total_cmp(&b.1));

    let rtt_spread_ms = match (raced.first(), raced.last()) {
        (Some(fastest), Some(slowest)) if raced.len() >= 2 => clamp_ms(slowest.1 - fastest.1),
        _ => clamp_ms(game.smoothed_rtt_ms),
    };
    let path_race_winner = raced
        .first()
        .map(|(route, _)| (*route).clone())
        .or_else(|| game.pinned_routes.iter().next().cloned());

    MultiPathFields {
        active_path_count,
        session_pin_status,
        rtt_spread_ms,
        path_race_winner,
    }
}

/// Results ordered fastest first; the fastest resolver wins and every other
/// result carries its lag behind the winner.
pub fn dns_race_results(sample: &DnsRaceSample) -> Vec<DnsRaceResult> {
    let mut probes: Vec<_> = sample.results.iter().collect();
    probes.sort_by(|a, b| {
        a.latency_ms
            .cmp(&b.latency_ms)
            .then_with(|| a.resolver.cmp(&b.resolver))
    });
    let Some(winner_latency) = probes.first().map(|p| p.latency_ms) else {
        return Vec::new();
    };
    probes
        .into_iter()
        .enumerate()
        .map(|(i, p)| DnsRaceResult {
            resolver: p.resolver.clone(),
            delta_ms: p.latency_ms.saturating_sub(winner_latency),
            is_winner: i == 0,
            ttl_seconds: p.ttl_seconds,
        })
        .collect()
}

fn clamp_ms(ms: f64) -> u32 {
    if !ms.is_finite() || ms <= 0.0 {
        return 0;
    }
    ms.round().min(u32::MAX as f64) as u32
}
