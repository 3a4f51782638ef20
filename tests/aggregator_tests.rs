// Aggregator tests: per-dimension derivation, gating and bus delivery, driven with
// explicit monotonic timestamps.

mod common;

use common::*;
use hyperstats::aggregator::{SnapshotAggregator, Update};
use hyperstats::bus::SnapshotBus;
use hyperstats::gate::GateDecision;
use hyperstats::models::*;

fn aggregator() -> (SnapshotAggregator, SnapshotBus) {
    let config = engine_config();
    let bus = SnapshotBus::new(config.bus());
    let agg = SnapshotAggregator::new(&config, bus.clone()).with_wall_origin(1_000_000);
    (agg, bus)
}

#[test]
fn first_update_publishes_copy_of_default_with_change() {
    let (mut agg, bus) = aggregator();
    let decision = agg.apply(Update::Route(route("proxy-hk", 2)), 5);
    assert_eq!(decision, Some(GateDecision::Publish));

    let current = bus.current_snapshot();
    assert_eq!(current.current_outbound_tag.as_deref(), Some("proxy-hk"));
    assert_eq!(current.timestamp, 1_000_005);
    assert_eq!(current.path_status, PathStatus::Unknown);
    assert_eq!(current.throughput_mbps, 0.0);
}

#[test]
fn throughput_update_derives_traffic_fields() {
    let (mut agg, bus) = aggregator();
    agg.apply_throughput(traffic(100, 8.0), 0);
    let s = bus.current_snapshot();
    assert_eq!(s.throughput_mbps, 8.0);
    assert_eq!(s.jitter_history, vec![0.0]);
    assert_eq!(s.packet_burst_count, 1);
    assert_eq!(s.packets_per_second, 1);
    assert!(s.burst_intensity > 0.0 && s.burst_intensity <= 1.0);
}

#[test]
fn jitter_history_stays_bounded() {
    let (mut agg, _bus) = aggregator();
    for i in 0..500u64 {
        agg.apply_throughput(traffic(i * 10, (i % 7) as f64), i * 10);
        assert!(agg.current().jitter_history.len() <= 60);
    }
    assert_eq!(agg.current().jitter_history.len(), 60);
}

#[test]
fn packets_per_second_tracks_burst_count() {
    let (mut agg, _bus) = aggregator();
    for (i, t) in [0u64, 1, 1, 2, 3, 9, 10, 10, 2000].into_iter().enumerate() {
        agg.apply_throughput(traffic(t, i as f64), t * 100);
        let s = agg.current();
        assert_eq!(s.packets_per_second, s.packet_burst_count);
    }
}

#[test]
fn path_status_follows_multipath_updates() {
    let (mut agg, _bus) = aggregator();
    agg.apply_multipath(&game(&[], 0.0), 0);
    assert_eq!(agg.current().path_status, PathStatus::Dropping);
    agg.apply_multipath(&game(&["hk-1"], 30.0), 10);
    assert_eq!(agg.current().path_status, PathStatus::Stabilizing);
    assert_eq!(agg.current().session_pin_status.as_deref(), Some("PINNED:1"));
    agg.apply_multipath(&game(&["hk-1", "sg-2", "jp-3"], 30.0), 20);
    assert_eq!(agg.current().path_status, PathStatus::Racing);
    assert_eq!(agg.current().active_path_count, 3);
    assert_eq!(agg.current().rtt_spread_ms, 30);
}

#[test]
fn throttled_candidate_still_becomes_the_base() {
    let (mut agg, bus) = aggregator();
    assert_eq!(
        agg.apply(Update::Traffic(traffic(0, 10.0)), 100),
        Some(GateDecision::Publish)
    );
    // same instant, different dimension: throttled but folded into current
    assert_eq!(
        agg.apply(Update::Route(route("proxy-sg", 1)), 100),
        Some(GateDecision::Throttled)
    );
    assert_eq!(bus.current_snapshot().current_outbound_tag, None);
    assert_eq!(agg.current().current_outbound_tag.as_deref(), Some("proxy-sg"));

    // next publish carries both dimensions
    assert_eq!(
        agg.apply(Update::Game(game(&["a", "b"], 12.0)), 120),
        Some(GateDecision::Publish)
    );
    let s = bus.current_snapshot();
    assert_eq!(s.throughput_mbps, 10.0);
    assert_eq!(s.current_outbound_tag.as_deref(), Some("proxy-sg"));
    assert_eq!(s.path_status, PathStatus::Racing);
}

#[test]
fn no_publish_within_throttle_window() {
    let (mut agg, bus) = aggregator();
    agg.apply_throughput(traffic(0, 1.0), 1_000);
    for (i, now) in (1_001..1_008).enumerate() {
        let decision = agg.apply_throughput(traffic(now, 50.0 + i as f64 * 10.0), now);
        assert_eq!(decision, GateDecision::Throttled);
    }
    assert_eq!(bus.published_count(), 1);
}

#[test]
fn identical_consecutive_candidates_publish_once() {
    let (mut agg, bus) = aggregator();
    assert_eq!(
        agg.apply_routing(&route("direct", 3), 0),
        GateDecision::Publish
    );
    assert_eq!(
        agg.apply_routing(&route("direct", 3), 50),
        GateDecision::Duplicate
    );
    assert_eq!(bus.published_count(), 1);
    assert_eq!(agg.stats().duplicates, 1);
}

#[test]
fn small_throughput_delta_is_suppressed() {
    let config = engine_config();
    let bus = SnapshotBus::new(config.bus());
    let mut agg = SnapshotAggregator::new(&config, bus.clone());

    agg.apply_throughput(traffic(0, 100.0), 0);
    // only the jitter history moved
    assert_eq!(
        agg.apply_throughput(traffic(10, 100.0), 20),
        GateDecision::Suppressed
    );
    let published = bus.published_count();

    assert_eq!(
        agg.apply_throughput(traffic(20, 100.5), 40),
        GateDecision::Suppressed
    );
    assert_eq!(
        agg.apply_throughput(traffic(30, 102.0), 60),
        GateDecision::Publish
    );
    assert_eq!(bus.published_count(), published + 1);
    assert_eq!(bus.current_snapshot().throughput_mbps, 102.0);
}

#[test]
fn routing_change_is_not_suppressed_by_flat_throughput() {
    let (mut agg, bus) = aggregator();
    agg.apply_throughput(traffic(0, 100.0), 0);
    assert_eq!(
        agg.apply_routing(&route("proxy-us", 5), 20),
        GateDecision::Publish
    );
    assert_eq!(
        bus.current_snapshot().current_outbound_tag.as_deref(),
        Some("proxy-us")
    );
}

#[test]
fn quic_warmup_cycle_through_aggregator() {
    let (mut agg, bus) = aggregator();
    let start = 2_000;
    agg.apply_quic_dominance(&streaming(1, 0), start);
    let s = bus.current_snapshot();
    assert_eq!(s.quic_warmup_state, QuicWarmupState::Warming);
    assert_eq!(s.quic_warmup_time_remaining_ms, 10_000);
    assert!(s.is_quic_dominant);

    for elapsed in (1_000..=10_000).step_by(1_000) {
        let decision = agg.apply_warmup_tick(start + elapsed);
        assert_eq!(decision, Some(GateDecision::Publish));
        let s = bus.current_snapshot();
        assert_eq!(s.quic_warmup_time_remaining_ms, 10_000 - elapsed);
        let expected = if elapsed >= 10_000 {
            QuicWarmupState::Timeout
        } else if elapsed >= 7_000 {
            QuicWarmupState::Ready
        } else {
            QuicWarmupState::Warming
        };
        assert_eq!(s.quic_warmup_state, expected, "elapsed={elapsed}");
    }
    assert_eq!(agg.apply_warmup_tick(start + 11_000), None);
}

#[test]
fn warmup_tick_while_idle_derives_nothing() {
    let (mut agg, bus) = aggregator();
    assert_eq!(agg.apply(Update::WarmupTick, 1_000), None);
    assert_eq!(bus.published_count(), 0);
}

#[test]
fn dns_race_results_land_in_snapshot() {
    let (mut agg, bus) = aggregator();
    let sample = DnsRaceSample {
        results: vec![
            DnsProbe {
                resolver: "8.8.8.8".into(),
                latency_ms: 20,
                ttl_seconds: 300,
            },
            DnsProbe {
                resolver: "1.1.1.1".into(),
                latency_ms: 8,
                ttl_seconds: 120,
            },
        ],
    };
    agg.apply_dns_race(&sample, 0);
    let results = &bus.current_snapshot().dns_race_results;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].resolver, "1.1.1.1");
    assert!(results[0].is_winner);
    assert_eq!(results[1].delta_ms, 12);
}

#[test]
fn malformed_numbers_are_clamped() {
    let (mut agg, bus) = aggregator();
    let sample = TrafficSample {
        timestamp_ms: 0,
        rx_bytes_per_sec: f64::NAN,
        tx_bytes_per_sec: f64::NEG_INFINITY,
    };
    agg.apply_throughput(sample, 0);
    agg.apply_multipath(
        &GameSnapshot {
            smoothed_rtt_ms: f64::NAN,
            ..Default::default()
        },
        50,
    );
    let s = bus.current_snapshot();
    assert_eq!(s.throughput_mbps, 0.0);
    assert!((0.0..=1.0).contains(&s.burst_intensity));
    assert_eq!(s.rtt_spread_ms, 0);
    assert!(s.jitter_history.iter().all(|j| j.is_finite()));
}

#[test]
fn producer_clock_reset_does_not_pin_burst_window() {
    let (mut agg, _bus) = aggregator();
    agg.apply_throughput(traffic(1_000_000, 1.0), 0);
    for i in 1..1_000u64 {
        // restarted producer clock, one sample per second of aggregator time
        agg.apply_throughput(traffic((i - 1) * 1_000, 1.0), i * 1_000);
        let s = agg.current();
        assert_eq!(s.packet_burst_count, 1, "sample {i}");
        assert_eq!(s.packets_per_second, 1);
        assert!(s.burst_intensity < 1.0);
    }
}

#[test]
fn throttled_snapshot_is_flushed_after_window() {
    let (mut agg, bus) = aggregator();
    agg.apply_throughput(traffic(0, 10.0), 100);
    assert_eq!(agg.flush_deadline_ms(), None);

    assert_eq!(
        agg.apply_routing(&route("proxy-de", 2), 103),
        GateDecision::Throttled
    );
    assert_eq!(agg.flush_deadline_ms(), Some(108));

    assert_eq!(agg.flush(108), Some(GateDecision::Publish));
    assert_eq!(agg.flush_deadline_ms(), None);
    assert_eq!(agg.flush(200), None);
    let s = bus.current_snapshot();
    assert_eq!(s.current_outbound_tag.as_deref(), Some("proxy-de"));
    assert_eq!(s.timestamp, 1_000_103);
    assert_eq!(bus.published_count(), 2);
}
