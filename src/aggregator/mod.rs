// Snapshot aggregator: the single writer of the current HyperSnapshot.
// Every producer talks to it through one mpsc inbox, so derivations never interleave.

pub mod derive;

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant, interval, sleep_until};
use tracing::instrument;

use crate::burst::BurstDetector;
use crate::bus::SnapshotBus;
use crate::config::EngineConfig;
use crate::gate::{EmissionGate, GateDecision, GateStats};
use crate::jitter::JitterHistoryBuffer;
use crate::models::{
    DnsRaceSample, GameSnapshot, HyperSnapshot, PathStatus, RouteSnapshot, StreamingSnapshot,
    TrafficSample,
};
use crate::warmup::{QuicWarmupTimer, WarmupStatus};

/// The telemetry dimension an update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Throughput,
    Routing,
    QuicDominance,
    MultiPath,
    DnsRace,
    QuicWarmup,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Throughput => "throughput",
            Dimension::Routing => "routing",
            Dimension::QuicDominance => "quic_dominance",
            Dimension::MultiPath => "multi_path",
            Dimension::DnsRace => "dns_race",
            Dimension::QuicWarmup => "quic_warmup",
        }
    }
}

/// One message in the aggregator inbox.
#[derive(Debug, Clone)]
pub enum Update {
    Traffic(TrafficSample),
    Route(RouteSnapshot),
    Streaming(StreamingSnapshot),
    Game(GameSnapshot),
    DnsRace(DnsRaceSample),
    WarmupTick,
}

impl Update {
    pub fn dimension(&self) -> Dimension {
        match self {
            Update::Traffic(_) => Dimension::Throughput,
            Update::Route(_) => Dimension::Routing,
            Update::Streaming(_) => Dimension::QuicDominance,
            Update::Game(_) => Dimension::MultiPath,
            Update::DnsRace(_) => Dimension::DnsRace,
            Update::WarmupTick => Dimension::QuicWarmup,
        }
    }
}

/// Owns the current snapshot and the gate bookkeeping. Not shared: the aggregator task
/// holds it by value and applies one update at a time.
pub struct SnapshotAggregator {
    current: Arc<HyperSnapshot>,
    gate: EmissionGate,
    bus: SnapshotBus,
    burst: Arc<BurstDetector>,
    jitter: Arc<JitterHistoryBuffer>,
    warmup: QuicWarmupTimer,
    /// The current snapshot was held back by the throttle and still needs a verdict.
    flush_pending: bool,
    /// Wall-clock epoch ms corresponding to monotonic 0.
    wall_origin_ms: u64,
}

impl SnapshotAggregator {
    pub fn new(config: &EngineConfig, bus: SnapshotBus) -> Self {
        Self {
            current: Arc::new(HyperSnapshot::default()),
            gate: EmissionGate::new(config.gate()),
            bus,
            burst: Arc::new(BurstDetector::new(config.burst_window_ms)),
            jitter: Arc::new(JitterHistoryBuffer::new(config.jitter_history_cap)),
            warmup: QuicWarmupTimer::new(config.quic_warmup_timeout_ms, config.quic_ready_fraction),
            flush_pending: false,
            wall_origin_ms: epoch_ms(),
        }
    }

    /// Pins the wall clock used for snapshot timestamps (deterministic tests).
    pub fn with_wall_origin(mut self, wall_origin_ms: u64) -> Self {
        self.wall_origin_ms = wall_origin_ms;
        self
    }

    pub fn burst_detector(&self) -> Arc<BurstDetector> {
        self.burst.clone()
    }

    pub fn jitter_history(&self) -> Arc<JitterHistoryBuffer> {
        self.jitter.clone()
    }

    pub fn current(&self) -> &Arc<HyperSnapshot> {
        &self.current
    }

    pub fn stats(&self) -> GateStats {
        self.gate.stats()
    }

    /// Applies one update at monotonic `now_ms`. Returns `None` when the update did not
    /// derive a new snapshot (a warm-up tick while idle).
    pub fn apply(&mut self, update: Update, now_ms: u64) -> Option<GateDecision> {
        match update {
            Update::Traffic(sample) => Some(self.apply_throughput(sample, now_ms)),
            Update::Route(route) => Some(self.apply_routing(&route, now_ms)),
            Update::Streaming(streaming) => Some(self.apply_quic_dominance(&streaming, now_ms)),
            Update::Game(game) => Some(self.apply_multipath(&game, now_ms)),
            Update::DnsRace(sample) => Some(self.apply_dns_race(&sample, now_ms)),
            Update::WarmupTick => self.apply_warmup_tick(now_ms),
        }
    }

    pub fn apply_throughput(&mut self, sample: TrafficSample, now_ms: u64) -> GateDecision {
        let combined = sample.combined_speed();
        let jitter_history = self.jitter.record(combined);
        let burst = self.burst.record_arrival(now_ms);
        let candidate = HyperSnapshot {
            timestamp: self.wall_ms(now_ms),
            throughput_mbps: derive::throughput_mbps(combined),
            burst_intensity: burst.intensity.clamp(0.0, 1.0),
            jitter_history,
            packet_burst_count: burst.burst_count,
            packets_per_second: burst.packets_per_second,
            ..(*self.current).clone()
        };
        self.offer(candidate, now_ms)
    }

    pub fn apply_routing(&mut self, route: &RouteSnapshot, now_ms: u64) -> GateDecision {
        let candidate = HyperSnapshot {
            timestamp: self.wall_ms(now_ms),
            current_outbound_tag: derive::current_outbound_tag(route),
            ..(*self.current).clone()
        };
        self.offer(candidate, now_ms)
    }

    /// Transport dominance plus the warm-up trigger: the first active QUIC session starts
    /// a warm-up cycle, zero sessions reset it.
    pub fn apply_quic_dominance(
        &mut self,
        streaming: &StreamingSnapshot,
        now_ms: u64,
    ) -> GateDecision {
        let warmup = self
            .warmup
            .observe_sessions(streaming.active_quic_sessions(), now_ms)
            .unwrap_or_else(|| self.warmup.status());
        let candidate = HyperSnapshot {
            timestamp: self.wall_ms(now_ms),
            is_quic_dominant: derive::is_quic_dominant(streaming),
            quic_warmup_state: warmup.state,
            quic_warmup_time_remaining_ms: warmup.remaining_ms,
            ..(*self.current).clone()
        };
        self.offer(candidate, now_ms)
    }

    pub fn apply_multipath(&mut self, game: &GameSnapshot, now_ms: u64) -> GateDecision {
        let fields = derive::multipath_fields(game);
        let candidate = HyperSnapshot {
            timestamp: self.wall_ms(now_ms),
            path_status: PathStatus::from_active_paths(fields.active_path_count),
            active_path_count: fields.active_path_count,
            session_pin_status: fields.session_pin_status,
            rtt_spread_ms: fields.rtt_spread_ms,
            path_race_winner: fields.path_race_winner,
            ..(*self.current).clone()
        };
        self.offer(candidate, now_ms)
    }

    pub fn apply_dns_race(&mut self, sample: &DnsRaceSample, now_ms: u64) -> GateDecision {
        let candidate = HyperSnapshot {
            timestamp: self.wall_ms(now_ms),
            dns_race_results: derive::dns_race_results(sample),
            ..(*self.current).clone()
        };
        self.offer(candidate, now_ms)
    }

    pub fn apply_warmup_tick(&mut self, now_ms: u64) -> Option<GateDecision> {
        let WarmupStatus {
            state,
            remaining_ms,
        } = self.warmup.tick(now_ms)?;
        let candidate = HyperSnapshot {
            timestamp: self.wall_ms(now_ms),
            quic_warmup_state: state,
            quic_warmup_time_remaining_ms: remaining_ms,
            ..(*self.current).clone()
        };
        Some(self.offer(candidate, now_ms))
    }

    /// When a throttled snapshot is waiting, the monotonic ms at which [`Self::flush`]
    /// can publish it.
    pub fn flush_deadline_ms(&self) -> Option<u64> {
        if !self.flush_pending {
            return None;
        }
        self.gate.reopens_at_ms()
    }

    /// Re-offers a throttled current snapshot once the throttle window has passed, so a
    /// burst followed by silence still reaches consumers.
    pub fn flush(&mut self, now_ms: u64) -> Option<GateDecision> {
        if !self.flush_pending {
            return None;
        }
        let candidate = self.current.clone();
        Some(self.evaluate(candidate, now_ms))
    }

    /// The candidate always becomes the new base; the gate only decides publication.
    fn offer(&mut self, candidate: HyperSnapshot, now_ms: u64) -> GateDecision {
        let candidate = Arc::new(candidate);
        self.current = candidate.clone();
        self.evaluate(candidate, now_ms)
    }

    fn evaluate(&mut self, candidate: Arc<HyperSnapshot>, now_ms: u64) -> GateDecision {
        let decision = self.gate.evaluate(&candidate, now_ms);
        self.flush_pending = decision == GateDecision::Throttled;
        if decision == GateDecision::Publish {
            let consumers = self.bus.publish(candidate);
            tracing::trace!(now_ms, consumers, "snapshot published");
        } else {
            tracing::trace!(now_ms, ?decision, "snapshot held back");
        }
        decision
    }

    fn wall_ms(&self, now_ms: u64) -> u64 {
        self.wall_origin_ms.saturating_add(now_ms)
    }
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(
                error = %e,
                operation = "get_timestamp",
                "system time error"
            );
            0
        })
}

/// Spawns the aggregator task. It applies inbox messages in arrival order until
/// `shutdown_rx` fires or every sender is gone, then drains what is already queued and
/// returns the gate stats.
pub fn spawn(
    aggregator: SnapshotAggregator,
    inbox: mpsc::Receiver<Update>,
    shutdown_rx: oneshot::Receiver<()>,
    stats_log_interval_secs: u64,
) -> tokio::task::JoinHandle<GateStats> {
    tokio::spawn(run(aggregator, inbox, shutdown_rx, stats_log_interval_secs))
}

#[instrument(skip(aggregator, inbox, shutdown_rx))]
async fn run(
    mut aggregator: SnapshotAggregator,
    mut inbox: mpsc::Receiver<Update>,
    mut shutdown_rx: oneshot::Receiver<()>,
    stats_log_interval_secs: u64,
) -> GateStats {
    let origin = Instant::now();
    let now_ms = || origin.elapsed().as_millis() as u64;

    let stats_enabled = stats_log_interval_secs > 0;
    let mut stats_tick = interval(Duration::from_secs(stats_log_interval_secs.max(1)));
    stats_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let flush_at = aggregator.flush_deadline_ms();
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                tracing::debug!("Aggregator shutting down");
                break;
            }
            update = inbox.recv() => {
                match update {
                    Some(update) => {
                        aggregator.apply(update, now_ms());
                    }
                    None => {
                        tracing::debug!("Aggregator inbox closed");
                        break;
                    }
                }
            }
            _ = sleep_until(origin + Duration::from_millis(flush_at.unwrap_or(0))), if flush_at.is_some() => {
                aggregator.flush(now_ms());
            }
            _ = stats_tick.tick(), if stats_enabled => {
                let stats = aggregator.stats();
                tracing::info!(
                    published = stats.published,
                    throttled = stats.throttled,
                    duplicates = stats.duplicates,
                    suppressed = stats.suppressed,
                    consumers = aggregator.bus.consumer_count(),
                    jitter_samples = aggregator.jitter.snapshot().len(),
                    burst_count = aggregator.burst.reading().burst_count,
                    "aggregator stats"
                );
            }
        }
    }

    inbox.close();
    let mut drained = 0usize;
    while let Ok(update) = inbox.try_recv() {
        aggregator.apply(update, now_ms());
        drained += 1;
    }
    if drained > 0 {
        tracing::debug!(drained, "Applied queued updates before shutdown");
    }
    aggregator.flush(now_ms());
    aggregator.stats()
}
