// Emission gate: throttle, identity check and delta suppression before publishing

use std::sync::Arc;

use crate::models::HyperSnapshot;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateConfig {
    pub throttle_ms: u64,
    pub min_delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Publish,
    /// Less than `throttle_ms` since the last publish.
    Throttled,
    /// Same content as the last published snapshot.
    Duplicate,
    /// Traffic-only change below the relative delta threshold.
    Suppressed,
}

/// Decision counters, logged periodically and returned at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    pub published: u64,
    pub throttled: u64,
    pub duplicates: u64,
    pub suppressed: u64,
}

pub struct EmissionGate {
    config: GateConfig,
    last_snapshot: Option<Arc<HyperSnapshot>>,
    last_emit_ms: Option<u64>,
    stats: GateStats,
}

impl EmissionGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            last_snapshot: None,
            last_emit_ms: None,
            stats: GateStats::default(),
        }
    }

    /// Decides whether `candidate` should go out at `now_ms` (monotonic). On
    /// [`GateDecision::Publish`] the candidate becomes the new reference.
    pub fn evaluate(&mut self, candidate: &Arc<HyperSnapshot>, now_ms: u64) -> GateDecision {
        let decision = self.decide(candidate, now_ms);
        match decision {
            GateDecision::Publish => {
                self.last_snapshot = Some(candidate.clone());
                self.last_emit_ms = Some(now_ms);
                self.stats.published += 1;
            }
            GateDecision::Throttled => self.stats.throttled += 1,
            GateDecision::Duplicate => self.stats.duplicates += 1,
            GateDecision::Suppressed => self.stats.suppressed += 1,
        }
        decision
    }

    fn decide(&self, candidate: &HyperSnapshot, now_ms: u64) -> GateDecision {
        if let Some(last_emit) = self.last_emit_ms
            && now_ms.saturating_sub(last_emit) < self.config.throttle_ms
        {
            return GateDecision::Throttled;
        }
        let Some(last) = self.last_snapshot.as_deref() else {
            return GateDecision::Publish;
        };
        if candidate.same_content(last) {
            return GateDecision::Duplicate;
        }
        // Only throughput-carrying changes are subject to the delta rule; a routing, path,
        // DNS or QUIC change always goes out.
        if !candidate.differs_beyond_traffic(last)
            && relative_delta(last.throughput_mbps, candidate.throughput_mbps)
                .is_some_and(|d| d < self.config.min_delta)
        {
            return GateDecision::Suppressed;
        }
        GateDecision::Publish
    }

    /// Earliest monotonic ms at which the throttle lets the next candidate through.
    pub fn reopens_at_ms(&self) -> Option<u64> {
        self.last_emit_ms
            .map(|last| last.saturating_add(self.config.throttle_ms))
    }

    pub fn last_snapshot(&self) -> Option<&Arc<HyperSnapshot>> {
        self.last_snapshot.as_ref()
    }

    pub fn stats(&self) -> GateStats {
        self.stats
    }
}

/// |new - old| / max(new, old); `None` when both are zero.
pub fn relative_delta(old: f64, new: f64) -> Option<f64> {
    let max = old.max(new);
    (max > 0.0).then(|| (new - old).abs() / max)
}
