// QUIC warm-up state machine, advanced by the periodic warm-up tick

use crate::models::QuicWarmupState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupStatus {
    pub state: QuicWarmupState,
    pub remaining_ms: u64,
}

/// IDLE → WARMING on the first active QUIC session, WARMING → READY once
/// `ready_fraction * timeout` has elapsed, → TIMEOUT at the full timeout.
/// Only IDLE admits a new cycle; dropping to zero QUIC sessions resets to IDLE.
#[derive(Debug, Clone)]
pub struct QuicWarmupTimer {
    timeout_ms: u64,
    ready_after_ms: u64,
    state: QuicWarmupState,
    started_at_ms: u64,
    remaining_ms: u64,
}

impl QuicWarmupTimer {
    pub fn new(timeout_ms: u64, ready_fraction: f64) -> Self {
        let ready_after_ms = (timeout_ms as f64 * ready_fraction.clamp(0.0, 1.0)).round() as u64;
        Self {
            timeout_ms,
            ready_after_ms,
            state: QuicWarmupState::Idle,
            started_at_ms: 0,
            remaining_ms: 0,
        }
    }

    /// Feeds the current number of active QUIC sessions. Returns the new status when the
    /// machine started a cycle or reset.
    pub fn observe_sessions(&mut self, active_quic: usize, now_ms: u64) -> Option<WarmupStatus> {
        match (self.state, active_quic) {
            (QuicWarmupState::Idle, n) if n > 0 => {
                self.state = QuicWarmupState::Warming;
                self.started_at_ms = now_ms;
                self.remaining_ms = self.timeout_ms;
                tracing::debug!(started_at_ms = now_ms, "QUIC warm-up started");
                Some(self.status())
            }
            (QuicWarmupState::Idle, _) => None,
            (_, 0) => {
                tracing::debug!(previous = ?self.state, "QUIC sessions ended; warm-up reset");
                self.state = QuicWarmupState::Idle;
                self.remaining_ms = 0;
                Some(self.status())
            }
            _ => None,
        }
    }

    /// Recomputes elapsed time while a cycle is running. Returns `None` when idle or
    /// already timed out.
    pub fn tick(&mut self, now_ms: u64) -> Option<WarmupStatus> {
        if !self.is_running() {
            return None;
        }
        let elapsed = now_ms.saturating_sub(self.started_at_ms);
        self.remaining_ms = self.timeout_ms.saturating_sub(elapsed);
        let next = if elapsed >= self.timeout_ms {
            QuicWarmupState::Timeout
        } else if elapsed >= self.ready_after_ms {
            QuicWarmupState::Ready
        } else {
            QuicWarmupState::Warming
        };
        if next != self.state {
            tracing::debug!(from = ?self.state, to = ?next, elapsed_ms = elapsed, "QUIC warm-up transition");
            self.state = next;
        }
        Some(self.status())
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            QuicWarmupState::Warming | QuicWarmupState::Ready
        )
    }

    pub fn status(&self) -> WarmupStatus {
        WarmupStatus {
            state: self.state,
            remaining_ms: self.remaining_ms,
        }
    }
}
