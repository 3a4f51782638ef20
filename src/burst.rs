// Sliding-window packet burst detector

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Bursts at or above this many packets in one window read as intensity 1.0.
pub const BURST_SATURATION_PACKETS: u32 = 64;

const PPS_LOOKBACK_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BurstReading {
    pub burst_count: u32,
    pub packets_per_second: u32,
    /// burst_count / BURST_SATURATION_PACKETS, clamped to [0, 1].
    pub intensity: f64,
}

/// Keeps arrival timestamps younger than `window_ms`. Own lock so diagnostics can read it
/// without going through the aggregator.
pub struct BurstDetector {
    window_ms: u64,
    arrivals: Mutex<VecDeque<u64>>,
}

impl BurstDetector {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            arrivals: Mutex::new(VecDeque::new()),
        }
    }

    /// Records one arrival at `now_ms` and returns the post-eviction reading.
    ///
    /// A timestamp older than the newest recorded arrival means the clock stepped back;
    /// the window restarts from `now_ms`.
    pub fn record_arrival(&self, now_ms: u64) -> BurstReading {
        let mut arrivals = self.arrivals.lock();
        if let Some(&last) = arrivals.back()
            && now_ms < last
        {
            tracing::debug!(last_ms = last, now_ms, "burst clock stepped back; window reset");
            arrivals.clear();
        }
        arrivals.push_back(now_ms);

        let cutoff = now_ms.saturating_sub(self.window_ms);
        while arrivals.front().is_some_and(|&t| t < cutoff) {
            arrivals.pop_front();
        }

        // The pps lookback is nested inside an already-evicted queue, so it can only ever
        // see what the burst window kept.
        let pps_cutoff = now_ms.saturating_sub(PPS_LOOKBACK_MS);
        let packets_per_second = arrivals.iter().filter(|&&t| t >= pps_cutoff).count();

        reading(arrivals.len(), packets_per_second)
    }

    /// Current reading without recording an arrival.
    pub fn reading(&self) -> BurstReading {
        let arrivals = self.arrivals.lock();
        reading(arrivals.len(), arrivals.len())
    }
}

fn reading(burst_count: usize, packets_per_second: usize) -> BurstReading {
    let burst_count = u32::try_from(burst_count).unwrap_or(u32::MAX);
    let packets_per_second = u32::try_from(packets_per_second).unwrap_or(u32::MAX);
    let intensity = (burst_count as f64 / BURST_SATURATION_PACKETS as f64).clamp(0.0, 1.0);
    BurstReading {
        burst_count,
        packets_per_second,
        intensity,
    }
}
