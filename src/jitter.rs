// Fixed-capacity jitter history for dashboard sparklines

use parking_lot::Mutex;
use ringbuffer::{AllocRingBuffer, RingBuffer};

/// Largest jitter value kept; anything above is clamped.
pub const MAX_JITTER: f64 = 100.0;

struct JitterState {
    samples: AllocRingBuffer<f64>,
    last_combined_speed: Option<f64>,
}

/// Jitter = |combined - previous combined| / 1000, clamped to [0, 100], kept in a
/// circular buffer that overwrites the oldest sample when full.
pub struct JitterHistoryBuffer {
    state: Mutex<JitterState>,
}

impl JitterHistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(JitterState {
                samples: AllocRingBuffer::new(capacity.max(1)),
                last_combined_speed: None,
            }),
        }
    }

    /// Folds one combined-speed sample (bytes/sec) and returns the updated history,
    /// oldest first. The first sample has no predecessor and records 0.
    pub fn record(&self, combined_speed: f64) -> Vec<f64> {
        let combined_speed = if combined_speed.is_finite() {
            combined_speed.max(0.0)
        } else {
            0.0
        };
        let mut state = self.state.lock();
        let previous = state.last_combined_speed.unwrap_or(combined_speed);
        let jitter = ((combined_speed - previous).abs() / 1000.0).clamp(0.0, MAX_JITTER);
        state.last_combined_speed = Some(combined_speed);
        state.samples.push(jitter);
        state.samples.to_vec()
    }

    /// Ordered copy of the current history.
    pub fn snapshot(&self) -> Vec<f64> {
        self.state.lock().samples.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_records_zero_jitter() {
        let buf = JitterHistoryBuffer::new(60);
        assert_eq!(buf.record(5_000.0), vec![0.0]);
        assert_eq!(buf.record(7_000.0), vec![0.0, 2.0]);
        assert_eq!(buf.record(6_500.0), vec![0.0, 2.0, 0.5]);
    }

    #[test]
    fn jitter_is_clamped_to_max() {
        let buf = JitterHistoryBuffer::new(60);
        buf.record(0.0);
        let history = buf.record(10_000_000.0);
        assert_eq!(history.last().copied(), Some(MAX_JITTER));
    }

    #[test]
    fn never_exceeds_capacity_and_evicts_oldest() {
        let buf = JitterHistoryBuffer::new(60);
        for i in 0..500u32 {
            let history = buf.record(f64::from(i) * 1000.0);
            assert!(history.len() <= 60);
        }
        let history = buf.snapshot();
        assert_eq!(history.len(), 60);
        // every step after the first was +1000 bytes/sec
        assert!(history.iter().all(|&j| j == 1.0));
    }

    #[test]
    fn fifo_order_is_preserved_across_wraparound() {
        let buf = JitterHistoryBuffer::new(3);
        for speed in [0.0, 1_000.0, 3_000.0, 6_000.0, 10_000.0] {
            buf.record(speed);
        }
        assert_eq!(buf.snapshot(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn non_finite_speed_is_treated_as_zero() {
        let buf = JitterHistoryBuffer::new(4);
        buf.record(2_000.0);
        let history = buf.record(f64::NAN);
        assert_eq!(history, vec![0.0, 2.0]);
    }
}
