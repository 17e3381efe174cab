//! Rolling latency and frame-rate statistics

use std::time::Instant;

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

/// Fixed-size window of recent per-frame latencies (milliseconds).
/// The oldest sample is overwritten once the window is full.
pub struct LatencyWindow {
    ring: HeapRb<f64>,
    total: u64,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            total: 0,
        }
    }

    pub fn push(&mut self, millis: f64) {
        self.ring.push_overwrite(millis);
        self.total += 1;
    }

    /// Samples currently held
    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Samples ever pushed
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn last(&self) -> Option<f64> {
        self.ring.iter().last().copied()
    }

    pub fn mean(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.ring.iter().sum::<f64>() / self.len() as f64
    }

    /// Nearest-rank percentile, `q` in `[0, 1]`.
    pub fn percentile(&self, q: f64) -> f64 {
        let mut samples: Vec<f64> = self.ring.iter().copied().collect();
        if samples.is_empty() {
            return 0.0;
        }
        samples.sort_by(f64::total_cmp);
        let rank = (q.clamp(0.0, 1.0) * samples.len() as f64).ceil() as usize;
        samples[rank.saturating_sub(1).min(samples.len() - 1)]
    }
}

/// Frames-per-second estimate averaged over the last few intervals.
pub struct FpsCounter {
    prev: Option<Instant>,
    intervals: HeapRb<f64>,
}

impl FpsCounter {
    pub fn new(window: usize) -> Self {
        Self {
            prev: None,
            intervals: HeapRb::new(window.max(1)),
        }
    }

    /// Mark a delivered frame; returns the current estimate.
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f64 {
        if let Some(prev) = self.prev.replace(now) {
            let secs = now.saturating_duration_since(prev).as_secs_f64();
            if secs > 0.0 {
                self.intervals.push_overwrite(secs);
            }
        }
        self.fps()
    }

    pub fn fps(&self) -> f64 {
        let n = self.intervals.occupied_len();
        if n == 0 {
            return 0.0;
        }
        let mean = self.intervals.iter().sum::<f64>() / n as f64;
        1.0 / mean
    }
}
