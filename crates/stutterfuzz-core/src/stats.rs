//! Run statistics: smoothed connect latency and send-gate counters.
//!
//! Written only by the pool's state transitions; reporters read through the
//! accessors and never write.

/// Smoothing factor for the connect-latency moving average.
const CONNECT_SMOOTHING: f64 = 0.9999;

/// Aggregate counters for one run.
#[derive(Debug, Clone)]
pub struct RunStats {
    mean_connect_ticks: f64,
    send_ready: u64,
    send_blocked: u64,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            mean_connect_ticks: 1.0,
            send_ready: 0,
            send_blocked: 0,
        }
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observed connect latency (in ticks) into the moving average.
    pub fn observe_connect(&mut self, elapsed_ticks: u64) {
        self.mean_connect_ticks = self.mean_connect_ticks * CONNECT_SMOOTHING
            + elapsed_ticks as f64 * (1.0 - CONNECT_SMOOTHING);
    }

    /// Count a connection that passed the backpressure gate this tick.
    pub fn note_send_ready(&mut self) {
        self.send_ready += 1;
    }

    /// Count a connection skipped because prior bytes were unacknowledged.
    pub fn note_send_blocked(&mut self) {
        self.send_blocked += 1;
    }

    pub fn mean_connect_ticks(&self) -> f64 {
        self.mean_connect_ticks
    }

    pub fn send_ready(&self) -> u64 {
        self.send_ready
    }

    pub fn send_blocked(&self) -> u64 {
        self.send_blocked
    }

    /// Fraction of send decisions that were ready (None before any decision).
    pub fn ready_ratio(&self) -> Option<f64> {
        let total = self.send_ready + self.send_blocked;
        if total == 0 {
            return None;
        }
        Some(self.send_ready as f64 / total as f64)
    }
}
