use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Engine operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineMetrics {
    /// Units whose callback returned `Ok`.
    pub units_executed: u64,
    /// Units whose callback returned an error or panicked.
    pub units_failed: u64,
    pub batches_submitted: u64,
    pub batches_done: u64,
    pub batches_failed: u64,
    /// Workers currently running a unit.
    pub active_workers: usize,
    /// Worker utilization ratio (0.0 - 1.0) at snapshot time.
    pub worker_utilization: f64,
    /// Mean callback duration over all executed units.
    pub avg_unit_duration: Duration,
    /// When the most recent batch reached Done.
    pub last_completion: Option<DateTime<Utc>>,
}

impl EngineMetrics {
    /// Record a successfully executed unit.
    pub fn record_unit(&mut self, duration: Duration) {
        self.units_executed += 1;
        let count = self.units_executed;

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_unit_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_unit_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn record_unit_failure(&mut self) {
        self.units_failed += 1;
    }

    /// Record batches that settled in one resolution step.
    pub fn record_settled(&mut self, done: usize, failed: usize) {
        self.batches_done += done as u64;
        self.batches_failed += failed as u64;
        if done > 0 {
            self.last_completion = Some(Utc::now());
        }
    }
}
