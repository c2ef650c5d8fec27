//! Per-instance pipeline counters.
//!
//! The pipeline is single-threaded and mutated through `&mut self`, so the
//! counters are plain integers; readers take a [`PipelineMetricsSnapshot`].

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    frames_processed: u64,
    frames_failed: u64,
    reloads: u64,
    reallocations: u64,
    total_process_us: u64,
    peak_process_us: u64,
}

impl PipelineMetrics {
    pub fn record_frame(&mut self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.frames_processed += 1;
        self.total_process_us = self.total_process_us.saturating_add(us);
        self.peak_process_us = self.peak_process_us.max(us);
    }

    pub fn record_failure(&mut self) {
        self.frames_failed += 1;
    }

    pub fn record_reload(&mut self) {
        self.reloads += 1;
    }

    pub fn record_reallocations(&mut self, count: u32) {
        self.reallocations += u64::from(count);
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            frames_processed: self.frames_processed,
            frames_failed: self.frames_failed,
            reloads: self.reloads,
            reallocations: self.reallocations,
            avg_process_us: if self.frames_processed > 0 {
                self.total_process_us / self.frames_processed
            } else {
                0
            },
            peak_process_us: self.peak_process_us,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineMetricsSnapshot {
    pub frames_processed: u64,
    pub frames_failed: u64,
    /// Effect loads, including the one at construction.
    pub reloads: u64,
    /// Buffer allocations plus in-place resizes.
    pub reallocations: u64,
    pub avg_process_us: u64,
    pub peak_process_us: u64,
}
