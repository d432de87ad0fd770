// src/metrics.rs
//
// Run observability. Cheap relaxed counters for the integration loop;
// export via logs at end of run.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub updates: Arc<AtomicU64>,
    pub observations: Arc<AtomicU64>,
    pub empty_batches: Arc<AtomicU64>,
    pub validation_violations: Arc<AtomicU64>,
    pub preemptions: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            updates: Arc::new(AtomicU64::new(0)),
            observations: Arc::new(AtomicU64::new(0)),
            empty_batches: Arc::new(AtomicU64::new(0)),
            validation_violations: Arc::new(AtomicU64::new(0)),
            preemptions: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn updates_per_sec(&self) -> f64 {
        let updates = self.updates.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            updates as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            updates: self.updates.load(Ordering::Relaxed),
            observations: self.observations.load(Ordering::Relaxed),
            empty_batches: self.empty_batches.load(Ordering::Relaxed),
            validation_violations: self.validation_violations.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            updates_per_sec: self.updates_per_sec(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub updates: u64,
    pub observations: u64,
    pub empty_batches: u64,
    pub validation_violations: u64,
    pub preemptions: u64,
    pub updates_per_sec: f64,
    pub elapsed_secs: f64,
}
