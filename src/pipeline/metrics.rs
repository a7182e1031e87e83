// src/pipeline/metrics.rs
//
// Process counters shared between the tick loop and the background
// sender. Logged as a JSON summary on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub detections: Arc<AtomicU64>,
    pub malformed_detections: Arc<AtomicU64>,
    pub entries: Arc<AtomicU64>,
    pub exits: Arc<AtomicU64>,
    pub snapshots_emitted: Arc<AtomicU64>,
    pub alerts_raised: Arc<AtomicU64>,
    pub evicted_tracks: Arc<AtomicU64>,
    pub sink_successes: Arc<AtomicU64>,
    pub sink_failures: Arc<AtomicU64>,
    pub dispatch_dropped: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            detections: Arc::new(AtomicU64::new(0)),
            malformed_detections: Arc::new(AtomicU64::new(0)),
            entries: Arc::new(AtomicU64::new(0)),
            exits: Arc::new(AtomicU64::new(0)),
            snapshots_emitted: Arc::new(AtomicU64::new(0)),
            alerts_raised: Arc::new(AtomicU64::new(0)),
            evicted_tracks: Arc::new(AtomicU64::new(0)),
            sink_successes: Arc::new(AtomicU64::new(0)),
            sink_failures: Arc::new(AtomicU64::new(0)),
            dispatch_dropped: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            detections: self.detections.load(Ordering::Relaxed),
            malformed_detections: self.malformed_detections.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
            exits: self.exits.load(Ordering::Relaxed),
            snapshots_emitted: self.snapshots_emitted.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            evicted_tracks: self.evicted_tracks.load(Ordering::Relaxed),
            sink_successes: self.sink_successes.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            dispatch_dropped: self.dispatch_dropped.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub detections: u64,
    pub malformed_detections: u64,
    pub entries: u64,
    pub exits: u64,
    pub snapshots_emitted: u64,
    pub alerts_raised: u64,
    pub evicted_tracks: u64,
    pub sink_successes: u64,
    pub sink_failures: u64,
    pub dispatch_dropped: u64,
    pub elapsed_secs: f64,
}
