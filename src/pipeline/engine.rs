// src/pipeline/engine.rs
//
// Owns every piece of occupancy state and runs one tick at a time:
//
//   detections -> CrossingDetector (TrackStore) -> CounterAggregator
//              -> AlertEvaluator -> SyncScheduler -> EventBus
//
// Eviction runs from `housekeeping`, driven by a timer on the same loop,
// so the store only ever has one writer. The engine does no I/O.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::pipeline::alerts::AlertEvaluator;
use crate::pipeline::event_bus::{EngineEvent, EventBus};
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::sync_scheduler::{SyncPolicy, SyncScheduler, SyncTrigger};
use crate::tracking::counter::{CounterAggregator, CounterState};
use crate::tracking::crossing::{CrossingDetector, CrossingDirection, CrossingPolicy};
use crate::tracking::evictor::StaleEvictor;
use crate::tracking::track_store::TrackStore;
use crate::types::{Config, Detection, TrackId};

/// State handed to the metric sink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OccupancySnapshot {
    pub entries: u64,
    pub exits: u64,
    pub occupancy: u64,
    pub peak_occupancy: u64,
    pub active_tracks: usize,
    pub tracked_total: usize,
    pub counted_total: usize,
    pub average_dwell_secs: f64,
    pub captured_at: f64,
}

pub struct OccupancyEngine {
    tracks: TrackStore,
    detector: CrossingDetector,
    counters: CounterAggregator,
    evictor: StaleEvictor,
    scheduler: SyncScheduler,
    alerts: AlertEvaluator,
    bus: EventBus,
    metrics: PipelineMetrics,
    seen_this_tick: HashSet<TrackId>,
}

impl OccupancyEngine {
    pub fn new(config: &Config, started_at: f64, metrics: PipelineMetrics) -> Self {
        let policy = CrossingPolicy::from_config(&config.line);
        info!(
            "Engine ready: zone='{}' capacity={} policy={}",
            config.zone.name,
            config.zone.max_capacity,
            policy.name()
        );

        Self {
            tracks: TrackStore::new(
                config.line.y,
                config.tracking.record_paths,
                config.tracking.max_path_len,
            ),
            detector: CrossingDetector::new(config.line.y, policy),
            counters: CounterAggregator::new(),
            evictor: StaleEvictor::from_config(&config.tracking),
            scheduler: SyncScheduler::new(SyncPolicy::from_config(&config.sync), started_at),
            alerts: AlertEvaluator::from_config(config.zone.max_capacity, &config.alerts),
            bus: EventBus::new(config.input.event_bus_capacity),
            metrics,
            seen_this_tick: HashSet::new(),
        }
    }

    /// Process one frame of validated detections. Returns the number of
    /// crossings counted in this tick.
    pub fn process_frame(&mut self, detections: &[Detection], now: f64) -> usize {
        self.metrics.inc(&self.metrics.total_frames);
        self.metrics
            .add(&self.metrics.detections, detections.len() as u64);
        self.seen_this_tick.clear();

        let mut crossings = 0;
        for detection in detections {
            if !self.seen_this_tick.insert(detection.id) {
                debug!("Duplicate id {} in one frame, skipping", detection.id);
                self.metrics.inc(&self.metrics.malformed_detections);
                continue;
            }

            let Some(event) =
                self.detector
                    .observe(&mut self.tracks, detection.id, detection.center, now)
            else {
                continue;
            };

            let state = self.counters.apply(event.direction);
            match event.direction {
                CrossingDirection::Entry => {
                    self.metrics.inc(&self.metrics.entries);
                    info!(
                        "Entry #{} (track {}), inside: {}",
                        state.entries,
                        event.track_id,
                        state.occupancy()
                    );
                }
                CrossingDirection::Exit => {
                    self.metrics.inc(&self.metrics.exits);
                    info!(
                        "Exit #{} (track {}), inside: {}",
                        state.exits,
                        event.track_id,
                        state.occupancy()
                    );
                }
            }
            self.bus.publish(EngineEvent::Crossing(event));
            crossings += 1;
        }

        self.evaluate(now);
        crossings
    }

    /// Timer-driven work: stale eviction, then the same alert/sync checks a
    /// frame tick runs, so pulses continue while input is idle.
    pub fn housekeeping(&mut self, now: f64) {
        let report = self
            .evictor
            .run(&mut self.tracks, self.detector.counted_mut(), now);
        if !report.is_empty() {
            self.metrics
                .add(&self.metrics.evicted_tracks, report.evicted.len() as u64);
            self.bus.publish(EngineEvent::TracksEvicted {
                ids: report.evicted,
                counted_expired: report.counted_expired,
            });
        }
        self.evaluate(now);
    }

    /// Emit a final snapshot regardless of schedule.
    pub fn flush(&mut self, now: f64) {
        self.emit_snapshot(SyncTrigger::Shutdown, now);
    }

    fn evaluate(&mut self, now: f64) {
        let counters = self.counters.state();

        if let Some(alert) = self.alerts.evaluate(counters.occupancy(), now) {
            self.metrics.inc(&self.metrics.alerts_raised);
            self.bus.publish(EngineEvent::Alert(alert));
        }

        if let Some(trigger) = self.scheduler.poll(&counters, now) {
            self.emit_snapshot(trigger, now);
        }
    }

    fn emit_snapshot(&mut self, trigger: SyncTrigger, now: f64) {
        let snapshot = self.snapshot(now);
        debug!(
            "Snapshot due ({}): in={} out={} inside={}",
            trigger.as_str(),
            snapshot.entries,
            snapshot.exits,
            snapshot.occupancy
        );
        self.bus.publish(EngineEvent::SnapshotDue { trigger, snapshot });
        self.scheduler.record_push(&self.counters.state(), now);
        self.metrics.inc(&self.metrics.snapshots_emitted);
    }

    pub fn snapshot(&self, now: f64) -> OccupancySnapshot {
        let counters = self.counters.state();
        OccupancySnapshot {
            entries: counters.entries,
            exits: counters.exits,
            occupancy: counters.occupancy(),
            peak_occupancy: counters.peak_occupancy,
            active_tracks: self.evictor.active_count(&self.tracks, now),
            tracked_total: self.tracks.len(),
            counted_total: self.detector.counted().len(),
            average_dwell_secs: self.tracks.average_dwell_secs(),
            captured_at: now,
        }
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.bus.drain()
    }

    pub fn counters(&self) -> CounterState {
        self.counters.state()
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }

    pub fn detector(&self) -> &CrossingDetector {
        &self.detector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::alerts::AlertKind;
    use crate::types::{CrossingPolicyKind, Point};

    fn det(id: TrackId, y: i32) -> Detection {
        Detection {
            id,
            center: Point { x: 320, y },
        }
    }

    fn engine_with(config: Config) -> OccupancyEngine {
        OccupancyEngine::new(&config, 0.0, PipelineMetrics::new())
    }

    fn alerts(events: &[EngineEvent]) -> Vec<AlertKind> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Alert(a) => Some(a.kind),
                _ => None,
            })
            .collect()
    }

    fn snapshots(events: &[EngineEvent]) -> Vec<(SyncTrigger, OccupancySnapshot)> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::SnapshotDue { trigger, snapshot } => Some((*trigger, *snapshot)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_capacity_scenario_single_alert() {
        let mut config = Config::default();
        config.zone.max_capacity = 50;
        config.alerts.emit_cleared = false;
        let mut engine = engine_with(config);

        let mut now = 0.0;
        let mut first_alert = None;
        let mut alert_count = 0;

        // Each person appears above the line, then walks past the band.
        for id in 1..=51u64 {
            engine.process_frame(&[det(id, 250)], now);
            now += 0.1;
            engine.process_frame(&[det(id, 330)], now);
            now += 0.1;

            for event in engine.drain_events() {
                if let EngineEvent::Alert(alert) = event {
                    alert_count += 1;
                    first_alert.get_or_insert(alert);
                }
            }
        }

        let alert = first_alert.expect("capacity alert");
        assert_eq!(engine.counters().occupancy(), 51);
        assert_eq!(alert_count, 1);
        assert_eq!(alert.kind, AlertKind::CapacityReached);
        assert_eq!(alert.occupancy, 50);

        // Occupancy stays at 51 for the whole cooldown window
        let end = alert.raised_at + 60.0;
        while now <= end {
            engine.process_frame(&[], now);
            now += 0.5;
            assert!(alerts(&engine.drain_events()).is_empty());
        }
    }

    #[test]
    fn test_occupancy_invariants_hold_every_tick() {
        let mut engine = engine_with(Config::default());
        let mut last_peak = 0;
        let mut now = 0.0;
        for id in 0..40u64 {
            // Even ids walk in, odd ids walk out
            let (from, to) = if id % 2 == 0 { (200, 400) } else { (400, 200) };
            engine.process_frame(&[det(id, from)], now);
            now += 0.05;
            engine.process_frame(&[det(id, to)], now);
            now += 0.05;

            let c = engine.counters();
            assert_eq!(c.occupancy(), c.entries.saturating_sub(c.exits));
            assert!(c.peak_occupancy >= last_peak);
            assert!(c.peak_occupancy >= c.occupancy());
            last_peak = c.peak_occupancy;
        }
        assert_eq!(engine.counters().entries, 20);
        assert_eq!(engine.counters().exits, 20);
    }

    #[test]
    fn test_transition_policy_counts_once() {
        let mut config = Config::default();
        config.line.policy = CrossingPolicyKind::Transition;
        let mut engine = engine_with(config);

        engine.process_frame(&[det(1, 290)], 0.0);
        assert_eq!(engine.process_frame(&[det(1, 305)], 0.1), 1);
        assert_eq!(engine.process_frame(&[det(1, 310)], 0.2), 0);
        assert_eq!(engine.counters().entries, 1);
        assert_eq!(engine.detector().counted().len(), 1);
    }

    #[test]
    fn test_duplicate_id_in_frame_is_skipped() {
        let mut engine = engine_with(Config::default());
        engine.process_frame(&[det(1, 250)], 0.0);
        let crossed = engine.process_frame(&[det(1, 280), det(1, 400)], 0.1);
        assert_eq!(crossed, 0);
        assert_eq!(engine.tracks().get(1).unwrap().vertical_position, 280);
    }

    #[test]
    fn test_first_tick_emits_then_debounces() {
        let mut engine = engine_with(Config::default());
        engine.process_frame(&[], 0.0);
        let first = snapshots(&engine.drain_events());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0, SyncTrigger::Changed);

        // Crossings inside the 2 s floor are held back
        engine.process_frame(&[det(1, 250)], 0.5);
        engine.process_frame(&[det(1, 400)], 1.0);
        assert!(snapshots(&engine.drain_events()).is_empty());

        engine.process_frame(&[], 2.0);
        let due = snapshots(&engine.drain_events());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1.entries, 1);
    }

    #[test]
    fn test_housekeeping_evicts_and_pulses() {
        let mut engine = engine_with(Config::default());
        engine.process_frame(&[det(1, 250)], 0.0);
        engine.process_frame(&[det(1, 400)], 1.0);
        engine.process_frame(&[], 3.0);
        engine.drain_events();

        engine.housekeeping(31.0);
        let events = engine.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::TracksEvicted { ids, .. } if ids == &vec![1]
        )));
        assert!(engine.tracks().is_empty());
        assert!(engine.detector().counted().contains(1));

        // No change since t=3: next push is the pulse at t=303
        engine.housekeeping(302.0);
        assert!(snapshots(&engine.drain_events()).is_empty());
        engine.housekeeping(303.0);
        let pulse = snapshots(&engine.drain_events());
        assert_eq!(pulse.len(), 1);
        assert_eq!(pulse[0].0, SyncTrigger::Pulse);
    }

    #[test]
    fn test_snapshot_extended_metrics() {
        let mut engine = engine_with(Config::default());
        engine.process_frame(&[det(1, 250), det(2, 250)], 0.0);
        engine.process_frame(&[det(1, 400), det(2, 260)], 4.0);
        engine.process_frame(&[det(2, 270)], 10.0);

        let snap = engine.snapshot(10.0);
        assert_eq!(snap.entries, 1);
        assert_eq!(snap.occupancy, 1);
        assert_eq!(snap.peak_occupancy, 1);
        assert_eq!(snap.tracked_total, 2);
        assert_eq!(snap.active_tracks, 1);
        assert_eq!(snap.counted_total, 1);
        assert!((snap.average_dwell_secs - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_flush_always_emits() {
        let mut engine = engine_with(Config::default());
        engine.process_frame(&[], 0.0);
        engine.drain_events();
        engine.flush(0.5);
        let due = snapshots(&engine.drain_events());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, SyncTrigger::Shutdown);
    }
}
