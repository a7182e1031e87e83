// src/store/dispatcher.rs
//
// Bridges the synchronous engine and the async store. Events are handed to a
// bounded channel with try_send so a slow or failing store never blocks the
// tick loop; when the channel is full the write is dropped and counted.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AlertPayload, CrossingRecord, OccupancyStore, SnapshotPayload, ZoneId};
use crate::pipeline::event_bus::EngineEvent;
use crate::pipeline::metrics::PipelineMetrics;

#[derive(Debug, Clone)]
pub enum Outbound {
    Snapshot(SnapshotPayload),
    Alert(AlertPayload),
    Crossing(CrossingRecord),
}

impl Outbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Snapshot(_) => "snapshot",
            Outbound::Alert(_) => "alert",
            Outbound::Crossing(_) => "crossing",
        }
    }
}

pub struct SinkDispatcher {
    tx: Option<mpsc::Sender<Outbound>>,
    worker: Option<JoinHandle<()>>,
    zone_id: ZoneId,
    zone_label: String,
    log_crossings: bool,
    extended_metrics: bool,
    metrics: PipelineMetrics,
}

impl SinkDispatcher {
    pub fn spawn(
        store: Arc<dyn OccupancyStore>,
        capacity: usize,
        zone_id: ZoneId,
        zone_label: String,
        log_crossings: bool,
        metrics: PipelineMetrics,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let extended_metrics = store.capabilities().extended_metrics;
        let worker = tokio::spawn(run_worker(store, rx, metrics.clone()));

        Self {
            tx: Some(tx),
            worker: Some(worker),
            zone_id,
            zone_label,
            log_crossings,
            extended_metrics,
            metrics,
        }
    }

    /// Translate an engine event into store writes.
    pub fn route(&self, event: EngineEvent) {
        match event {
            EngineEvent::SnapshotDue { trigger, snapshot } => {
                let mut payload = SnapshotPayload::new(self.zone_id.clone(), trigger, &snapshot);
                if !self.extended_metrics {
                    payload.extended = None;
                }
                self.send(Outbound::Snapshot(payload));
            }
            EngineEvent::Alert(alert) => {
                warn!(
                    "{}: {}",
                    alert.kind.title(),
                    alert.message(&self.zone_label)
                );
                self.send(Outbound::Alert(AlertPayload::new(
                    self.zone_id.clone(),
                    &self.zone_label,
                    &alert,
                )));
            }
            EngineEvent::Crossing(event) => {
                if self.log_crossings {
                    self.send(Outbound::Crossing(CrossingRecord::new(
                        self.zone_id.clone(),
                        &event,
                    )));
                }
            }
            EngineEvent::TracksEvicted {
                ids,
                counted_expired,
            } => {
                debug!(
                    "Evicted {} stale track(s), {} counted id(s) expired",
                    ids.len(),
                    counted_expired
                );
            }
        }
    }

    fn send(&self, item: Outbound) {
        let Some(tx) = &self.tx else {
            warn!("Dispatcher closed, dropping {}", item.kind());
            self.metrics.inc(&self.metrics.dispatch_dropped);
            return;
        };
        match tx.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(item)) => {
                warn!("Store queue full, dropping {}", item.kind());
                self.metrics.inc(&self.metrics.dispatch_dropped);
            }
            Err(mpsc::error::TrySendError::Closed(item)) => {
                error!("Store worker gone, dropping {}", item.kind());
                self.metrics.inc(&self.metrics.dispatch_dropped);
            }
        }
    }

    /// Close the queue and wait for pending writes to finish.
    pub async fn shutdown(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!("Store worker panicked: {}", e);
            }
        }
        info!(
            "Store dispatcher stopped ({} ok, {} failed, {} dropped)",
            self.metrics.sink_successes.load(Ordering::Relaxed),
            self.metrics.sink_failures.load(Ordering::Relaxed),
            self.metrics.dispatch_dropped.load(Ordering::Relaxed)
        );
    }
}

async fn run_worker(
    store: Arc<dyn OccupancyStore>,
    mut rx: mpsc::Receiver<Outbound>,
    metrics: PipelineMetrics,
) {
    while let Some(item) = rx.recv().await {
        let result = match &item {
            Outbound::Snapshot(payload) => store.push_snapshot(payload).await,
            Outbound::Alert(payload) => store.push_alert(payload).await,
            Outbound::Crossing(record) => store.push_crossing(record).await,
        };
        match result {
            Ok(()) => {
                metrics.inc(&metrics.sink_successes);
                debug!("{} write to {} ok", item.kind(), store.name());
            }
            Err(e) => {
                metrics.inc(&metrics.sink_failures);
                error!("{} write to {} failed: {:#}", item.kind(), store.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::alerts::{Alert, AlertKind};
    use crate::pipeline::engine::OccupancySnapshot;
    use crate::pipeline::sync_scheduler::SyncTrigger;
    use crate::store::{SinkCapabilities, ZoneDescriptor};
    use crate::tracking::crossing::{CrossingDirection, CrossingEvent};
    use crate::types::Point;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        written: Mutex<Vec<&'static str>>,
        snapshots: Mutex<Vec<SnapshotPayload>>,
        fail: bool,
        extended: bool,
    }

    #[async_trait]
    impl OccupancyStore for RecordingStore {
        fn name(&self) -> &str {
            "recording"
        }

        fn capabilities(&self) -> SinkCapabilities {
            SinkCapabilities {
                extended_metrics: self.extended,
            }
        }

        async fn register_zone(&self, _zone: &ZoneDescriptor) -> Result<ZoneId> {
            Ok(ZoneId("1".into()))
        }

        async fn deactivate_zone(&self, _zone_id: &ZoneId) -> Result<()> {
            Ok(())
        }

        async fn push_snapshot(&self, payload: &SnapshotPayload) -> Result<()> {
            if self.fail {
                bail!("store down");
            }
            self.written.lock().unwrap().push("snapshot");
            self.snapshots.lock().unwrap().push(payload.clone());
            Ok(())
        }

        async fn push_alert(&self, _payload: &AlertPayload) -> Result<()> {
            if self.fail {
                bail!("store down");
            }
            self.written.lock().unwrap().push("alert");
            Ok(())
        }

        async fn push_crossing(&self, _record: &CrossingRecord) -> Result<()> {
            if self.fail {
                bail!("store down");
            }
            self.written.lock().unwrap().push("crossing");
            Ok(())
        }
    }

    fn snapshot_event() -> EngineEvent {
        EngineEvent::SnapshotDue {
            trigger: SyncTrigger::Changed,
            snapshot: OccupancySnapshot {
                entries: 2,
                exits: 1,
                occupancy: 1,
                peak_occupancy: 2,
                active_tracks: 1,
                tracked_total: 2,
                counted_total: 3,
                average_dwell_secs: 1.0,
                captured_at: 4.0,
            },
        }
    }

    fn crossing_event() -> EngineEvent {
        EngineEvent::Crossing(CrossingEvent {
            track_id: 9,
            direction: CrossingDirection::Entry,
            position: Point { x: 5, y: 330 },
            timestamp: 4.0,
        })
    }

    fn alert_event() -> EngineEvent {
        EngineEvent::Alert(Alert {
            kind: AlertKind::CapacityReached,
            occupancy: 50,
            threshold: 50,
            raised_at: 4.0,
        })
    }

    fn spawn(store: Arc<RecordingStore>, log_crossings: bool) -> (SinkDispatcher, PipelineMetrics) {
        let metrics = PipelineMetrics::new();
        let dispatcher = SinkDispatcher::spawn(
            store,
            16,
            ZoneId("1".into()),
            "Entrance".into(),
            log_crossings,
            metrics.clone(),
        );
        (dispatcher, metrics)
    }

    #[tokio::test]
    async fn test_routes_events_in_order() {
        let store = Arc::new(RecordingStore {
            extended: true,
            ..Default::default()
        });
        let (mut dispatcher, metrics) = spawn(store.clone(), true);

        dispatcher.route(crossing_event());
        dispatcher.route(alert_event());
        dispatcher.route(snapshot_event());
        dispatcher.route(EngineEvent::TracksEvicted {
            ids: vec![1, 2],
            counted_expired: 0,
        });
        dispatcher.shutdown().await;

        assert_eq!(
            *store.written.lock().unwrap(),
            vec!["crossing", "alert", "snapshot"]
        );
        assert!(store.snapshots.lock().unwrap()[0].extended.is_some());
        assert_eq!(metrics.sink_successes.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_crossings_skipped_when_logging_disabled() {
        let store = Arc::new(RecordingStore::default());
        let (mut dispatcher, _) = spawn(store.clone(), false);

        dispatcher.route(crossing_event());
        dispatcher.route(snapshot_event());
        dispatcher.shutdown().await;

        assert_eq!(*store.written.lock().unwrap(), vec!["snapshot"]);
        // Store without extended capability gets the base row only
        assert!(store.snapshots.lock().unwrap()[0].extended.is_none());
    }

    #[tokio::test]
    async fn test_store_failures_are_counted_not_fatal() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let (mut dispatcher, metrics) = spawn(store, true);

        dispatcher.route(snapshot_event());
        dispatcher.route(alert_event());
        dispatcher.shutdown().await;

        assert_eq!(metrics.sink_failures.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.sink_successes.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_is_dropped() {
        let store = Arc::new(RecordingStore::default());
        let (mut dispatcher, metrics) = spawn(store, true);
        dispatcher.shutdown().await;

        dispatcher.route(snapshot_event());
        assert_eq!(metrics.dispatch_dropped.load(Ordering::Relaxed), 1);
    }
}
