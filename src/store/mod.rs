// src/store/mod.rs
//
// Downstream store: zone registration, snapshot/alert/crossing writes.
// Implementations are thin I/O wrappers; the engine never calls them
// directly, everything goes through the dispatcher.

pub mod dispatcher;
pub mod jsonl;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::pipeline::alerts::{Alert, AlertKind};
use crate::pipeline::engine::OccupancySnapshot;
use crate::pipeline::sync_scheduler::SyncTrigger;
use crate::tracking::crossing::{CrossingDirection, CrossingEvent};
use crate::types::{Config, TrackId};

pub use dispatcher::{Outbound, SinkDispatcher};
pub use jsonl::JsonlStore;
pub use rest::RestStore;

/// Stable zone identifier assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneDescriptor {
    pub name: String,
    pub location: String,
    pub label: String,
    pub line_y: i32,
    pub max_capacity: u64,
}

impl ZoneDescriptor {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.zone.name.clone(),
            location: config.zone.location.clone(),
            label: config.zone.label.clone(),
            line_y: config.line.y,
            max_capacity: config.zone.max_capacity,
        }
    }
}

/// What a backend can accept beyond the base summary row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkCapabilities {
    pub extended_metrics: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtendedMetrics {
    pub peak_occupancy: u64,
    pub active_tracks: usize,
    pub average_dwell_secs: f64,
    pub tracked_total: usize,
    pub counted_total: usize,
    pub trigger: SyncTrigger,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotPayload {
    pub zone_id: ZoneId,
    pub entries: u64,
    pub exits: u64,
    pub occupancy: u64,
    pub timestamp: DateTime<Utc>,
    pub extended: Option<ExtendedMetrics>,
}

impl SnapshotPayload {
    pub fn new(zone_id: ZoneId, trigger: SyncTrigger, snapshot: &OccupancySnapshot) -> Self {
        Self {
            zone_id,
            entries: snapshot.entries,
            exits: snapshot.exits,
            occupancy: snapshot.occupancy,
            timestamp: Utc::now(),
            extended: Some(ExtendedMetrics {
                peak_occupancy: snapshot.peak_occupancy,
                active_tracks: snapshot.active_tracks,
                average_dwell_secs: snapshot.average_dwell_secs,
                tracked_total: snapshot.tracked_total,
                counted_total: snapshot.counted_total,
                trigger,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub zone_id: ZoneId,
    pub kind: AlertKind,
    pub severity: &'static str,
    pub title: &'static str,
    pub message: String,
    pub current_count: u64,
    pub threshold_value: u64,
    pub timestamp: DateTime<Utc>,
}

impl AlertPayload {
    pub fn new(zone_id: ZoneId, zone_label: &str, alert: &Alert) -> Self {
        Self {
            zone_id,
            kind: alert.kind,
            severity: alert.kind.severity(),
            title: alert.kind.title(),
            message: alert.message(zone_label),
            current_count: alert.occupancy,
            threshold_value: alert.threshold,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossingRecord {
    pub zone_id: ZoneId,
    pub track_id: TrackId,
    pub direction: CrossingDirection,
    pub timestamp: DateTime<Utc>,
}

impl CrossingRecord {
    pub fn new(zone_id: ZoneId, event: &CrossingEvent) -> Self {
        Self {
            zone_id,
            track_id: event.track_id,
            direction: event.direction,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait OccupancyStore: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> SinkCapabilities;

    /// Look up the zone by name, creating it if absent; refresh liveness if present.
    async fn register_zone(&self, zone: &ZoneDescriptor) -> Result<ZoneId>;

    async fn deactivate_zone(&self, zone_id: &ZoneId) -> Result<()>;

    async fn push_snapshot(&self, payload: &SnapshotPayload) -> Result<()>;

    async fn push_alert(&self, payload: &AlertPayload) -> Result<()>;

    async fn push_crossing(&self, record: &CrossingRecord) -> Result<()>;
}
