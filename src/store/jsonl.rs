// src/store/jsonl.rs
//
// File backend: every write becomes one JSON line tagged with its kind.
// Useful offline and for replaying recorded detection streams.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use super::{
    AlertPayload, CrossingRecord, OccupancyStore, SinkCapabilities, SnapshotPayload, ZoneDescriptor,
    ZoneId,
};

pub struct JsonlStore {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        info!("Writing occupancy records to {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append<T: Serialize>(&self, kind: &str, record: &T) -> Result<()> {
        let line = serde_json::to_string(&json!({ "kind": kind, "record": record }))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("JSONL writer lock poisoned"))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Deterministic id so re-registering the same name yields the same zone.
/// Names with no alphanumeric characters fall back to a hash of the name.
fn zone_slug(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let parts: Vec<&str> = slug.split('-').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return format!("zone-{:016x}", fnv1a(name.as_bytes()));
    }
    format!("zone-{}", parts.join("-"))
}

/// FNV-1a, stable across builds unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl OccupancyStore for JsonlStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            extended_metrics: true,
        }
    }

    async fn register_zone(&self, zone: &ZoneDescriptor) -> Result<ZoneId> {
        let zone_id = ZoneId(zone_slug(&zone.name));
        self.append(
            "zone",
            &json!({
                "id": zone_id,
                "zone": zone,
                "status": "active",
                "last_seen": Utc::now().to_rfc3339(),
            }),
        )?;
        Ok(zone_id)
    }

    async fn deactivate_zone(&self, zone_id: &ZoneId) -> Result<()> {
        self.append(
            "zone",
            &json!({
                "id": zone_id,
                "status": "inactive",
                "last_seen": Utc::now().to_rfc3339(),
            }),
        )
    }

    async fn push_snapshot(&self, payload: &SnapshotPayload) -> Result<()> {
        self.append("snapshot", payload)
    }

    async fn push_alert(&self, payload: &AlertPayload) -> Result<()> {
        self.append("alert", payload)
    }

    async fn push_crossing(&self, record: &CrossingRecord) -> Result<()> {
        self.append("crossing", record)
    }
}
