// src/store/rest.rs
//
// PostgREST-style HTTP backend (Supabase REST API layout: /rest/v1/<table>).
//
// Tables:
//   zones       one row per zone, looked up by name
//   summary     entries/exits/current_count, always written
//   detailed    zone-scoped snapshot with extended metrics; only written
//               when the startup probe found the table
//   alerts      capacity alerts
//   crossings   one row per counted crossing

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    AlertPayload, CrossingRecord, OccupancyStore, SinkCapabilities, SnapshotPayload, ZoneDescriptor,
    ZoneId,
};
use crate::tracking::crossing::CrossingDirection;
use crate::types::{StoreConfig, TableNames};

pub struct RestStore {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    tables: TableNames,
    detailed_available: AtomicBool,
}

impl RestStore {
    pub fn new(config: &StoreConfig, api_key: Option<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        if api_key.is_none() {
            warn!(
                "No API key in ${}; requests will be unauthenticated",
                config.api_key_env
            );
        }

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            tables: config.tables.clone(),
            detailed_available: AtomicBool::new(false),
        })
    }

    /// Build the client and probe optional tables.
    pub async fn connect(config: &StoreConfig, api_key: Option<String>) -> Result<Self> {
        let store = Self::new(config, api_key)?;
        store.probe_capabilities().await;
        Ok(store)
    }

    pub async fn probe_capabilities(&self) {
        let available = match self.table_exists(&self.tables.detailed).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(
                    "Could not probe table '{}': {:#}; extended metrics disabled",
                    self.tables.detailed, e
                );
                false
            }
        };
        self.detailed_available.store(available, Ordering::Relaxed);
        if available {
            info!("Extended metrics enabled (table '{}')", self.tables.detailed);
        } else {
            info!(
                "Table '{}' not available; writing summary rows only",
                self.tables.detailed
            );
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let builder = self.http_client.request(method, self.table_url(table));
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let response = self
            .request(Method::GET, table)
            .query(&[("limit", "0")])
            .send()
            .await
            .with_context(|| format!("Probe of '{}' failed", table))?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => bail!("Probe of '{}' returned {}", table, s),
        }
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<()> {
        let response = self
            .request(Method::POST, table)
            .json(row)
            .send()
            .await
            .with_context(|| format!("Insert into '{}' failed", table))?;
        check_status(table, response).await?;
        Ok(())
    }
}

async fn check_status(table: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    bail!("'{}' returned {}: {}", table, status, body)
}

/// Zone ids come back as JSON numbers or strings depending on the schema.
fn zone_id_from(value: &Value) -> Result<ZoneId> {
    match value {
        Value::String(s) => Ok(ZoneId(s.clone())),
        Value::Number(n) => Ok(ZoneId(n.to_string())),
        other => Err(anyhow!("Unexpected zone id value: {}", other)),
    }
}

fn zone_row(zone: &ZoneDescriptor) -> Value {
    json!({
        "name": zone.name,
        "location": zone.location,
        "zone": zone.label,
        "line_y": zone.line_y,
        "max_capacity": zone.max_capacity,
        "status": "active",
        "last_seen": Utc::now().to_rfc3339(),
    })
}

fn summary_row(payload: &SnapshotPayload) -> Value {
    json!({
        "entries": payload.entries,
        "exits": payload.exits,
        "current_count": payload.occupancy,
    })
}

fn detailed_row(payload: &SnapshotPayload) -> Value {
    let mut row = json!({
        "camera_id": payload.zone_id,
        "entries": payload.entries,
        "exits": payload.exits,
        "current_count": payload.occupancy,
        "timestamp": payload.timestamp.to_rfc3339(),
    });
    if let (Some(ext), Some(obj)) = (&payload.extended, row.as_object_mut()) {
        obj.insert("tracked_objects_count".into(), json!(ext.active_tracks));
        obj.insert("average_dwell_time".into(), json!(ext.average_dwell_secs));
        obj.insert("peak_count".into(), json!(ext.peak_occupancy));
        obj.insert(
            "metadata".into(),
            json!({
                "total_tracked": ext.tracked_total,
                "counted_ids": ext.counted_total,
                "trigger": ext.trigger,
            }),
        );
    }
    row
}

fn alert_row(payload: &AlertPayload) -> Value {
    json!({
        "camera_id": payload.zone_id,
        "alert_type": payload.severity,
        "title": payload.title,
        "message": payload.message,
        "current_count": payload.current_count,
        "threshold_value": payload.threshold_value,
    })
}

fn crossing_row(record: &CrossingRecord) -> Value {
    let time_column = match record.direction {
        CrossingDirection::Entry => "entry_time",
        CrossingDirection::Exit => "exit_time",
    };
    json!({
        "camera_id": record.zone_id,
        "track_id": record.track_id,
        "direction": record.direction.as_str(),
        "crossed_line": true,
        time_column: record.timestamp.to_rfc3339(),
    })
}

#[async_trait]
impl OccupancyStore for RestStore {
    fn name(&self) -> &str {
        "rest"
    }

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            extended_metrics: self.detailed_available.load(Ordering::Relaxed),
        }
    }

    async fn register_zone(&self, zone: &ZoneDescriptor) -> Result<ZoneId> {
        let table = &self.tables.zones;
        let response = self
            .request(Method::GET, table)
            .query(&[("name", format!("eq.{}", zone.name)), ("select", "id".to_string())])
            .send()
            .await
            .with_context(|| format!("Zone lookup in '{}' failed", table))?;
        let rows: Vec<Value> = check_status(table, response)
            .await?
            .json()
            .await
            .context("Zone lookup returned invalid JSON")?;

        if let Some(id) = rows.first().and_then(|row| row.get("id")) {
            let zone_id = zone_id_from(id)?;
            let response = self
                .request(Method::PATCH, table)
                .query(&[("id", format!("eq.{}", zone_id))])
                .json(&json!({
                    "status": "active",
                    "last_seen": Utc::now().to_rfc3339(),
                }))
                .send()
                .await
                .context("Zone refresh failed")?;
            check_status(table, response).await?;
            info!("Zone '{}' found (id {}), marked active", zone.name, zone_id);
            return Ok(zone_id);
        }

        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&zone_row(zone))
            .send()
            .await
            .context("Zone creation failed")?;
        let created: Vec<Value> = check_status(table, response)
            .await?
            .json()
            .await
            .context("Zone creation returned invalid JSON")?;
        let id = created
            .first()
            .and_then(|row| row.get("id"))
            .ok_or_else(|| anyhow!("Zone creation returned no id"))?;
        let zone_id = zone_id_from(id)?;
        info!("Zone '{}' created (id {})", zone.name, zone_id);
        Ok(zone_id)
    }

    async fn deactivate_zone(&self, zone_id: &ZoneId) -> Result<()> {
        let table = &self.tables.zones;
        let response = self
            .request(Method::PATCH, table)
            .query(&[("id", format!("eq.{}", zone_id))])
            .json(&json!({
                "status": "inactive",
                "last_seen": Utc::now().to_rfc3339(),
            }))
            .send()
            .await
            .context("Zone deactivation failed")?;
        check_status(table, response).await?;
        Ok(())
    }

    async fn push_snapshot(&self, payload: &SnapshotPayload) -> Result<()> {
        self.insert(&self.tables.summary, &summary_row(payload))
            .await?;
        if self.detailed_available.load(Ordering::Relaxed) {
            self.insert(&self.tables.detailed, &detailed_row(payload))
                .await?;
        } else {
            debug!("Skipping detailed snapshot row (table unavailable)");
        }
        Ok(())
    }

    async fn push_alert(&self, payload: &AlertPayload) -> Result<()> {
        self.insert(&self.tables.alerts, &alert_row(payload)).await
    }

    async fn push_crossing(&self, record: &CrossingRecord) -> Result<()> {
        self.insert(&self.tables.crossings, &crossing_row(record))
            .await
    }
}
