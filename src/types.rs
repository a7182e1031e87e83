use serde::{Deserialize, Serialize};

/// Upstream tracker identity.
pub type TrackId = u64;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub zone: ZoneConfig,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub name: String,
    pub location: String,
    /// Short zone label used in alert messages ("Entrance").
    pub label: String,
    pub max_capacity: u64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            name: "Main Entrance".to_string(),
            location: "Building A - Floor 1".to_string(),
            label: "Entrance".to_string(),
            max_capacity: 50,
        }
    }
}

/// Which crossing rule the detector applies. See `tracking::crossing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingPolicyKind {
    Hysteresis,
    Transition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Vertical pixel position of the counting line
    pub y: i32,
    pub policy: CrossingPolicyKind,
    /// Hysteresis band half-width (hysteresis policy)
    pub buffer: i32,
    /// Approach offset (transition policy)
    pub offset: i32,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            y: 300,
            policy: CrossingPolicyKind::Hysteresis,
            buffer: 15,
            offset: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub stale_ttl_secs: f64,
    pub active_window_secs: f64,
    /// None keeps counted identities forever.
    pub counted_ttl_secs: Option<f64>,
    pub record_paths: bool,
    pub max_path_len: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            stale_ttl_secs: 30.0,
            active_window_secs: 5.0,
            counted_ttl_secs: None,
            record_paths: true,
            max_path_len: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Debounced,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub mode: SyncMode,
    pub min_push_interval_secs: f64,
    pub pulse_interval_secs: f64,
    pub push_interval_secs: f64,
    /// Bounded hand-off between the tick loop and the background sender
    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Debounced,
            min_push_interval_secs: 2.0,
            pulse_interval_secs: 300.0,
            push_interval_secs: 5.0,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub cooldown_secs: f64,
    pub emit_cleared: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 60.0,
            emit_cleared: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Rest,
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub jsonl_path: String,
    pub log_crossings: bool,
    pub tables: TableNames,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Jsonl,
            url: "http://localhost:54321".to_string(),
            api_key_env: "OCCUPANCY_STORE_KEY".to_string(),
            timeout_secs: 5,
            jsonl_path: "output/occupancy.jsonl".to_string(),
            log_crossings: true,
            tables: TableNames::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub zones: String,
    pub summary: String,
    pub detailed: String,
    pub alerts: String,
    pub crossings: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            zones: "cameras".to_string(),
            summary: "crowd_log".to_string(),
            detailed: "crowd_log_detailed".to_string(),
            alerts: "alerts_log".to_string(),
            crossings: "person_tracking".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    Wall,
    Frame,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub clock: ClockMode,
    pub housekeeping_interval_ms: u64,
    pub event_bus_capacity: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            clock: ClockMode::Wall,
            housekeeping_interval_ms: 1000,
            event_bus_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "zone_occupancy=info".to_string(),
        }
    }
}

/// Pixel-space point, integer like the upstream boxes after rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// A validated detection for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub id: TrackId,
    pub center: Point,
}
