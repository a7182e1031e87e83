// src/pipeline/mod.rs

pub mod alerts;
pub mod engine;
pub mod event_bus;
pub mod metrics;
pub mod sync_scheduler;

pub use alerts::{Alert, AlertEvaluator, AlertKind};
pub use engine::{OccupancyEngine, OccupancySnapshot};
pub use event_bus::{EngineEvent, EventBus};
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use sync_scheduler::{SyncPolicy, SyncScheduler, SyncTrigger};
