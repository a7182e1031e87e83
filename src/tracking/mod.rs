// src/tracking/mod.rs

pub mod counter;
pub mod crossing;
pub mod evictor;
pub mod track_store;

pub use counter::{CounterAggregator, CounterState};
pub use crossing::{CountedSet, CrossingDetector, CrossingDirection, CrossingEvent, CrossingPolicy};
pub use evictor::{EvictionReport, StaleEvictor};
pub use track_store::{PriorState, Side, TrackRecord, TrackStore, Upsert};
