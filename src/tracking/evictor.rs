// src/tracking/evictor.rs
//
// Removes identities the tracker stopped reporting. CountedSet membership
// outlives the record unless a counted TTL is configured.

use tracing::debug;

use crate::tracking::crossing::CountedSet;
use crate::tracking::track_store::TrackStore;
use crate::types::{TrackId, TrackingConfig};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvictionReport {
    pub evicted: Vec<TrackId>,
    pub counted_expired: usize,
}

impl EvictionReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.counted_expired == 0
    }
}

#[derive(Debug, Clone)]
pub struct StaleEvictor {
    ttl: f64,
    active_window: f64,
    counted_ttl: Option<f64>,
}

impl StaleEvictor {
    pub fn new(ttl: f64, active_window: f64, counted_ttl: Option<f64>) -> Self {
        Self {
            ttl,
            active_window,
            counted_ttl,
        }
    }

    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::new(
            config.stale_ttl_secs,
            config.active_window_secs,
            config.counted_ttl_secs,
        )
    }

    pub fn run(&self, store: &mut TrackStore, counted: &mut CountedSet, now: f64) -> EvictionReport {
        let evicted = store.evict(now, self.ttl);
        let counted_expired = match self.counted_ttl {
            Some(ttl) => counted.expire(now, ttl, |id| store.contains(id)),
            None => 0,
        };

        if !evicted.is_empty() || counted_expired > 0 {
            debug!(
                "Evicted {} stale track(s), expired {} counted id(s), {} live",
                evicted.len(),
                counted_expired,
                store.len()
            );
        }

        EvictionReport {
            evicted,
            counted_expired,
        }
    }

    /// Live-track count for reporting; never used for eviction.
    pub fn active_count(&self, store: &TrackStore, now: f64) -> usize {
        store.active_count(now, self.active_window)
    }
}
