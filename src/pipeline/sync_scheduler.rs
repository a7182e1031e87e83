// src/pipeline/sync_scheduler.rs
//
// Decides when counter state goes downstream. Two policies:
//   Debounced: push on change (at most once per min interval) OR on pulse
//   Fixed: push every interval, no change detection

use serde::Serialize;
use tracing::debug;

use crate::tracking::counter::CounterState;
use crate::types::{SyncConfig, SyncMode};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncPolicy {
    Debounced {
        min_push_interval: f64,
        pulse_interval: f64,
    },
    Fixed {
        push_interval: f64,
    },
}

impl SyncPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        match config.mode {
            SyncMode::Debounced => SyncPolicy::Debounced {
                min_push_interval: config.min_push_interval_secs,
                pulse_interval: config.pulse_interval_secs,
            },
            SyncMode::Fixed => SyncPolicy::Fixed {
                push_interval: config.push_interval_secs,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Changed,
    Pulse,
    Interval,
    /// Final flush on shutdown
    Shutdown,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::Pulse => "pulse",
            Self::Interval => "interval",
            Self::Shutdown => "shutdown",
        }
    }
}

pub struct SyncScheduler {
    policy: SyncPolicy,
    started_at: f64,
    last_push_time: Option<f64>,
    last_pushed: Option<(u64, u64)>,
}

impl SyncScheduler {
    pub fn new(policy: SyncPolicy, started_at: f64) -> Self {
        Self {
            policy,
            started_at,
            last_push_time: None,
            last_pushed: None,
        }
    }

    /// Whether a push is due for `counters` at `now`.
    pub fn poll(&self, counters: &CounterState, now: f64) -> Option<SyncTrigger> {
        match self.policy {
            SyncPolicy::Debounced {
                min_push_interval,
                pulse_interval,
            } => {
                let since = self
                    .last_push_time
                    .map_or(f64::INFINITY, |last| now - last);
                let changed = self.last_pushed != Some(counters.totals());

                if changed && since >= min_push_interval {
                    Some(SyncTrigger::Changed)
                } else if since >= pulse_interval {
                    Some(SyncTrigger::Pulse)
                } else {
                    None
                }
            }
            SyncPolicy::Fixed { push_interval } => {
                let last = self.last_push_time.unwrap_or(self.started_at);
                (now - last >= push_interval).then_some(SyncTrigger::Interval)
            }
        }
    }

    /// Record that a push of `counters` was attempted at `now`, whatever its outcome.
    pub fn record_push(&mut self, counters: &CounterState, now: f64) {
        self.last_push_time = Some(now);
        self.last_pushed = Some(counters.totals());
        debug!(
            "Push recorded at {:.2}s: in={} out={}",
            now, counters.entries, counters.exits
        );
    }

    pub fn last_push_time(&self) -> Option<f64> {
        self.last_push_time
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }
}
