// src/tracking/counter.rs

use serde::Serialize;

use crate::tracking::crossing::CrossingDirection;

/// Cumulative entry/exit counters for one zone.
///
/// Occupancy is always derived from the two counters and floored at zero;
/// it is never stored on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterState {
    pub entries: u64,
    pub exits: u64,
    pub peak_occupancy: u64,
}

impl CounterState {
    pub fn occupancy(&self) -> u64 {
        self.entries.saturating_sub(self.exits)
    }

    pub fn totals(&self) -> (u64, u64) {
        (self.entries, self.exits)
    }
}

#[derive(Debug, Default)]
pub struct CounterAggregator {
    state: CounterState,
}

impl CounterAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, direction: CrossingDirection) -> CounterState {
        match direction {
            CrossingDirection::Entry => self.state.entries += 1,
            CrossingDirection::Exit => self.state.exits += 1,
        }
        self.state.peak_occupancy = self.state.peak_occupancy.max(self.state.occupancy());
        self.state
    }

    pub fn state(&self) -> CounterState {
        self.state
    }
}
