// src/tracking/crossing.rs
//
// Line crossing detection for tracked identities.
//
// Two named policies, selected by configuration:
//
//   HysteresisBand: single lifetime event. The identity's origin side is
//     fixed on first sight; it fires once the identity is seen past the far
//     edge of the band (line_y ± buffer). Oscillating on the line never fires.
//
//   Transition: per-traversal event. Each update compares the previous and
//     current y against the line with a small approach offset. Downward
//     traversal is an entry, upward traversal an exit.
//
// Either way an identity is counted at most once while it is in the
// CountedSet.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::tracking::track_store::{PriorState, Side, TrackStore, Upsert};
use crate::types::{CrossingPolicyKind, LineConfig, Point, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingDirection {
    /// Downward traversal into the zone
    Entry,
    /// Upward traversal out of the zone
    Exit,
}

impl CrossingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingPolicy {
    HysteresisBand { buffer: i32 },
    Transition { offset: i32 },
}

impl CrossingPolicy {
    pub fn from_config(line: &LineConfig) -> Self {
        match line.policy {
            CrossingPolicyKind::Hysteresis => CrossingPolicy::HysteresisBand {
                buffer: line.buffer,
            },
            CrossingPolicyKind::Transition => CrossingPolicy::Transition {
                offset: line.offset,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::HysteresisBand { .. } => "hysteresis",
            Self::Transition { .. } => "transition",
        }
    }

    /// Direction implied by moving from `prior` to `current_y`, ignoring
    /// whether the identity was already counted.
    pub fn classify(&self, line_y: i32, prior: &PriorState, current_y: i32) -> Option<CrossingDirection> {
        match *self {
            CrossingPolicy::HysteresisBand { buffer } => match prior.origin {
                Side::Top if current_y > line_y + buffer => Some(CrossingDirection::Entry),
                Side::Bottom if current_y < line_y - buffer => Some(CrossingDirection::Exit),
                _ => None,
            },
            CrossingPolicy::Transition { offset } => {
                let previous_y = prior.previous_y;
                if previous_y < line_y && current_y >= line_y - offset {
                    Some(CrossingDirection::Entry)
                } else if previous_y > line_y && current_y <= line_y + offset {
                    Some(CrossingDirection::Exit)
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrossingEvent {
    pub track_id: TrackId,
    pub direction: CrossingDirection,
    pub position: Point,
    pub timestamp: f64,
}

/// Identities that already produced a crossing, with the time they did.
#[derive(Debug, Default)]
pub struct CountedSet {
    members: HashMap<TrackId, f64>,
}

impl CountedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id` unless present. Returns false when it was already counted.
    pub fn insert(&mut self, id: TrackId, now: f64) -> bool {
        match self.members.entry(id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.members.contains_key(&id)
    }

    /// Drop members counted at least `ttl` ago for which `is_live` is false.
    pub fn expire(&mut self, now: f64, ttl: f64, is_live: impl Fn(TrackId) -> bool) -> usize {
        let before = self.members.len();
        self.members
            .retain(|id, counted_at| is_live(*id) || now - *counted_at < ttl);
        before - self.members.len()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

pub struct CrossingDetector {
    line_y: i32,
    policy: CrossingPolicy,
    counted: CountedSet,
}

impl CrossingDetector {
    pub fn new(line_y: i32, policy: CrossingPolicy) -> Self {
        info!(
            "Crossing detector: policy={} line_y={} ({:?})",
            policy.name(),
            line_y,
            policy
        );
        Self {
            line_y,
            policy,
            counted: CountedSet::new(),
        }
    }

    /// Apply one identity's position update to the store and return the
    /// crossing it produced, if any.
    pub fn observe(
        &mut self,
        store: &mut TrackStore,
        id: TrackId,
        position: Point,
        now: f64,
    ) -> Option<CrossingEvent> {
        let prior = match store.upsert(id, position, now) {
            Upsert::Created => {
                debug!("New track {} at y={}", id, position.y);
                return None;
            }
            Upsert::Updated(prior) => prior,
        };

        if self.counted.contains(id) {
            return None;
        }

        let direction = self.policy.classify(self.line_y, &prior, position.y)?;

        if !self.counted.insert(id, now) {
            return None;
        }
        store.mark_crossed(id, direction);

        debug!(
            "Track {} crossed ({}): y {} -> {}",
            id,
            direction.as_str(),
            prior.previous_y,
            position.y
        );

        Some(CrossingEvent {
            track_id: id,
            direction,
            position,
            timestamp: now,
        })
    }

    pub fn counted(&self) -> &CountedSet {
        &self.counted
    }

    pub fn counted_mut(&mut self) -> &mut CountedSet {
        &mut self.counted
    }

    pub fn policy(&self) -> CrossingPolicy {
        self.policy
    }
}
