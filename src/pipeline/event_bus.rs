// src/pipeline/event_bus.rs
//
// Outbound events produced by the engine during a tick. The tick loop
// drains the bus after every tick and routes events to the store.

use std::collections::VecDeque;
use tracing::warn;

use crate::pipeline::alerts::Alert;
use crate::pipeline::engine::OccupancySnapshot;
use crate::pipeline::sync_scheduler::SyncTrigger;
use crate::tracking::crossing::CrossingEvent;
use crate::types::TrackId;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Crossing(CrossingEvent),

    SnapshotDue {
        trigger: SyncTrigger,
        snapshot: OccupancySnapshot,
    },

    Alert(Alert),

    TracksEvicted {
        ids: Vec<TrackId>,
        counted_expired: usize,
    },
}

pub struct EventBus {
    events: VecDeque<EngineEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn publish(&mut self, event: EngineEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evicted(id: TrackId) -> EngineEvent {
        EngineEvent::TracksEvicted {
            ids: vec![id],
            counted_expired: 0,
        }
    }

    #[test]
    fn test_drops_oldest_when_full() {
        let mut bus = EventBus::new(2);
        bus.publish(evicted(1));
        bus.publish(evicted(2));
        bus.publish(evicted(3));
        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        match &drained[0] {
            EngineEvent::TracksEvicted { ids, .. } => assert_eq!(ids, &vec![2]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(bus.pending_count(), 0);
    }
}
