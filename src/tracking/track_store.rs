// src/tracking/track_store.rs
//
// Per-identity state for every identity the upstream tracker currently
// reports. One record per live identity; records are created on first
// sight and only removed by eviction.

use std::collections::{HashMap, VecDeque};

use crate::tracking::crossing::CrossingDirection;
use crate::types::{Point, TrackId};

/// Side of the counting line an identity was first observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Above the line (y < line_y)
    Top,
    /// On or below the line
    Bottom,
}

impl Side {
    pub fn classify(y: i32, line_y: i32) -> Self {
        if y < line_y {
            Side::Top
        } else {
            Side::Bottom
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "TOP",
            Self::Bottom => "BOTTOM",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub id: TrackId,
    pub vertical_position: i32,
    pub origin: Side,
    /// Set once this identity has been counted
    pub crossed: Option<CrossingDirection>,
    pub first_seen: f64,
    pub last_seen: f64,
    pub path: VecDeque<Point>,
}

impl TrackRecord {
    pub fn dwell_secs(&self) -> f64 {
        (self.last_seen - self.first_seen).max(0.0)
    }
}

/// Record state as it was before an update was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorState {
    pub previous_y: i32,
    pub origin: Side,
    pub crossed: Option<CrossingDirection>,
    pub first_seen: f64,
    pub last_seen: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upsert {
    /// First observation; no prior position exists.
    Created,
    Updated(PriorState),
}

pub struct TrackStore {
    records: HashMap<TrackId, TrackRecord>,
    line_y: i32,
    record_paths: bool,
    max_path_len: usize,
}

impl TrackStore {
    pub fn new(line_y: i32, record_paths: bool, max_path_len: usize) -> Self {
        Self {
            records: HashMap::new(),
            line_y,
            record_paths,
            max_path_len: max_path_len.max(1),
        }
    }

    pub fn upsert(&mut self, id: TrackId, position: Point, now: f64) -> Upsert {
        let record_paths = self.record_paths;
        let max_path_len = self.max_path_len;

        match self.records.get_mut(&id) {
            Some(record) => {
                let prior = PriorState {
                    previous_y: record.vertical_position,
                    origin: record.origin,
                    crossed: record.crossed,
                    first_seen: record.first_seen,
                    last_seen: record.last_seen,
                };
                record.vertical_position = position.y;
                record.last_seen = now;
                if record_paths {
                    if record.path.len() >= max_path_len {
                        record.path.pop_front();
                    }
                    record.path.push_back(position);
                }
                Upsert::Updated(prior)
            }
            None => {
                let mut path = VecDeque::new();
                if record_paths {
                    path.push_back(position);
                }
                self.records.insert(
                    id,
                    TrackRecord {
                        id,
                        vertical_position: position.y,
                        origin: Side::classify(position.y, self.line_y),
                        crossed: None,
                        first_seen: now,
                        last_seen: now,
                        path,
                    },
                );
                Upsert::Created
            }
        }
    }

    pub fn mark_crossed(&mut self, id: TrackId, direction: CrossingDirection) {
        if let Some(record) = self.records.get_mut(&id) {
            record.crossed = Some(direction);
        }
    }

    /// Remove every record with `now - last_seen >= ttl`. Returns the removed ids.
    pub fn evict(&mut self, now: f64, ttl: f64) -> Vec<TrackId> {
        let stale: Vec<TrackId> = self
            .records
            .values()
            .filter(|r| now - r.last_seen >= ttl)
            .map(|r| r.id)
            .collect();
        for id in &stale {
            self.records.remove(id);
        }
        stale
    }

    /// Records seen within `window` seconds of `now`.
    pub fn active_count(&self, now: f64, window: f64) -> usize {
        self.records
            .values()
            .filter(|r| now - r.last_seen < window)
            .count()
    }

    /// Mean dwell over live records, 0 when empty.
    pub fn average_dwell_secs(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let total: f64 = self.records.values().map(TrackRecord::dwell_secs).sum();
        total / self.records.len() as f64
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn line_y(&self) -> i32 {
        self.line_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: i32, y: i32) -> Point {
        Point { x, y }
    }

    #[test]
    fn test_first_sight_classifies_origin() {
        let mut store = TrackStore::new(300, true, 16);
        assert_eq!(store.line_y(), 300);
        assert_eq!(store.upsert(1, pt(10, 250), 0.0), Upsert::Created);
        assert_eq!(store.upsert(2, pt(10, 300), 0.0), Upsert::Created);
        assert_eq!(store.get(1).unwrap().origin, Side::Top);
        // On the line counts as bottom
        assert_eq!(store.get(2).unwrap().origin, Side::Bottom);
    }

    #[test]
    fn test_update_returns_prior_state() {
        let mut store = TrackStore::new(300, false, 16);
        store.upsert(7, pt(0, 290), 1.0);
        match store.upsert(7, pt(0, 305), 1.5) {
            Upsert::Updated(prior) => {
                assert_eq!(prior.previous_y, 290);
                assert_eq!(prior.last_seen, 1.0);
                assert_eq!(prior.origin, Side::Top);
            }
            Upsert::Created => panic!("expected update"),
        }
        let record = store.get(7).unwrap();
        assert_eq!(record.vertical_position, 305);
        assert_eq!(record.last_seen, 1.5);
        assert_eq!(record.first_seen, 1.0);
        assert!(record.path.is_empty());
    }

    #[test]
    fn test_path_is_capped() {
        let mut store = TrackStore::new(300, true, 3);
        for i in 0..5 {
            store.upsert(1, pt(i, i), i as f64);
        }
        let path: Vec<i32> = store.get(1).unwrap().path.iter().map(|p| p.x).collect();
        assert_eq!(path, vec![2, 3, 4]);
    }

    #[test]
    fn test_evict_uses_inclusive_ttl() {
        let mut store = TrackStore::new(300, false, 1);
        store.upsert(1, pt(0, 0), 0.0);
        store.upsert(2, pt(0, 0), 5.0);
        let evicted = store.evict(30.0, 30.0);
        assert_eq!(evicted, vec![1]);
        assert!(!store.contains(1));
        assert!(store.contains(2));
    }

    #[test]
    fn test_active_count_and_dwell() {
        let mut store = TrackStore::new(300, false, 1);
        store.upsert(1, pt(0, 0), 0.0);
        store.upsert(1, pt(0, 0), 4.0);
        store.upsert(2, pt(0, 0), 8.0);
        store.upsert(2, pt(0, 0), 10.0);
        assert_eq!(store.active_count(10.0, 5.0), 1);
        assert!((store.average_dwell_secs() - 3.0).abs() < 1e-9);
        assert_eq!(TrackStore::new(0, false, 1).average_dwell_secs(), 0.0);
    }
}
