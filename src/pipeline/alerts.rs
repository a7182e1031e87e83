// src/pipeline/alerts.rs
//
// Capacity alerts with per-kind cooldown.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::types::AlertConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CapacityReached,
    /// Occupancy fell back under capacity after a CapacityReached alert
    CapacityCleared,
}

impl AlertKind {
    /// Severity string stored with the alert.
    pub fn severity(&self) -> &'static str {
        match self {
            Self::CapacityReached => "critical",
            Self::CapacityCleared => "info",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::CapacityReached => "CAPACITY REACHED",
            Self::CapacityCleared => "CAPACITY CLEARED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub occupancy: u64,
    pub threshold: u64,
    pub raised_at: f64,
}

impl Alert {
    pub fn message(&self, zone_label: &str) -> String {
        match self.kind {
            AlertKind::CapacityReached => format!(
                "Zone {} is at full capacity ({}/{})",
                zone_label, self.occupancy, self.threshold
            ),
            AlertKind::CapacityCleared => format!(
                "Zone {} is back under capacity ({}/{})",
                zone_label, self.occupancy, self.threshold
            ),
        }
    }
}

pub struct AlertEvaluator {
    max_capacity: u64,
    cooldown: f64,
    emit_cleared: bool,
    last_alert: HashMap<AlertKind, f64>,
    /// A CapacityReached alert is outstanding
    over_capacity: bool,
}

impl AlertEvaluator {
    pub fn new(max_capacity: u64, cooldown: f64, emit_cleared: bool) -> Self {
        Self {
            max_capacity,
            cooldown,
            emit_cleared,
            last_alert: HashMap::new(),
            over_capacity: false,
        }
    }

    pub fn from_config(max_capacity: u64, config: &AlertConfig) -> Self {
        Self::new(max_capacity, config.cooldown_secs, config.emit_cleared)
    }

    /// A CapacityCleared is held back until the CapacityReached cooldown has
    /// passed, so a re-reach after a clear can always be raised immediately.
    pub fn evaluate(&mut self, occupancy: u64, now: f64) -> Option<Alert> {
        let reach_ready = self.cooled_down(AlertKind::CapacityReached, now);

        if occupancy >= self.max_capacity {
            if !reach_ready {
                return None;
            }
            self.over_capacity = true;
            warn!(
                "Capacity reached: {}/{}",
                occupancy, self.max_capacity
            );
            return Some(self.raise(AlertKind::CapacityReached, occupancy, now));
        }

        if !self.over_capacity {
            return None;
        }
        if !self.emit_cleared {
            self.over_capacity = false;
            return None;
        }
        if !reach_ready {
            debug!(
                "Under capacity ({}/{}), clear held until cooldown ends",
                occupancy, self.max_capacity
            );
            return None;
        }
        self.over_capacity = false;
        info!("Capacity cleared: {}/{}", occupancy, self.max_capacity);
        Some(self.raise(AlertKind::CapacityCleared, occupancy, now))
    }

    fn cooled_down(&self, kind: AlertKind, now: f64) -> bool {
        self.last_alert
            .get(&kind)
            .map_or(true, |last| now - last > self.cooldown)
    }

    fn raise(&mut self, kind: AlertKind, occupancy: u64, now: f64) -> Alert {
        self.last_alert.insert(kind, now);
        Alert {
            kind,
            occupancy,
            threshold: self.max_capacity,
            raised_at: now,
        }
    }

    pub fn last_alert_time(&self, kind: AlertKind) -> Option<f64> {
        self.last_alert.get(&kind).copied()
    }

    pub fn max_capacity(&self) -> u64 {
        self.max_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_at_threshold_not_before() {
        let mut eval = AlertEvaluator::new(50, 60.0, false);
        assert!(eval.evaluate(49, 0.0).is_none());
        let alert = eval.evaluate(50, 1.0).unwrap();
        assert_eq!(alert.kind, AlertKind::CapacityReached);
        assert_eq!(alert.threshold, 50);
        assert_eq!(alert.message("Entrance"), "Zone Entrance is at full capacity (50/50)");
    }

    #[test]
    fn test_one_alert_per_cooldown_window() {
        let mut eval = AlertEvaluator::new(10, 60.0, false);
        let mut fired = Vec::new();
        for s in 0..=180 {
            if let Some(a) = eval.evaluate(12, s as f64) {
                fired.push(a.raised_at);
            }
        }
        // strict >: 0, 61, 122
        assert_eq!(fired, vec![0.0, 61.0, 122.0]);
    }

    #[test]
    fn test_cleared_fires_once_after_reached() {
        let mut eval = AlertEvaluator::new(5, 60.0, true);
        assert_eq!(eval.max_capacity(), 5);
        assert!(eval.evaluate(4, 0.0).is_none());
        assert_eq!(eval.evaluate(5, 1.0).unwrap().kind, AlertKind::CapacityReached);
        assert_eq!(eval.last_alert_time(AlertKind::CapacityReached), Some(1.0));

        // Held while the reach cooldown runs
        assert!(eval.evaluate(4, 2.0).is_none());
        let cleared = eval.evaluate(4, 62.0).unwrap();
        assert_eq!(cleared.kind, AlertKind::CapacityCleared);
        assert!(cleared.message("Lobby").contains("back under capacity (4/5)"));
        assert_eq!(eval.last_alert_time(AlertKind::CapacityCleared), Some(62.0));
        assert!(eval.evaluate(3, 63.0).is_none());
    }

    #[test]
    fn test_rereach_inside_cooldown_never_leaves_cleared_as_last_alert() {
        let mut eval = AlertEvaluator::new(5, 60.0, true);
        let mut sent = Vec::new();
        for (occupancy, now) in [(5, 0.0), (4, 1.0), (6, 2.0), (6, 3.0), (4, 30.0), (4, 61.0), (6, 62.0)] {
            if let Some(alert) = eval.evaluate(occupancy, now) {
                sent.push((alert.kind, now));
            }
        }
        assert_eq!(
            sent,
            vec![
                (AlertKind::CapacityReached, 0.0),
                (AlertKind::CapacityCleared, 61.0),
                (AlertKind::CapacityReached, 62.0),
            ]
        );
    }

    #[test]
    fn test_cleared_disabled_matches_legacy_behavior() {
        let mut eval = AlertEvaluator::new(5, 60.0, false);
        eval.evaluate(6, 0.0);
        assert!(eval.evaluate(0, 1.0).is_none());
        // Re-reaching capacity inside the cooldown stays silent
        assert!(eval.evaluate(6, 30.0).is_none());
        assert!(eval.evaluate(6, 61.0).is_some());
    }
}
