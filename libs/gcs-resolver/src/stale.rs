//! Frozen-sensor detection
//!
//! A dynamic measurement that has not moved by at least the tolerance for the
//! full threshold is considered frozen. Non-dynamic parameters (setpoints,
//! counters, identifiers) are never stale.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;

/// Name fragments that mark a parameter as a dynamic measurement
pub const DYNAMIC_KEYWORDS: &[&str] = &[
    "temp", "pressure", "pres", "flow", "rpm", "speed", "vibration", "vib", "amp", "current",
    "power", "load",
];

/// Minimum change that counts as movement
pub const DEFAULT_CHANGE_TOLERANCE: f64 = 0.01;

/// How long a value may stay unchanged before it is frozen
pub const DEFAULT_STALE_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy)]
struct StaleState {
    last_value: f64,
    last_changed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StaleTracker {
    tolerance: f64,
    threshold: Duration,
    states: Mutex<HashMap<String, StaleState>>,
}

impl Default for StaleTracker {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_STALE_MINUTES), DEFAULT_CHANGE_TOLERANCE)
    }
}

impl StaleTracker {
    pub fn new(threshold: Duration, tolerance: f64) -> Self {
        Self {
            tolerance,
            threshold,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_dynamic(parameter: &str) -> bool {
        let lower = parameter.to_lowercase();
        DYNAMIC_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }

    /// Observe `value` at `now` and report whether it is frozen
    ///
    /// The first observation and any change of at least the tolerance reset
    /// the timer.
    pub fn is_stale_at(&self, parameter: &str, value: f64, now: DateTime<Utc>) -> bool {
        if !Self::is_dynamic(parameter) {
            return false;
        }

        let mut states = self.states.lock();
        let Some(state) = states.get_mut(parameter) else {
            states.insert(
                parameter.to_string(),
                StaleState {
                    last_value: value,
                    last_changed_at: now,
                },
            );
            return false;
        };

        if (value - state.last_value).abs() >= self.tolerance {
            state.last_value = value;
            state.last_changed_at = now;
            return false;
        }

        let frozen = now - state.last_changed_at >= self.threshold;
        if frozen {
            debug!(
                "{} frozen at {} since {}",
                parameter, state.last_value, state.last_changed_at
            );
        }
        frozen
    }

    /// Number of tracked parameters
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_vocabulary() {
        assert!(StaleTracker::is_dynamic("engine_rpm"));
        assert!(StaleTracker::is_dynamic("Stg1_Discharge_Pressure"));
        assert!(StaleTracker::is_dynamic("motor_current"));
        assert!(!StaleTracker::is_dynamic("hour_meter"));
        assert!(!StaleTracker::is_dynamic("unit_serial"));
    }

    #[test]
    fn test_frozen_after_threshold() {
        let tracker = StaleTracker::default();
        let t0 = Utc::now();
        assert!(!tracker.is_stale_at("engine_rpm", 1500.0, t0));
        assert!(!tracker.is_stale_at("engine_rpm", 1500.005, t0 + Duration::minutes(4)));
        assert!(tracker.is_stale_at("engine_rpm", 1500.0, t0 + Duration::minutes(5)));

        // movement resets immediately
        assert!(!tracker.is_stale_at("engine_rpm", 1501.0, t0 + Duration::minutes(6)));
        assert!(!tracker.is_stale_at("engine_rpm", 1501.0, t0 + Duration::minutes(10)));
        assert!(tracker.is_stale_at("engine_rpm", 1501.0, t0 + Duration::minutes(11)));
    }

    #[test]
    fn test_non_dynamic_never_stale() {
        let tracker = StaleTracker::default();
        let t0 = Utc::now();
        tracker.is_stale_at("hour_meter", 10.0, t0);
        assert!(!tracker.is_stale_at("hour_meter", 10.0, t0 + Duration::hours(3)));
        assert!(tracker.is_empty());
    }
}
