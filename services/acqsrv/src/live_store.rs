//! Latest scaled snapshot per unit
//!
//! The poll callback writes here; readers (status reporting, resolution)
//! take cheap `Arc` clones without touching the poller.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct UnitSnapshot {
    pub values: Arc<HashMap<String, f64>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct UnitLiveStore {
    units: DashMap<String, UnitSnapshot>,
}

impl UnitLiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a unit's snapshot wholesale
    pub fn update(&self, unit_id: &str, values: Arc<HashMap<String, f64>>) {
        self.update_at(unit_id, values, Utc::now());
    }

    pub fn update_at(&self, unit_id: &str, values: Arc<HashMap<String, f64>>, at: DateTime<Utc>) {
        self.units.insert(
            unit_id.to_string(),
            UnitSnapshot {
                values,
                updated_at: at,
            },
        );
    }

    pub fn get(&self, unit_id: &str) -> Option<UnitSnapshot> {
        self.units.get(unit_id).map(|entry| entry.value().clone())
    }

    /// Seconds since the unit was last updated, as of `now`
    pub fn age_seconds(&self, unit_id: &str, now: DateTime<Utc>) -> Option<f64> {
        self.units
            .get(unit_id)
            .map(|entry| (now - entry.updated_at).num_milliseconds() as f64 / 1000.0)
    }

    pub fn units(&self) -> Vec<String> {
        let mut units: Vec<String> = self.units.iter().map(|e| e.key().clone()).collect();
        units.sort();
        units
    }
}
