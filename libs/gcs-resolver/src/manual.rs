//! Operator overrides keyed by `(unit, parameter)`

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ManualOverride {
    pub value: f64,
    pub set_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ManualOverride {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

/// Last writer wins; expired entries are removed on read
#[derive(Debug, Default)]
pub struct ManualOverrideStore {
    entries: Mutex<HashMap<String, HashMap<String, ManualOverride>>>,
}

impl ManualOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, unit_id: &str, parameter: &str, entry: ManualOverride) {
        self.entries
            .lock()
            .entry(unit_id.to_string())
            .or_default()
            .insert(parameter.to_string(), entry);
        debug!("Manual override set: {}.{} = {}", unit_id, parameter, entry.value);
    }

    /// Remove an override; true if one existed
    pub fn clear(&self, unit_id: &str, parameter: &str) -> bool {
        let mut entries = self.entries.lock();
        let Some(unit) = entries.get_mut(unit_id) else {
            return false;
        };
        let removed = unit.remove(parameter).is_some();
        if unit.is_empty() {
            entries.remove(unit_id);
        }
        removed
    }

    /// Active override value at `now`, dropping it if expired
    pub fn get_at(&self, unit_id: &str, parameter: &str, now: DateTime<Utc>) -> Option<f64> {
        let mut entries = self.entries.lock();
        let unit = entries.get_mut(unit_id)?;
        let entry = unit.get(parameter)?;
        if entry.is_expired_at(now) {
            unit.remove(parameter);
            debug!("Manual override expired: {}.{}", unit_id, parameter);
            return None;
        }
        Some(entry.value)
    }

    /// Parameters with an override for a unit, expired or not
    pub fn parameters(&self, unit_id: &str) -> Vec<String> {
        let entries = self.entries.lock();
        let mut params: Vec<String> = entries
            .get(unit_id)
            .map(|unit| unit.keys().cloned().collect())
            .unwrap_or_default();
        params.sort();
        params
    }
}
