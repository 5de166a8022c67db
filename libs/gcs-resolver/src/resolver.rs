//! Chain walking and batch resolution

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use common::to_finite;

use crate::calculations::calculate;
use crate::chain::parse_chain;
use crate::clock::{Clock, SystemClock};
use crate::config::ParameterConfig;
use crate::lookup::lookup_live;
use crate::manual::{ManualOverride, ManualOverrideStore};
use crate::source::{quality_legend, DataSource, Quality, SourceMeta};
use crate::stale::StaleTracker;

/// One resolved parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveResult {
    pub parameter: String,
    pub value: Option<f64>,
    pub source: DataSource,
    pub quality: Quality,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
}

/// Column-oriented result of [`DataResolver::resolve_all`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedBatch {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, Option<f64>>,
    pub sources: BTreeMap<String, DataSource>,
    pub quality: BTreeMap<String, Quality>,
    pub details: BTreeMap<String, String>,
    pub quality_meta: BTreeMap<DataSource, SourceMeta>,
}

impl ResolvedBatch {
    /// Parameter count per source
    pub fn source_counts(&self) -> BTreeMap<DataSource, usize> {
        let mut counts = BTreeMap::new();
        for source in self.sources.values() {
            *counts.entry(*source).or_insert(0) += 1;
        }
        counts
    }
}

/// Resolves parameters through their source chains
///
/// Holds the process-wide staleness and manual-override state; construct one
/// per process and share it by reference.
pub struct DataResolver {
    stale: StaleTracker,
    manual: ManualOverrideStore,
    clock: Arc<dyn Clock>,
}

impl Default for DataResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataResolver")
            .field("stale_tracked", &self.stale.len())
            .finish()
    }
}

impl DataResolver {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(StaleTracker::default(), clock)
    }

    pub fn with_parts(stale: StaleTracker, clock: Arc<dyn Clock>) -> Self {
        Self {
            stale,
            manual: ManualOverrideStore::new(),
            clock,
        }
    }

    /// Set an operator override; non-finite values are refused
    pub fn set_manual_value(
        &self,
        unit_id: &str,
        parameter: &str,
        value: f64,
        expires_at: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(value) = to_finite(value) else {
            warn!("Refusing non-finite manual value for {}.{}", unit_id, parameter);
            return false;
        };
        self.manual.set(
            unit_id,
            parameter,
            ManualOverride {
                value,
                set_at: self.clock.now(),
                expires_at,
            },
        );
        true
    }

    pub fn clear_manual_value(&self, unit_id: &str, parameter: &str) -> bool {
        self.manual.clear(unit_id, parameter)
    }

    /// Active override, if set and unexpired
    pub fn get_manual_value(&self, unit_id: &str, parameter: &str) -> Option<f64> {
        self.manual.get_at(unit_id, parameter, self.clock.now())
    }

    /// Resolve one parameter
    ///
    /// `live_value` is a pre-looked-up candidate for the LIVE source; when
    /// absent the snapshot is searched. Either way the candidate is subject
    /// to bounds and staleness checks.
    pub fn resolve(
        &self,
        unit_id: &str,
        parameter: &str,
        live_value: Option<f64>,
        live: &HashMap<String, f64>,
        config: &ParameterConfig,
    ) -> ResolveResult {
        let now = self.clock.now();
        let result = |value: Option<f64>, source: DataSource, detail: String| ResolveResult {
            parameter: parameter.to_string(),
            value,
            source,
            quality: source.quality(),
            timestamp: now,
            detail,
        };

        for source in parse_chain(config) {
            match source {
                DataSource::Live => {
                    let Some(value) = live_value
                        .and_then(to_finite)
                        .or_else(|| lookup_live(parameter, live))
                    else {
                        continue;
                    };
                    if !config.in_bounds(value) {
                        debug!("{}: live {} outside bounds", parameter, value);
                        continue;
                    }
                    if self.stale.is_stale_at(parameter, value, now) {
                        debug!("{}: live {} frozen, skipping", parameter, value);
                        continue;
                    }
                    return result(Some(value), source, "Live Modbus value".to_string());
                },
                DataSource::Calculated => {
                    if let Some(value) = calculate(parameter, live, config) {
                        let detail = config
                            .calc_formula
                            .clone()
                            .unwrap_or_else(|| "derived".to_string());
                        return result(Some(value), source, detail);
                    }
                },
                DataSource::Manual => {
                    let value = self
                        .manual
                        .get_at(unit_id, parameter, now)
                        .or(config.manual_value);
                    if let Some(value) = value {
                        return result(Some(value), source, "Manual override".to_string());
                    }
                },
                DataSource::Default => {
                    if let Some(value) = config.default_value() {
                        return result(Some(value), source, "Default fallback".to_string());
                    }
                },
                DataSource::Bad => {},
            }
        }

        result(None, DataSource::Bad, "No valid source".to_string())
    }

    /// Resolve a batch; one parameter's failure never affects another
    ///
    /// Without an explicit list, every configured parameter is resolved (or
    /// every live key when nothing is configured), plus any parameter with an
    /// operator override for this unit.
    pub fn resolve_all(
        &self,
        unit_id: &str,
        live: &HashMap<String, f64>,
        configs: &HashMap<String, ParameterConfig>,
        parameters: Option<&[String]>,
    ) -> ResolvedBatch {
        let parameters: Vec<String> = match parameters {
            Some(list) => list.to_vec(),
            None => {
                let mut names: Vec<String> = if configs.is_empty() {
                    live.keys().cloned().collect()
                } else {
                    configs.keys().cloned().collect()
                };
                names.sort();
                for name in self.manual.parameters(unit_id) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                names
            },
        };

        let empty = ParameterConfig::default();
        let mut batch = ResolvedBatch {
            timestamp: self.clock.now(),
            values: BTreeMap::new(),
            sources: BTreeMap::new(),
            quality: BTreeMap::new(),
            details: BTreeMap::new(),
            quality_meta: quality_legend(),
        };

        for parameter in parameters {
            let config = configs.get(&parameter).unwrap_or(&empty);
            let live_value = lookup_live(&parameter, live);
            let resolved = self.resolve(unit_id, &parameter, live_value, live, config);
            batch.values.insert(parameter.clone(), resolved.value);
            batch.sources.insert(parameter.clone(), resolved.source);
            batch.quality.insert(parameter.clone(), resolved.quality);
            batch.details.insert(parameter, resolved.detail);
        }
        batch
    }
}
