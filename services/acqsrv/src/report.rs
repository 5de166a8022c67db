//! Resolution view of the polled data
//!
//! Register rows double as parameter configs: chain, value mode, manual and
//! default values and calculation formulas are carried through unchanged.
//! Register `min`/`max` are raw-unit clamps and are not used as bounds.

use std::collections::HashMap;

use serde_json::Value;

use gcs_model::{RegisterDefinition, RegisterMap};
use gcs_resolver::{DataResolver, ParameterConfig, ResolvedBatch, SourcePriority};

fn source_priority(raw: &Value) -> Option<SourcePriority> {
    match raw {
        Value::Array(items) => Some(SourcePriority::List(items.clone())),
        Value::String(text) => Some(SourcePriority::Text(text.clone())),
        _ => None,
    }
}

pub fn parameter_config(def: &RegisterDefinition) -> ParameterConfig {
    ParameterConfig {
        source_priority: def.source_priority.as_ref().and_then(source_priority),
        value_mode: def.value_mode.clone(),
        manual_value: def.manual_value,
        default: def.default,
        nominal: def.nominal,
        calc_formula: def.calc_formula.clone(),
        ..Default::default()
    }
}

/// One config per named register
pub fn parameter_configs(map: &RegisterMap) -> HashMap<String, ParameterConfig> {
    map.iter()
        .filter(|def| !def.name.is_empty())
        .map(|def| (def.name.clone(), parameter_config(def)))
        .collect()
}

/// Resolve every configured register for a unit
pub fn resolve_unit(
    resolver: &DataResolver,
    unit_id: &str,
    live: &HashMap<String, f64>,
    map: &RegisterMap,
) -> ResolvedBatch {
    resolver.resolve_all(unit_id, live, &parameter_configs(map), None)
}
