//! Per-parameter resolution settings
//!
//! Rows come from register maps, JSON payloads and hand-written YAML, so
//! every field accepts its camelCase spelling and every number goes through
//! the lenient optional-number parser.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use common::deserialize_optional_f64;

/// A configured source chain, as a list or a delimited string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourcePriority {
    List(Vec<Value>),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ParameterRow")]
pub struct ParameterConfig {
    pub source_priority: Option<SourcePriority>,

    /// Strict-mode flag used when no chain is configured
    pub value_mode: Option<String>,

    pub min: Option<f64>,
    pub max: Option<f64>,
    pub manual_value: Option<f64>,
    pub default: Option<f64>,
    pub nominal: Option<f64>,

    /// Builtin calculation key or arithmetic expression
    pub calc_formula: Option<String>,

    pub cooler_approach_f: Option<f64>,
    pub interstage_dp: Option<f64>,
    pub speed_ratio: Option<f64>,
    pub elevation_ft: Option<f64>,
    pub k_suction: Option<f64>,
    pub k_discharge: Option<f64>,
}

/// Every accepted spelling as its own field
///
/// A row may carry several spellings of one setting; the first present in
/// precedence order wins.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParameterRow {
    #[serde(rename = "sourcePriority")]
    source_priority_camel: Option<SourcePriority>,
    source_priority: Option<SourcePriority>,

    #[serde(rename = "valueMode")]
    value_mode_camel: Option<String>,
    value_mode: Option<String>,

    #[serde(rename = "minValid", deserialize_with = "deserialize_optional_f64")]
    min_valid_camel: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    min_valid: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    min: Option<f64>,

    #[serde(rename = "maxValid", deserialize_with = "deserialize_optional_f64")]
    max_valid_camel: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    max_valid: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    max: Option<f64>,

    #[serde(rename = "manualValue", deserialize_with = "deserialize_optional_f64")]
    manual_value_camel: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    manual_value: Option<f64>,

    #[serde(deserialize_with = "deserialize_optional_f64")]
    default: Option<f64>,
    #[serde(rename = "defaultValue", deserialize_with = "deserialize_optional_f64")]
    default_value: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    nominal: Option<f64>,

    #[serde(rename = "calcFormula")]
    calc_formula_camel: Option<String>,
    #[serde(rename = "calculationFormula")]
    calculation_formula: Option<String>,
    calc_formula: Option<String>,
    calc_key: Option<String>,

    #[serde(rename = "coolerApproachF", deserialize_with = "deserialize_optional_f64")]
    cooler_approach_f_camel: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    cooler_approach_f: Option<f64>,

    #[serde(rename = "interstageDp", deserialize_with = "deserialize_optional_f64")]
    interstage_dp_camel: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    interstage_dp: Option<f64>,

    #[serde(rename = "speedRatio", deserialize_with = "deserialize_optional_f64")]
    speed_ratio_camel: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    speed_ratio: Option<f64>,

    #[serde(rename = "elevationFt", deserialize_with = "deserialize_optional_f64")]
    elevation_ft_camel: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    elevation_ft: Option<f64>,

    #[serde(rename = "kSuction", deserialize_with = "deserialize_optional_f64")]
    k_suction_camel: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    k_suction: Option<f64>,

    #[serde(rename = "kDischarge", deserialize_with = "deserialize_optional_f64")]
    k_discharge_camel: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    k_discharge: Option<f64>,
}

impl From<ParameterRow> for ParameterConfig {
    fn from(row: ParameterRow) -> Self {
        Self {
            source_priority: row.source_priority_camel.or(row.source_priority),
            value_mode: row.value_mode_camel.or(row.value_mode),
            min: row.min_valid_camel.or(row.min_valid).or(row.min),
            max: row.max_valid_camel.or(row.max_valid).or(row.max),
            manual_value: row.manual_value_camel.or(row.manual_value),
            default: row.default.or(row.default_value),
            nominal: row.nominal,
            calc_formula: row
                .calc_formula_camel
                .or(row.calculation_formula)
                .or(row.calc_formula)
                .or(row.calc_key),
            cooler_approach_f: row.cooler_approach_f_camel.or(row.cooler_approach_f),
            interstage_dp: row.interstage_dp_camel.or(row.interstage_dp),
            speed_ratio: row.speed_ratio_camel.or(row.speed_ratio),
            elevation_ft: row.elevation_ft_camel.or(row.elevation_ft),
            k_suction: row.k_suction_camel.or(row.k_suction),
            k_discharge: row.k_discharge_camel.or(row.k_discharge),
        }
    }
}

impl ParameterConfig {
    /// Config with an explicit chain and nothing else
    pub fn with_chain(sources: &[&str]) -> Self {
        Self {
            source_priority: Some(SourcePriority::List(
                sources.iter().map(|s| Value::String((*s).to_string())).collect(),
            )),
            ..Default::default()
        }
    }

    /// Parse an untyped row; malformed rows resolve with an empty config
    pub fn from_value(value: &Value) -> Self {
        match serde_json::from_value(value.clone()) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring malformed parameter config: {}", e);
                Self::default()
            },
        }
    }

    /// Configured default, else nominal
    pub fn default_value(&self) -> Option<f64> {
        self.default.or(self.nominal)
    }

    /// Whether a live value sits inside the configured bounds
    pub fn in_bounds(&self, value: f64) -> bool {
        if self.min.is_some_and(|min| value < min) {
            return false;
        }
        if self.max.is_some_and(|max| value > max) {
            return false;
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camel_case_aliases() {
        let config = ParameterConfig::from_value(&json!({
            "sourcePriority": "LIVE -> MANUAL",
            "valueMode": "LIVE",
            "minValid": 0,
            "maxValid": "2000",
            "manualValue": "NaN",
            "defaultValue": 1200,
            "calcFormula": "engine_rpm * speed_ratio",
            "speedRatio": 0.5
        }));
        assert_eq!(
            config.source_priority,
            Some(SourcePriority::Text("LIVE -> MANUAL".to_string()))
        );
        assert_eq!(config.min, Some(0.0));
        assert_eq!(config.max, Some(2000.0));
        assert_eq!(config.manual_value, None);
        assert_eq!(config.default_value(), Some(1200.0));
        assert_eq!(config.speed_ratio, Some(0.5));
        assert_eq!(config.calc_formula.as_deref(), Some("engine_rpm * speed_ratio"));
    }

    #[test]
    fn test_row_with_every_spelling() {
        let config = ParameterConfig::from_value(&json!({
            "min": 1,
            "min_valid": 2,
            "minValid": 3,
            "max": 100,
            "max_valid": 90,
            "default": 50,
            "defaultValue": 60,
            "manual_value": 7,
            "manualValue": 8,
            "calc_key": "pressure_ratio",
            "calcFormula": "engine_rpm * 2",
            "valueMode": "MANUAL",
            "value_mode": "LIVE",
            "speedRatio": 0.5,
            "speed_ratio": 0.25
        }));
        assert_eq!(config.min, Some(3.0));
        assert_eq!(config.max, Some(90.0));
        assert_eq!(config.default, Some(50.0));
        assert_eq!(config.manual_value, Some(8.0));
        assert_eq!(config.calc_formula.as_deref(), Some("engine_rpm * 2"));
        assert_eq!(config.value_mode.as_deref(), Some("MANUAL"));
        assert_eq!(config.speed_ratio, Some(0.5));
    }

    #[test]
    fn test_absent_preferred_spelling_falls_through() {
        let config: ParameterConfig =
            serde_yaml::from_str("minValid: ''
min: 5
defaultValue: 9
calc_key: pressure_ratio
")
                .unwrap();
        assert_eq!(config.min, Some(5.0));
        assert_eq!(config.default_value(), Some(9.0));
        assert_eq!(config.calc_formula.as_deref(), Some("pressure_ratio"));
    }

    #[test]
    fn test_nominal_backs_default() {
        let config: ParameterConfig = serde_yaml::from_str("nominal: 850\nmin: ''\n").unwrap();
        assert_eq!(config.default_value(), Some(850.0));
        assert_eq!(config.min, None);
    }

    #[test]
    fn test_bounds() {
        let config = ParameterConfig {
            min: Some(10.0),
            max: Some(20.0),
            ..Default::default()
        };
        assert!(config.in_bounds(10.0));
        assert!(config.in_bounds(20.0));
        assert!(!config.in_bounds(9.99));
        assert!(!config.in_bounds(20.01));
        assert!(ParameterConfig::default().in_bounds(-1e9));
    }

    #[test]
    fn test_malformed_row_is_empty() {
        let config = ParameterConfig::from_value(&json!({"valueMode": [1, 2]}));
        assert_eq!(config, ParameterConfig::default());
    }
}
