//! Lenient optional-number parsing
//!
//! Configuration values arrive from YAML, JSON and operator input with mixed
//! spellings. Every "number or nothing" read goes through this module:
//! - `null`, `""`, `"None"`, `"null"` → None
//! - `NaN` / `Inf` (native or string) → None
//! - String number `"12.5"` → Some(12.5)
//! - Native number / boolean → Some

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Keep only finite values
#[inline]
pub fn to_finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Parse an untyped value into a finite f64, treating junk as absent
pub fn parse_optional_f64(raw: &Value) -> Option<f64> {
    match raw {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64().and_then(to_finite),
        Value::String(s) => parse_optional_str(s),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Parse a string into a finite f64; blank and placeholder strings are absent
pub fn parse_optional_str(raw: &str) -> Option<f64> {
    let t = raw.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("none") || t.eq_ignore_ascii_case("null") {
        return None;
    }
    t.parse::<f64>().ok().and_then(to_finite)
}

/// Serde adapter for `Option<f64>` fields that must accept every spelling above
///
/// Use with `#[serde(default, deserialize_with = "common::deserialize_optional_f64")]`.
pub fn deserialize_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_optional_f64))
}
