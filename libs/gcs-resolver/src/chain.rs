//! Source chain parsing

use serde_json::Value;

use crate::config::{ParameterConfig, SourcePriority};
use crate::source::DataSource;

/// Split a textual chain on `->`, `,` or `|`
fn split_tokens(raw: &str) -> Vec<String> {
    raw.replace("->", ",")
        .split([',', '|'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn token_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Ordered, de-duplicated chain for a parameter
///
/// Tokens may carry a `:qualifier` suffix, which is ignored. Without a usable
/// chain the value mode selects strict mode: `MANUAL` → `[MANUAL]`, anything
/// else → `[LIVE]`.
pub fn parse_chain(config: &ParameterConfig) -> Vec<DataSource> {
    let tokens = match &config.source_priority {
        Some(SourcePriority::List(items)) => items.iter().map(token_text).collect(),
        Some(SourcePriority::Text(text)) => split_tokens(text),
        None => Vec::new(),
    };

    let mut chain = Vec::new();
    for token in tokens {
        let key = token.split(':').next().unwrap_or_default();
        if let Some(source) = DataSource::from_chain_token(key) {
            if !chain.contains(&source) {
                chain.push(source);
            }
        }
    }
    if !chain.is_empty() {
        return chain;
    }

    let manual = config
        .value_mode
        .as_deref()
        .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("manual"));
    if manual {
        vec![DataSource::Manual]
    } else {
        vec![DataSource::Live]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use DataSource::*;

    fn chain_of(value: serde_json::Value) -> Vec<DataSource> {
        parse_chain(&ParameterConfig::from_value(&value))
    }

    #[test]
    fn test_text_chain_with_mixed_delimiters() {
        assert_eq!(
            chain_of(json!({"sourcePriority": "MODBUS -> calc | manual, DEFAULT"})),
            vec![Live, Calculated, Manual, Default]
        );
    }

    #[test]
    fn test_list_chain_dedupes_and_drops_unknown() {
        assert_eq!(
            chain_of(json!({"source_priority": ["live", "MODBUS", "telepathy", "default:850"]})),
            vec![Live, Default]
        );
    }

    #[test]
    fn test_strict_mode_fallback() {
        assert_eq!(chain_of(json!({})), vec![Live]);
        assert_eq!(chain_of(json!({"valueMode": "manual"})), vec![Manual]);
        assert_eq!(chain_of(json!({"valueMode": "LIVE"})), vec![Live]);
        assert_eq!(
            chain_of(json!({"sourcePriority": "", "valueMode": "MANUAL"})),
            vec![Manual]
        );
    }
}
