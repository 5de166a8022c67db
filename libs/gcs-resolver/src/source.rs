//! Data sources, quality grades and the display legend

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSource {
    Live,
    Calculated,
    Manual,
    Default,
    Bad,
}

impl DataSource {
    /// Map a chain token (any case) to a source; `BAD` is never a token
    pub fn from_chain_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "live" | "modbus" => Some(Self::Live),
            "calculated" | "calc" => Some(Self::Calculated),
            "manual" | "user" => Some(Self::Manual),
            "default" => Some(Self::Default),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Calculated => "CALCULATED",
            Self::Manual => "MANUAL",
            Self::Default => "DEFAULT",
            Self::Bad => "BAD",
        }
    }

    /// Quality grade attached to values from this source
    pub fn quality(&self) -> Quality {
        match self {
            Self::Live => Quality::Good,
            Self::Calculated => Quality::Inferred,
            Self::Manual => Quality::Static,
            Self::Default => Quality::Assumed,
            Self::Bad => Quality::Bad,
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Good,
    Inferred,
    Static,
    Assumed,
    Bad,
}

/// Display metadata for one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceMeta {
    pub label: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

/// Static source → display metadata table
pub fn quality_legend() -> BTreeMap<DataSource, SourceMeta> {
    let meta = |label, icon, color| SourceMeta { label, icon, color };
    BTreeMap::from([
        (DataSource::Live, meta("Live Modbus", "LIVE", "green")),
        (DataSource::Calculated, meta("Calculated", "CALC", "blue")),
        (DataSource::Manual, meta("Manual", "MAN", "yellow")),
        (DataSource::Default, meta("Default", "DEF", "orange")),
        (DataSource::Bad, meta("Unavailable", "BAD", "red")),
    ])
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_tokens() {
        assert_eq!(DataSource::from_chain_token("MODBUS"), Some(DataSource::Live));
        assert_eq!(DataSource::from_chain_token(" live "), Some(DataSource::Live));
        assert_eq!(DataSource::from_chain_token("Calc"), Some(DataSource::Calculated));
        assert_eq!(DataSource::from_chain_token("user"), Some(DataSource::Manual));
        assert_eq!(DataSource::from_chain_token("bad"), None);
    }

    #[test]
    fn test_legend_serializes_with_source_keys() {
        let json = serde_json::to_value(quality_legend()).unwrap();
        assert_eq!(json["LIVE"]["color"], "green");
        assert_eq!(json["BAD"]["label"], "Unavailable");
        assert_eq!(json.as_object().unwrap().len(), 5);
    }
}
