//! Register definitions
//!
//! `RegisterEntry` mirrors one row of the YAML register map exactly as
//! written, accepting both camelCase and snake_case keys. `RegisterDefinition`
//! is the validated form used by the poller and the simulator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use common::{deserialize_optional_f64, parse_optional_f64};

/// Highest bit index inside a 16-bit register
pub const MAX_BIT_INDEX: u8 = 15;

/// Name fragments that put an untagged register into group A
const CRITICAL_KEYWORDS: &[&str] = &[
    "pressure", "temp", "rpm", "speed", "status", "alarm", "fault",
];

// ============================================================================
// Poll group
// ============================================================================

/// Poll priority class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollGroup {
    /// Critical: still polled while throttled
    A,
    /// Secondary: shed under latency pressure
    B,
}

impl PollGroup {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" | "CRITICAL" => Some(Self::A),
            "B" | "SECONDARY" => Some(Self::B),
            _ => None,
        }
    }
}

/// Infer the poll group from a register name
pub fn infer_group(name: &str) -> PollGroup {
    let lower = name.to_lowercase();
    if CRITICAL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        PollGroup::A
    } else {
        PollGroup::B
    }
}

// ============================================================================
// Raw configuration row
// ============================================================================

/// One register as written in the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "RegisterRow")]
pub struct RegisterEntry {
    pub address: Value,
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub scale: Option<f64>,
    pub offset: Option<f64>,
    pub data_type: Option<String>,
    pub category: Option<String>,
    pub poll_group: Option<String>,
    pub bit: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub nominal: Option<f64>,
    pub default: Option<f64>,
    pub noise: Option<f64>,
    pub calc_formula: Option<String>,
    pub source_priority: Option<Value>,
    pub value_mode: Option<String>,
    pub manual_value: Option<f64>,
}

/// Raw row with one field per accepted spelling
///
/// camelCase wins over snake_case when a row carries both.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegisterRow {
    address: Value,
    name: String,
    description: Option<String>,
    unit: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    scale: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    offset: Option<f64>,
    #[serde(rename = "dataType")]
    data_type_camel: Option<String>,
    data_type: Option<String>,
    category: Option<String>,
    #[serde(rename = "pollGroup")]
    poll_group_camel: Option<String>,
    poll_group: Option<String>,
    group: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    bit: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    min: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    max: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    nominal: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    default: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    noise: Option<f64>,
    #[serde(rename = "calcFormula")]
    calc_formula_camel: Option<String>,
    calc_formula: Option<String>,
    #[serde(rename = "sourcePriority")]
    source_priority_camel: Option<Value>,
    source_priority: Option<Value>,
    #[serde(rename = "valueMode")]
    value_mode_camel: Option<String>,
    value_mode: Option<String>,
    #[serde(rename = "manualValue", deserialize_with = "deserialize_optional_f64")]
    manual_value_camel: Option<f64>,
    #[serde(deserialize_with = "deserialize_optional_f64")]
    manual_value: Option<f64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<RegisterRow> for RegisterEntry {
    fn from(row: RegisterRow) -> Self {
        Self {
            address: row.address,
            name: row.name,
            description: row.description,
            unit: row.unit,
            scale: row.scale,
            offset: row.offset,
            data_type: row.data_type_camel.or(row.data_type),
            category: row.category,
            poll_group: non_blank(row.poll_group_camel)
                .or_else(|| non_blank(row.poll_group))
                .or_else(|| non_blank(row.group)),
            bit: row.bit,
            min: row.min,
            max: row.max,
            nominal: row.nominal,
            default: row.default,
            noise: row.noise,
            calc_formula: row.calc_formula_camel.or(row.calc_formula),
            source_priority: row.source_priority_camel.or(row.source_priority),
            value_mode: row.value_mode_camel.or(row.value_mode),
            manual_value: row.manual_value_camel.or(row.manual_value),
        }
    }
}

impl RegisterEntry {
    /// Numeric address before normalization; floats are truncated
    pub fn raw_address(&self) -> Option<u32> {
        let value = parse_optional_f64(&self.address)?;
        (value >= 0.0 && value <= f64::from(u32::MAX)).then_some(value as u32)
    }
}

// ============================================================================
// Validated definition
// ============================================================================

/// Raw-unit clamp bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Clamp {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// How a register word is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegisterKind {
    /// `value = raw * scale + offset`
    Numeric { scale: f64, offset: f64, clamp: Clamp },
    /// Single flag packed at `bit` of the word
    Boolean { bit: u8 },
}

/// A validated register definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterDefinition {
    /// Zero-based holding register address
    pub address: u16,
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub data_type: Option<String>,
    pub category: Option<String>,
    /// Explicit group tag, if the row carried a valid one
    pub poll_group: Option<PollGroup>,
    pub kind: RegisterKind,
    pub nominal: Option<f64>,
    pub default: Option<f64>,
    pub noise: Option<f64>,
    pub calc_formula: Option<String>,
    pub source_priority: Option<Value>,
    pub value_mode: Option<String>,
    pub manual_value: Option<f64>,
}

impl RegisterDefinition {
    /// Build a definition from a row whose address is already normalized
    ///
    /// Returns `None` (after logging) for rows that cannot be polled.
    pub fn from_entry(entry: RegisterEntry, address: u32) -> Option<Self> {
        let Ok(address) = u16::try_from(address) else {
            warn!(
                "Register '{}' address {} does not fit a holding register, skipped",
                entry.name, address
            );
            return None;
        };

        let kind = match entry.bit {
            Some(bit) => {
                if bit.fract() != 0.0 || bit < 0.0 || bit > f64::from(MAX_BIT_INDEX) {
                    warn!(
                        "Register '{}' bit index {} out of range 0..={}, skipped",
                        entry.name, bit, MAX_BIT_INDEX
                    );
                    return None;
                }
                RegisterKind::Boolean { bit: bit as u8 }
            },
            None => {
                let scale = match entry.scale {
                    Some(s) if s != 0.0 => s,
                    Some(_) => {
                        warn!("Register '{}' has scale 0, using 1.0", entry.name);
                        1.0
                    },
                    None => 1.0,
                };
                RegisterKind::Numeric {
                    scale,
                    offset: entry.offset.unwrap_or(0.0),
                    clamp: Clamp {
                        min: entry.min,
                        max: entry.max,
                    },
                }
            },
        };

        let poll_group = match entry.poll_group.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                let parsed = PollGroup::parse(raw);
                if parsed.is_none() {
                    warn!(
                        "Register '{}' has unknown poll group '{}', inferring from name",
                        entry.name, raw
                    );
                }
                parsed
            },
            _ => None,
        };

        Some(Self {
            address,
            name: entry.name,
            description: entry.description,
            unit: entry.unit,
            data_type: entry.data_type,
            category: entry.category,
            poll_group,
            kind,
            nominal: entry.nominal,
            default: entry.default,
            noise: entry.noise,
            calc_formula: entry.calc_formula,
            source_priority: entry.source_priority,
            value_mode: entry.value_mode,
            manual_value: entry.manual_value,
        })
    }

    /// Explicit tag if present, else keyword inference on the name
    pub fn effective_group(&self) -> PollGroup {
        self.poll_group.unwrap_or_else(|| infer_group(&self.name))
    }

    /// Engineering units per raw count; booleans are unscaled
    pub fn scale(&self) -> f64 {
        match self.kind {
            RegisterKind::Numeric { scale, .. } => scale,
            RegisterKind::Boolean { .. } => 1.0,
        }
    }

    pub fn bit(&self) -> Option<u8> {
        match self.kind {
            RegisterKind::Boolean { bit } => Some(bit),
            RegisterKind::Numeric { .. } => None,
        }
    }

    pub fn clamp(&self) -> Clamp {
        match self.kind {
            RegisterKind::Numeric { clamp, .. } => clamp,
            RegisterKind::Boolean { .. } => Clamp::default(),
        }
    }

    /// Lowercased category, if any
    pub fn category_lower(&self) -> Option<String> {
        self.category.as_deref().map(|c| c.trim().to_lowercase())
    }
}
