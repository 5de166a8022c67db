//! Raw word → engineering value, and canonical metric names
//!
//! Device labels are verbose and vendor-specific ("Engine Bearing 3 Temp").
//! Downstream logic keys on fixed internal names, so selected labels are
//! republished under a canonical key alongside the raw label.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use gcs_model::{RegisterDefinition, RegisterKind};

/// Round to 2 decimals
#[inline]
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Decode one raw register word
///
/// Bit-packed booleans ignore scale and offset and yield 0.0 or 1.0.
pub fn scale(raw: u16, def: &RegisterDefinition) -> f64 {
    match def.kind {
        RegisterKind::Boolean { bit } => f64::from((raw >> bit) & 0x01),
        RegisterKind::Numeric { scale, offset, .. } => {
            let value = f64::from(raw) * scale + offset;
            if scale < 1.0 {
                round2(value)
            } else {
                value
            }
        },
    }
}

fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn bearing_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^engine bearing (\d+) temp$").ok())
        .as_ref()
}

fn exhaust_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^engine exhaust cyl (\d+) (left|right)$").ok())
        .as_ref()
}

/// Canonical internal key for a device label, if it has one
pub fn canonical_name(label: &str) -> Option<String> {
    let key = normalize_label(label);
    let direct = match key.as_str() {
        "engine rpm" => Some("engine_rpm"),
        "engine lube oil pressure" => Some("engine_oil_pressure"),
        "compressor lube oil pressure" => Some("comp_oil_pressure"),
        "compressor oil temp" => Some("comp_oil_temp"),
        "engine oil temp" => Some("engine_oil_temp"),
        "engine jacket water temp" => Some("jacket_water_temp"),
        "suction stage 1 pressure" => Some("stg1_suction_pressure"),
        "discharge stage 1 pressure" => Some("stg1_discharge_pressure"),
        "discharge stage 2 pressure" => Some("stg2_discharge_pressure"),
        "3rd stage suction pressure" => Some("stg3_suction_pressure"),
        "suction control out" => Some("suction_valve_position"),
        "engine speed control out" => Some("speed_control_output"),
        "recycle valve control out" => Some("recycle_valve_position"),
        "pre-turbo flywheel exhaust temp" => Some("pre_turbo_left"),
        "pre-turbo aux end exhaust temp" => Some("pre_turbo_right"),
        "post turbo flywheel exhaust temp" => Some("post_turbo_left"),
        "post turbo aux end exhaust temp" => Some("post_turbo_right"),
        _ => None,
    };
    if let Some(name) = direct {
        return Some(name.to_string());
    }

    if let Some(caps) = bearing_pattern().and_then(|re| re.captures(&key)) {
        return Some(format!("main_bearing_{}", &caps[1]));
    }
    if let Some(caps) = exhaust_pattern().and_then(|re| re.captures(&key)) {
        return Some(format!("exh_cyl{}_{}", &caps[1], &caps[2]));
    }
    None
}

/// Scale every definition whose word is present in `raw`
///
/// Output carries the register name and, when one exists, its canonical key.
pub fn scale_registers<'a, I>(definitions: I, raw: &HashMap<u16, u16>) -> HashMap<String, f64>
where
    I: IntoIterator<Item = &'a RegisterDefinition>,
{
    let mut out = HashMap::new();
    for def in definitions {
        if def.name.is_empty() {
            continue;
        }
        let Some(word) = raw.get(&def.address) else {
            continue;
        };
        let value = scale(*word, def);
        if let Some(canonical) = canonical_name(&def.name) {
            out.insert(canonical, value);
        }
        out.insert(def.name.clone(), value);
    }
    out
}
