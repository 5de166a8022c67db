//! Derived values for the CALCULATED source
//!
//! A parameter's calculation key is its configured formula, or its own name.
//! Known keys map to fixed physical relations; anything containing an
//! operator is evaluated as a whitelisted arithmetic expression over the
//! live namespace plus the named constants.

use std::collections::HashMap;

use tracing::debug;

use common::to_finite;
use gcs_calc::{is_expression, is_identifier, Expression};

use crate::config::ParameterConfig;
use crate::lookup::lookup_live;

/// Intercooler approach temperature, °F
pub const DEFAULT_COOLER_APPROACH_F: f64 = 15.0;

/// Pressure drop between stages, psi
pub const DEFAULT_INTERSTAGE_DP: f64 = 5.0;

pub const DEFAULT_SPEED_RATIO: f64 = 1.0;

/// Sea-level standard atmosphere, psia
const SEA_LEVEL_PSIA: f64 = 14.696;

/// Constants visible to builtins and expressions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalcConstants {
    pub cooler_approach_f: f64,
    pub interstage_dp: f64,
    pub speed_ratio: f64,
}

impl CalcConstants {
    /// Config first; the cooler approach may also come from the live data
    pub fn resolve(config: &ParameterConfig, live: &HashMap<String, f64>) -> Self {
        Self {
            cooler_approach_f: config
                .cooler_approach_f
                .or_else(|| live.get("cooler_approach_f").copied().and_then(to_finite))
                .unwrap_or(DEFAULT_COOLER_APPROACH_F),
            interstage_dp: config.interstage_dp.unwrap_or(DEFAULT_INTERSTAGE_DP),
            speed_ratio: config.speed_ratio.unwrap_or(DEFAULT_SPEED_RATIO),
        }
    }

    fn get(&self, name: &str) -> Option<f64> {
        match name {
            "cooler_approach_f" => Some(self.cooler_approach_f),
            "interstage_dp" => Some(self.interstage_dp),
            "speed_ratio" => Some(self.speed_ratio),
            _ => None,
        }
    }
}

/// Barometric pressure at `elevation_ft`, standard atmosphere
pub fn barometric_pressure_psia(elevation_ft: f64) -> f64 {
    SEA_LEVEL_PSIA * (1.0 - 6.8753e-6 * elevation_ft).powf(5.2559)
}

fn stage_suction_temp(live: &HashMap<String, f64>, stage: u32, approach: f64) -> Option<f64> {
    lookup_live(&format!("stg{}_discharge_temp", stage - 1), live).map(|t| t - approach)
}

fn stage_suction_press(live: &HashMap<String, f64>, stage: u32, dp: f64) -> Option<f64> {
    lookup_live(&format!("stg{}_discharge_press", stage - 1), live).map(|p| p - dp)
}

fn config_or_live(configured: Option<f64>, live: &HashMap<String, f64>, key: &str) -> Option<f64> {
    configured.or_else(|| live.get(key).copied().and_then(to_finite))
}

fn builtin(
    key: &str,
    live: &HashMap<String, f64>,
    config: &ParameterConfig,
    constants: &CalcConstants,
) -> Option<Option<f64>> {
    let value = match key {
        "stage2_suction_temp" | "stg2_suction_temp" => {
            stage_suction_temp(live, 2, constants.cooler_approach_f)
        },
        "stage3_suction_temp" | "stg3_suction_temp" => {
            stage_suction_temp(live, 3, constants.cooler_approach_f)
        },
        "stage2_suction_press" | "stage2_suction_pressure" | "stg2_suction_press" => {
            stage_suction_press(live, 2, constants.interstage_dp)
        },
        "stage3_suction_press" | "stage3_suction_pressure" | "stg3_suction_press" => {
            stage_suction_press(live, 3, constants.interstage_dp)
        },
        "compressor_rpm" | "comp_rpm" => {
            lookup_live("engine_rpm", live).map(|rpm| rpm * constants.speed_ratio)
        },
        "baro_pressure" | "barometric_pressure" => {
            let elevation = config_or_live(config.elevation_ft, live, "elevation_ft").unwrap_or(0.0);
            Some(barometric_pressure_psia(elevation))
        },
        "gas_k_avg" | "k_avg" => {
            let suction = config_or_live(config.k_suction, live, "k_suction");
            let discharge = config_or_live(config.k_discharge, live, "k_discharge");
            suction.zip(discharge).map(|(s, d)| (s + d) / 2.0)
        },
        _ => return None,
    };
    Some(value)
}

/// Calculated value for `parameter`, or `None` when inputs are missing
pub fn calculate(
    parameter: &str,
    live: &HashMap<String, f64>,
    config: &ParameterConfig,
) -> Option<f64> {
    let key = config
        .calc_formula
        .as_deref()
        .map(str::trim)
        .unwrap_or(parameter)
        .to_string();
    if key.is_empty() {
        return None;
    }

    let constants = CalcConstants::resolve(config, live);
    if let Some(value) = builtin(&key.to_lowercase(), live, config, &constants) {
        return value.and_then(to_finite);
    }

    if !is_expression(&key) {
        return None;
    }

    let result = Expression::parse(&key).and_then(|expr| {
        expr.evaluate_with(|name| {
            constants
                .get(name)
                .or_else(|| is_identifier(name).then(|| live.get(name).copied()).flatten())
        })
    });
    match result {
        Ok(value) => to_finite(value),
        Err(e) => {
            debug!("{}: '{}' not evaluated: {}", parameter, key, e);
            None
        },
    }
}
