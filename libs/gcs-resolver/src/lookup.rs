//! Live snapshot lookup with naming aliases

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use common::to_finite;

fn stage_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^stage(\d+)_(.+)$").ok())
        .as_ref()
}

/// Names to try for `parameter`, in order
///
/// `*_press` and `*_pressure` stand in for each other, and
/// `stageN_x` is also tried as `stgN_x`.
pub fn candidates(parameter: &str) -> Vec<String> {
    let mut out = vec![parameter.to_string()];
    let mut push = |name: String| {
        if !out.contains(&name) {
            out.push(name);
        }
    };

    if let Some(stem) = parameter.strip_suffix("_pressure") {
        push(format!("{}_press", stem));
    } else if parameter.ends_with("_press") {
        push(format!("{}ure", parameter));
    }

    let normalized = parameter.trim().to_lowercase();
    if let Some(caps) = stage_pattern().and_then(|re| re.captures(&normalized)) {
        push(format!("stg{}_{}", &caps[1], &caps[2]));
    }
    out
}

/// First finite value among the candidate names
pub fn lookup_live(parameter: &str, live: &HashMap<String, f64>) -> Option<f64> {
    candidates(parameter)
        .iter()
        .find_map(|name| live.get(name).copied().and_then(to_finite))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_pressure_aliases_both_ways() {
        let data = live(&[("engine_oil_pressure", 62.0), ("stg1_suction_press", 40.0)]);
        assert_eq!(lookup_live("engine_oil_press", &data), Some(62.0));
        assert_eq!(lookup_live("stg1_suction_pressure", &data), Some(40.0));
    }

    #[test]
    fn test_stage_rewrite() {
        let data = live(&[("stg2_discharge_temp", 280.0)]);
        assert_eq!(lookup_live("stage2_discharge_temp", &data), Some(280.0));
        assert_eq!(
            candidates("stage1_suction_pressure"),
            vec![
                "stage1_suction_pressure".to_string(),
                "stage1_suction_press".to_string(),
                "stg1_suction_pressure".to_string()
            ]
        );
    }

    #[test]
    fn test_exact_name_wins_and_nan_is_absent() {
        let data = live(&[("engine_rpm", f64::NAN)]);
        assert_eq!(lookup_live("engine_rpm", &data), None);

        let data = live(&[("x_press", 1.0), ("x_pressure", 2.0)]);
        assert_eq!(lookup_live("x_pressure", &data), Some(2.0));
    }
}
