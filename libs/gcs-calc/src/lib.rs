//! gcs-calc - arithmetic expressions for calculated telemetry values
//!
//! The grammar is deliberately tiny: numbers, identifiers, `+ - * /`,
//! unary sign and parentheses. Identifiers resolve against a caller-supplied
//! namespace, so nothing outside that namespace can ever be reached.
//!
//! ```rust
//! use std::collections::HashMap;
//! use gcs_calc::Expression;
//!
//! let expr = Expression::parse("stg1_discharge_temp - cooler_approach_f").unwrap();
//! let mut vars = HashMap::new();
//! vars.insert("stg1_discharge_temp".to_string(), 300.0);
//! vars.insert("cooler_approach_f".to_string(), 15.0);
//! assert_eq!(expr.evaluate(&vars).unwrap(), 285.0);
//! ```

pub mod error;
pub mod expression;

pub use error::{CalcError, Result};
pub use expression::{evaluate, is_expression, is_identifier, Expression};
