//! Shared building blocks for the telemetry services
//!
//! - logging bootstrap (console + rolling file)
//! - graceful shutdown and reload signals
//! - lenient numeric parsing for configuration values

pub mod logging;
pub mod numeric;
pub mod shutdown;

pub use numeric::{deserialize_optional_f64, parse_optional_f64, to_finite};
