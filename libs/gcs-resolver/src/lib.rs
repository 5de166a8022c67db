//! Multi-source value resolution
//!
//! For every requested parameter the [`DataResolver`] walks a configured
//! priority chain (`LIVE -> CALCULATED -> MANUAL -> DEFAULT`) and returns the
//! first viable value together with its provenance:
//!
//! | Source     | Quality  | Viable when                                   |
//! |------------|----------|-----------------------------------------------|
//! | LIVE       | GOOD     | present, inside bounds, not frozen            |
//! | CALCULATED | INFERRED | builtin relation or expression evaluates      |
//! | MANUAL     | STATIC   | unexpired operator override or static value   |
//! | DEFAULT    | ASSUMED  | configured default or nominal                 |
//! | BAD        | BAD      | chain exhausted                               |
//!
//! ```
//! use std::collections::HashMap;
//! use gcs_resolver::{DataResolver, DataSource, ParameterConfig};
//!
//! let resolver = DataResolver::new();
//! let live: HashMap<String, f64> = [("stg1_discharge_temp".to_string(), 300.0)].into();
//! let config = ParameterConfig::with_chain(&["CALCULATED"]);
//!
//! let result = resolver.resolve("GCS-001", "stg2_suction_temp", None, &live, &config);
//! assert_eq!(result.value, Some(285.0));
//! assert_eq!(result.source, DataSource::Calculated);
//! ```

pub mod calculations;
pub mod chain;
pub mod clock;
pub mod config;
pub mod lookup;
pub mod manual;
pub mod resolver;
pub mod source;
pub mod stale;

pub use chain::parse_chain;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ParameterConfig, SourcePriority};
pub use manual::{ManualOverride, ManualOverrideStore};
pub use resolver::{DataResolver, ResolveResult, ResolvedBatch};
pub use source::{quality_legend, DataSource, Quality, SourceMeta};
pub use stale::StaleTracker;
