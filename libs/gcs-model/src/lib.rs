//! Register map model
//!
//! Both ends of the wire load the same YAML register map: the acquisition
//! service to decide what to read and how to scale it, the simulator to decide
//! what to serve. Everything that must agree between the two lives here.
//!
//! # Modules
//!
//! - `register`: raw configuration rows and the typed `RegisterDefinition`
//! - `normalize`: legacy "4xxxx" address rewriting
//! - `map`: loading, de-duplication and poll-group partitioning

pub mod map;
pub mod normalize;
pub mod register;

pub use map::{GroupPartition, RegisterMap};
pub use normalize::{detect_legacy_base, normalize_addresses};
pub use register::{infer_group, Clamp, PollGroup, RegisterDefinition, RegisterEntry, RegisterKind};
