//! Gas-compressor device simulator (simsrv)
//!
//! Emulates a compressor package PLC over Modbus TCP so the acquisition
//! service can run without hardware. The register map is the same YAML the
//! poller reads, normalized by the same rules.
//!
//! # Modules
//!
//! - `config`: simulator document (`registers`, `simulation`, `server`)
//! - `generator`: nominal/trend/noise/engine-state value synthesis
//! - `store`: the shared holding-register block
//! - `server`: FC03 `tokio-modbus` service over the register store
//! - `watcher`: mtime-based configuration reload
//! - `service`: update and watch loops

pub mod config;
pub mod generator;
pub mod server;
pub mod service;
pub mod store;
pub mod watcher;

pub use config::{EngineState, ServerConfig, SimulationConfig, SimulatorDocument};
pub use generator::Simulator;
pub use server::ModbusServer;
pub use service::SimulatorService;
pub use store::{RegisterStore, REGISTER_COUNT};
pub use watcher::ConfigWatcher;
