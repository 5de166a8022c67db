//! Telemetry acquisition service
//!
//! Polls a compressor package's holding registers over Modbus TCP, keeps the
//! last-known scaled values, and sheds secondary registers when cycles run
//! slow.
//!
//! - [`engine::PollingEngine`]: one cycle at a time, block reads, scaling
//! - [`service::PollerService`]: the background loop and published snapshots
//! - [`latency::LatencyMonitor`]: sticky throttle with hysteresis

pub mod blocks;
pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod engine;
pub mod latency;
pub mod live_store;
pub mod report;
pub mod scaling;
pub mod service;
pub mod source;

pub use config::{load_config, AcqConfig};
pub use connection::{
    ConnectionMode, ConnectionProfile, ConnectionSettings, Connector, ModbusTcpTransport,
    RegisterTransport, TcpConnector,
};
pub use engine::{EngineOptions, PollerStatus, PollingEngine};
pub use latency::{LatencyAlert, LatencyMonitor, LatencyStats};
pub use live_store::UnitLiveStore;
pub use service::{PollCallback, PollerService, Snapshot};
pub use source::{FileConfigSource, PollerConfigSource, StaticConfigSource};
