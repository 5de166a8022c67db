//! Service configuration
//!
//! Layering: built-in defaults, then the YAML file, then `ACQSRV_*`
//! environment variables (`ACQSRV_MODBUS__PORT=502`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use errors::{GcsError, GcsResult};

use crate::connection::{ConnectionProfile, ConnectionSettings};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ACQSRV_";

/// Unit whose live data this instance acquires, when none is configured
pub const DEFAULT_UNIT_ID: &str = "GCS-001";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcqConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub modbus: ModbusConfig,

    #[serde(default)]
    pub register_map: RegisterMapConfig,

    /// Simulated/real endpoint selection, re-read on every reload
    #[serde(default)]
    pub connection: Option<ConnectionProfile>,

    #[serde(default = "default_unit_id")]
    pub unit_id: String,
}

impl Default for AcqConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            modbus: ModbusConfig::default(),
            register_map: RegisterMapConfig::default(),
            connection: None,
            unit_id: default_unit_id(),
        }
    }
}

/// Service identity and logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_json: bool,

    /// Seconds between status report log lines
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_dir: None,
            log_json: false,
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

/// Polling defaults; the connection profile may override the endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_slave_id")]
    pub slave_id: u8,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_latency_threshold_ms")]
    pub latency_threshold_ms: f64,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            slave_id: default_slave_id(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            latency_threshold_ms: default_latency_threshold_ms(),
        }
    }
}

impl ModbusConfig {
    pub fn default_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.host.clone(),
            port: self.port,
            slave_id: self.slave_id,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Where to look for the register map, in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMapConfig {
    #[serde(default = "default_register_paths")]
    pub paths: Vec<PathBuf>,
}

impl Default for RegisterMapConfig {
    fn default() -> Self {
        Self {
            paths: default_register_paths(),
        }
    }
}

fn default_service_name() -> String {
    "acqsrv".to_string()
}

fn default_report_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5020
}

fn default_slave_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_latency_threshold_ms() -> f64 {
    crate::latency::LATENCY_THRESHOLD_MS
}

fn default_unit_id() -> String {
    DEFAULT_UNIT_ID.to_string()
}

fn default_register_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("shared_config/registers.yaml"),
        PathBuf::from("config/registers.yaml"),
    ]
}

/// Build the layered figment for an optional configuration file
fn figment_for(path: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(AcqConfig::default()));

    if let Some(path) = path {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("yaml");
        figment = match extension {
            "json" => figment.merge(Json::file(path)),
            "toml" => figment.merge(Toml::file(path)),
            _ => figment.merge(Yaml::file(path)),
        };
    }

    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the full configuration
pub fn load_config(path: Option<&Path>) -> GcsResult<AcqConfig> {
    if let Some(p) = path {
        if !p.exists() {
            return Err(GcsError::configuration(format!(
                "Configuration file not found: {}",
                p.display()
            )));
        }
    }

    let config: AcqConfig = figment_for(path)
        .extract()
        .map_err(|e| GcsError::configuration(format!("Failed to extract config: {}", e)))?;

    debug!(
        "Config: endpoint {}:{} slave {} interval {}ms",
        config.modbus.host, config.modbus.port, config.modbus.slave_id, config.modbus.poll_interval_ms
    );
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::connection::ConnectionMode;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert!(config.modbus.enabled);
        assert_eq!(config.modbus.port, 5020);
        assert_eq!(config.modbus.slave_id, 1);
        assert_eq!(config.modbus.timeout(), Duration::from_secs(3));
        assert_eq!(config.modbus.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.unit_id, "GCS-001");
        assert!(config.connection.is_none());
    }

    #[test]
    fn test_yaml_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
unit_id: GCS-007
modbus:
  host: 10.1.2.3
  poll_interval_ms: 500
register_map:
  paths: [/etc/gcs/registers.yaml]
connection:
  mode: real
  real_host: 10.1.2.50
  real_port: 502
  slave_id: 3
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.unit_id, "GCS-007");
        assert_eq!(config.modbus.host, "10.1.2.3");
        assert_eq!(config.modbus.port, 5020);
        assert_eq!(config.modbus.poll_interval_ms, 500);
        assert_eq!(
            config.register_map.paths,
            vec![PathBuf::from("/etc/gcs/registers.yaml")]
        );
        let profile = config.connection.unwrap();
        assert_eq!(profile.mode, ConnectionMode::Real);
        assert_eq!(profile.real_host.as_deref(), Some("10.1.2.50"));
        assert_eq!(profile.slave_id, Some(3));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/acqsrv.yaml"))).unwrap_err();
        assert!(matches!(err, GcsError::Configuration(_)));
    }
}
