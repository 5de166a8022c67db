//! Simulator configuration document
//!
//! One YAML file carries the register map plus `simulation` and `server`
//! sections. The file is re-read by the watch loop, so parsing never panics
//! and a missing section falls back to its defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use errors::{GcsError, GcsResult};
use gcs_model::{RegisterEntry, RegisterMap};

/// Operating state applied on top of nominal values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    #[serde(alias = "RUNNING")]
    Running,
    #[serde(alias = "STOPPED")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub update_interval_ms: u64,
    pub noise_enabled: bool,
    pub trend_enabled: bool,
    pub engine_state: EngineState,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 100,
            noise_enabled: true,
            trend_enabled: true,
            engine_state: EngineState::Running,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Logged only; requests for any unit id are answered
    pub slave_id: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5020,
            slave_id: 1,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorDocument {
    pub registers: Vec<RegisterEntry>,
    pub simulation: SimulationConfig,
    pub server: ServerConfig,
}

impl SimulatorDocument {
    pub fn from_yaml_str(text: &str) -> GcsResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let doc: Option<Self> = serde_yaml::from_str(text)?;
        Ok(doc.unwrap_or_default())
    }

    pub fn load(path: &Path) -> GcsResult<Self> {
        if !path.exists() {
            return Err(GcsError::ConfigurationAbsent(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text).map_err(|e| GcsError::ParseError {
            file: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Validated map, normalized the same way the poller normalizes it
    pub fn register_map(&self) -> RegisterMap {
        RegisterMap::from_entries(self.registers.clone())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_default_when_absent() {
        let doc = SimulatorDocument::from_yaml_str(
            "registers:\n  - { address: 40001, name: Engine RPM, nominal: 1200 }\n",
        )
        .unwrap();
        assert_eq!(doc.simulation, SimulationConfig::default());
        assert_eq!(doc.server.bind_address(), "0.0.0.0:5020");

        let map = doc.register_map();
        assert_eq!(map.registers()[0].address, 0);
    }

    #[test]
    fn test_engine_state_spellings() {
        let doc = SimulatorDocument::from_yaml_str(
            "simulation:\n  engine_state: STOPPED\n  update_interval_ms: 250\nserver:\n  port: 1502\n",
        )
        .unwrap();
        assert_eq!(doc.simulation.engine_state, EngineState::Stopped);
        assert_eq!(doc.simulation.update_interval_ms, 250);
        assert!(doc.simulation.noise_enabled);
        assert_eq!(doc.server.port, 1502);

        let doc = SimulatorDocument::from_yaml_str("simulation:\n  engine_state: running\n").unwrap();
        assert_eq!(doc.simulation.engine_state, EngineState::Running);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(matches!(
            SimulatorDocument::load(&missing),
            Err(GcsError::ConfigurationAbsent(_))
        ));

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "registers: [ {address: 1").unwrap();
        assert!(matches!(
            SimulatorDocument::load(&broken),
            Err(GcsError::ParseError { .. })
        ));
    }
}
