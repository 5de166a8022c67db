//! Where the engine gets its register map and connection profile
//!
//! Both are re-read on every reload, so the source is a trait object the
//! engine owns rather than a value captured once at startup.

use std::path::PathBuf;

use parking_lot::RwLock;
use tracing::warn;

use gcs_model::RegisterMap;

use crate::config::load_config;
use crate::connection::ConnectionProfile;

pub trait PollerConfigSource: Send + Sync {
    /// Current register map; an empty map when nothing usable is found
    fn load_register_map(&self) -> RegisterMap;

    /// Current connection profile, `None` to use the service defaults
    fn load_connection_profile(&self) -> Option<ConnectionProfile>;
}

/// Reads the register map and the service configuration file from disk
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    register_paths: Vec<PathBuf>,
    config_path: Option<PathBuf>,
}

impl FileConfigSource {
    pub fn new(register_paths: Vec<PathBuf>, config_path: Option<PathBuf>) -> Self {
        Self {
            register_paths,
            config_path,
        }
    }
}

impl PollerConfigSource for FileConfigSource {
    fn load_register_map(&self) -> RegisterMap {
        RegisterMap::load_first(&self.register_paths)
    }

    fn load_connection_profile(&self) -> Option<ConnectionProfile> {
        match load_config(self.config_path.as_deref()) {
            Ok(config) => config.connection,
            Err(e) => {
                warn!("Connection profile unavailable, using defaults: {}", e);
                None
            },
        }
    }
}

/// In-memory source, swapped at runtime by embedding code and tests
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    map: RwLock<RegisterMap>,
    profile: RwLock<Option<ConnectionProfile>>,
}

impl StaticConfigSource {
    pub fn new(map: RegisterMap, profile: Option<ConnectionProfile>) -> Self {
        Self {
            map: RwLock::new(map),
            profile: RwLock::new(profile),
        }
    }

    pub fn set_register_map(&self, map: RegisterMap) {
        *self.map.write() = map;
    }

    pub fn set_connection_profile(&self, profile: Option<ConnectionProfile>) {
        *self.profile.write() = profile;
    }
}

impl PollerConfigSource for StaticConfigSource {
    fn load_register_map(&self) -> RegisterMap {
        self.map.read().clone()
    }

    fn load_connection_profile(&self) -> Option<ConnectionProfile> {
        self.profile.read().clone()
    }
}
