//! Command line and logging setup

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use common::logging::{parse_level, LogConfig};
use errors::{GcsError, GcsResult};
use gcs_model::RegisterMap;

use crate::config::AcqConfig;

/// Command-line arguments for acqsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "acqsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Gas compressor telemetry acquisition service",
    long_about = None
)]
pub struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long, env = "ACQSRV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

pub fn initialize_logging(args: &Args, config: &AcqConfig) -> GcsResult<()> {
    let log_config = LogConfig {
        service_name: config.service.name.clone(),
        log_dir: config.service.log_dir.clone(),
        console_level: parse_level(&args.log_level),
        enable_json: config.service.log_json,
        ansi: !args.no_color,
    };
    common::logging::init_with_config(log_config)
        .map_err(|e| GcsError::Configuration(format!("Failed to init logging: {}", e)))
}

/// Report what the configuration would poll, without connecting
pub fn validate_configuration(config: &AcqConfig) -> GcsResult<()> {
    let mut found = None;
    for path in &config.register_map.paths {
        match RegisterMap::load(path) {
            Ok(map) => {
                found = Some((path.clone(), map));
                break;
            },
            Err(GcsError::ConfigurationAbsent(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    let Some((path, map)) = found else {
        return Err(GcsError::ConfigurationAbsent(format!(
            "no register map in {:?}",
            config.register_map.paths
        )));
    };

    let groups = map.partition();
    let (numeric, boolean) = map.kind_counts();
    info!("Register map: {}", path.display());
    info!(
        "  {} registers ({} numeric, {} bit-packed), group A={} ({} words), group B={} ({} words)",
        map.len(),
        numeric,
        boolean,
        groups.a_registers,
        groups.group_a.len(),
        groups.b_registers,
        groups.group_b.len()
    );
    if let Some(base) = map.legacy_base() {
        info!("  Legacy addressing normalized from base {}", base);
    }

    let settings = match &config.connection {
        Some(profile) => profile.effective_settings(config.modbus.slave_id),
        None => config.modbus.default_settings(),
    };
    info!(
        "  Endpoint {} slave {}, poll every {}ms",
        settings.endpoint(),
        settings.slave_id,
        config.modbus.poll_interval_ms
    );
    Ok(())
}
