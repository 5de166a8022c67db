//! Modbus TCP device simulator (simsrv)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use common::logging::{parse_level, LogConfig};
use common::shutdown::wait_for_shutdown;
use simsrv::{
    ConfigWatcher, ModbusServer, RegisterStore, Simulator, SimulatorDocument, SimulatorService,
};

#[derive(Parser, Debug)]
#[command(
    name = "simsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Gas compressor Modbus TCP simulator",
    long_about = None
)]
struct Args {
    /// Register configuration YAML, watched for changes
    #[arg(short = 'c', long, default_value = "register_config.yaml")]
    config: PathBuf,

    /// Bind address (overrides `server.host`)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides `server.port`)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Seed the noise generator for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    common::logging::init_with_config(LogConfig {
        service_name: "simsrv".to_string(),
        console_level: parse_level(&args.log_level),
        ansi: !args.no_color,
        ..Default::default()
    })
    .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;

    // An unusable file is not fatal: the watcher picks up the next good edit
    let doc = match SimulatorDocument::load(&args.config) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Starting with an empty register map: {}", e);
            SimulatorDocument::default()
        },
    };

    let mut server_config = doc.server.clone();
    if let Some(host) = args.host {
        server_config.host = host;
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }

    let simulator = match args.seed {
        Some(seed) => Simulator::with_seed(doc.register_map(), doc.simulation.clone(), seed),
        None => Simulator::new(doc.register_map(), doc.simulation.clone()),
    };
    let store = Arc::new(RegisterStore::default());
    let service = Arc::new(SimulatorService::new(simulator, store.clone()));
    service.tick();

    let cancel = CancellationToken::new();
    let bind = server_config.bind_address();
    info!(
        "GCS Modbus simulator starting on {} (slave id {}, config {})",
        bind,
        server_config.slave_id,
        args.config.display()
    );
    let (_, server_task) = ModbusServer::new(store)
        .start(&bind, cancel.clone())
        .await
        .with_context(|| format!("Failed to start Modbus server on {}", bind))?;

    let update_task = tokio::spawn(service.clone().run_update_loop(cancel.clone()));
    let watch_task = tokio::spawn(
        service
            .clone()
            .run_watch_loop(ConfigWatcher::new(&args.config), cancel.clone()),
    );

    wait_for_shutdown().await;
    info!("Server shutting down...");
    cancel.cancel();

    for (name, task) in [
        ("server", server_task),
        ("update", update_task),
        ("watch", watch_task),
    ] {
        if let Err(e) = task.await {
            error!("{} task failed: {}", name, e);
        }
    }

    info!("simsrv stopped");
    Ok(())
}
