//! Telemetry acquisition service (acqsrv)
//!
//! Polls the configured unit, keeps its live snapshot, and periodically logs
//! poller health plus a resolution summary.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use acqsrv::bootstrap::{self, Args};
use acqsrv::report::resolve_unit;
use acqsrv::{
    load_config, EngineOptions, FileConfigSource, PollCallback, PollerConfigSource,
    PollerService, PollingEngine, Snapshot, TcpConnector, UnitLiveStore,
};
use common::shutdown::{wait_for_shutdown, ReloadSignal};
use gcs_resolver::DataResolver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    bootstrap::initialize_logging(&args, &config)?;

    info!(
        "{} v{} starting for unit {}",
        config.service.name,
        env!("CARGO_PKG_VERSION"),
        config.unit_id
    );

    // Validation mode: validate and exit
    if args.validate {
        bootstrap::validate_configuration(&config)?;
        info!("Validation completed successfully");
        return Ok(());
    }

    if !config.modbus.enabled {
        warn!("Modbus polling disabled in configuration, idling until shutdown");
        wait_for_shutdown().await;
        return Ok(());
    }

    let options = EngineOptions {
        defaults: config.modbus.default_settings(),
        timeout: config.modbus.timeout(),
        latency_threshold_ms: config.modbus.latency_threshold_ms,
    };
    let source = Arc::new(FileConfigSource::new(
        config.register_map.paths.clone(),
        args.config.clone(),
    ));
    let engine = PollingEngine::new(options, Arc::new(TcpConnector), source.clone());
    let poller = Arc::new(PollerService::new(engine, config.modbus.poll_interval()));

    let live_store = Arc::new(UnitLiveStore::new());
    let resolver = Arc::new(DataResolver::new());

    let store = live_store.clone();
    let unit_id = config.unit_id.clone();
    let callback: PollCallback = Arc::new(move |snapshot: Snapshot| store.update(&unit_id, snapshot));
    poller.start(Some(callback));

    let cancel = CancellationToken::new();

    // Periodic status report
    let report_task = {
        let poller = poller.clone();
        let live_store = live_store.clone();
        let resolver = resolver.clone();
        let source = source.clone();
        let unit_id = config.unit_id.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_secs(config.service.report_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {},
                }

                let status = poller.get_status();
                info!(
                    "Poller: connected={} polls={} errors={} avg={:.1}ms throttle={} cached={}",
                    status.connected,
                    status.poll_count,
                    status.error_count,
                    status.latency.average_latency_ms,
                    status.latency.throttle_active,
                    status.registers_cached
                );

                let Some(snapshot) = live_store.get(&unit_id) else {
                    continue;
                };
                let map = source.load_register_map();
                let batch = resolve_unit(&resolver, &unit_id, &snapshot.values, &map);
                let summary: Vec<String> = batch
                    .source_counts()
                    .iter()
                    .map(|(source, count)| format!("{}={}", source, count))
                    .collect();
                info!("Resolved {}: {}", unit_id, summary.join(" "));
            }
        })
    };

    // SIGHUP reloads the register map and connection profile
    let reload_task = {
        let poller = poller.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut reload = ReloadSignal::new();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = reload.recv() => {
                        info!("Reload requested");
                        poller.reload_config().await;
                    },
                }
            }
        })
    };

    wait_for_shutdown().await;
    info!("Shutdown signal received");

    cancel.cancel();
    poller.stop().await;
    for (name, task) in [("report", report_task), ("reload", reload_task)] {
        if let Err(e) = task.await {
            error!("{} task failed: {}", name, e);
        }
    }

    info!("acqsrv stopped");
    Ok(())
}
