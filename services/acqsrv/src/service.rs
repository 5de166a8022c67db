//! Background poll loop around a [`PollingEngine`]
//!
//! Cycles are strictly sequential: the engine sits behind an async mutex and
//! the next cycle starts one interval after the previous one completed.
//! Snapshots and status are published through `watch` channels so readers
//! never wait on an in-flight cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{PollerStatus, PollingEngine};

/// Latest scaled snapshot, name → engineering value
pub type Snapshot = Arc<HashMap<String, f64>>;

/// Invoked with the full snapshot after every cycle that read something
pub type PollCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;

pub struct PollerService {
    engine: Arc<tokio::sync::Mutex<PollingEngine>>,
    poll_interval: Duration,
    data_tx: Arc<watch::Sender<Snapshot>>,
    status_tx: Arc<watch::Sender<PollerStatus>>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollerService {
    pub fn new(engine: PollingEngine, poll_interval: Duration) -> Self {
        let (data_tx, _) = watch::channel(Arc::new(engine.get_data()));
        let (status_tx, _) = watch::channel(engine.status());
        Self {
            engine: Arc::new(tokio::sync::Mutex::new(engine)),
            poll_interval,
            data_tx: Arc::new(data_tx),
            status_tx: Arc::new(status_tx),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the poll loop; returns false if it is already running
    pub fn start(&self, callback: Option<PollCallback>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("Poll loop already running");
            return false;
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        info!("Starting poll loop (interval: {:?})", self.poll_interval);
        *task = Some(tokio::spawn(poll_loop(
            self.engine.clone(),
            self.poll_interval,
            self.data_tx.clone(),
            self.status_tx.clone(),
            cancel,
            callback,
        )));
        true
    }

    /// Stop after the in-flight cycle completes, then close the link
    pub async fn stop(&self) {
        self.cancel.lock().cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Poll loop ended abnormally: {}", e);
            }
        }

        let mut engine = self.engine.lock().await;
        engine.disconnect().await;
        self.status_tx.send_replace(engine.status());
        info!("Modbus poller stopped");
    }

    /// Run one cycle outside the loop and publish the result
    pub async fn poll_once(&self) -> Snapshot {
        let mut engine = self.engine.lock().await;
        engine.poll_cycle().await;
        let snapshot = Arc::new(engine.get_data());
        self.data_tx.send_replace(snapshot.clone());
        self.status_tx.send_replace(engine.status());
        snapshot
    }

    /// Reload the register map and reconcile the connection
    ///
    /// Waits for any in-flight cycle so the link is never swapped mid-read.
    pub async fn reload_config(&self) {
        let mut engine = self.engine.lock().await;
        engine.reload_config().await;
        self.data_tx.send_replace(Arc::new(engine.get_data()));
        self.status_tx.send_replace(engine.status());
    }

    pub fn get_data(&self) -> Snapshot {
        self.data_tx.borrow().clone()
    }

    pub fn get_status(&self) -> PollerStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.data_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PollerStatus> {
        self.status_tx.subscribe()
    }
}

async fn poll_loop(
    engine: Arc<tokio::sync::Mutex<PollingEngine>>,
    interval: Duration,
    data_tx: Arc<watch::Sender<Snapshot>>,
    status_tx: Arc<watch::Sender<PollerStatus>>,
    cancel: CancellationToken,
    callback: Option<PollCallback>,
) {
    while !cancel.is_cancelled() {
        let (read_any, snapshot, status) = {
            let mut engine = engine.lock().await;
            let fresh = engine.poll_cycle().await;
            (!fresh.is_empty(), Arc::new(engine.get_data()), engine.status())
        };

        data_tx.send_replace(snapshot.clone());
        status_tx.send_replace(status);
        if read_any {
            if let Some(callback) = &callback {
                callback(snapshot);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {},
        }
    }
    debug!("Poll loop exited");
}
