//! Background loops of the simulator
//!
//! The update loop and the watch loop are independent; they meet only in
//! the simulator state and the register store.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{EngineState, SimulatorDocument};
use crate::generator::Simulator;
use crate::store::RegisterStore;
use crate::watcher::{ConfigWatcher, WATCH_INTERVAL};

pub struct SimulatorService {
    simulator: Mutex<Simulator>,
    store: Arc<RegisterStore>,
}

impl SimulatorService {
    pub fn new(simulator: Simulator, store: Arc<RegisterStore>) -> Self {
        Self {
            simulator: Mutex::new(simulator),
            store,
        }
    }

    pub fn store(&self) -> &Arc<RegisterStore> {
        &self.store
    }

    pub fn engine_state(&self) -> EngineState {
        self.simulator.lock().engine_state()
    }

    pub fn set_engine_state(&self, state: EngineState) {
        self.simulator.lock().set_engine_state(state);
    }

    /// Generate one tick and publish it; returns the words written
    pub fn tick(&self) -> usize {
        let words = self.simulator.lock().generate();
        self.store.write_batch(&words)
    }

    /// Replace the register map and simulation parameters
    pub fn apply_document(&self, doc: &SimulatorDocument) {
        self.simulator
            .lock()
            .load(doc.register_map(), doc.simulation.clone());
        info!(
            "Configuration reloaded. Active simulator slave id: {}",
            doc.server.slave_id
        );
    }

    /// Rewrite every register on the configured interval until cancelled
    pub async fn run_update_loop(self: Arc<Self>, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            self.tick();
            // re-read each time so a reload can change the rate
            let interval = self.simulator.lock().update_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {},
            }
        }
        debug!("Update loop exited");
    }

    /// Poll the configuration file and apply usable changes
    pub async fn run_watch_loop(self: Arc<Self>, mut watcher: ConfigWatcher, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(WATCH_INTERVAL) => {},
            }
            if let Some(doc) = watcher.check() {
                self.apply_document(&doc);
            }
        }
        debug!("Watch loop exited");
    }
}
