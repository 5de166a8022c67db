//! Polling engine
//!
//! Owns the device link, the register map and the last-known raw values.
//! One `poll_cycle` reads the working register set in contiguous blocks and
//! feeds the cycle duration into the latency monitor, which decides whether
//! the next cycle is throttled to group A.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use errors::{GcsError, GcsResult};
use gcs_model::{GroupPartition, RegisterMap};

use crate::blocks::{build_blocks, MAX_REGISTERS_PER_READ};
use crate::connection::{ConnectionSettings, Connector, RegisterTransport};
use crate::latency::{LatencyMonitor, LatencyStats, LATENCY_THRESHOLD_MS};
use crate::scaling::scale_registers;
use crate::source::PollerConfigSource;

/// Static engine parameters
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Endpoint used when the source provides no connection profile
    pub defaults: ConnectionSettings,
    pub timeout: Duration,
    pub latency_threshold_ms: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            defaults: ConnectionSettings::default(),
            timeout: Duration::from_secs(3),
            latency_threshold_ms: LATENCY_THRESHOLD_MS,
        }
    }
}

/// Snapshot of engine health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollerStatus {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub connected: bool,
    pub poll_count: u64,
    pub error_count: u64,
    pub last_poll: Option<DateTime<Utc>>,
    pub registers_cached: usize,
    pub group_a_count: usize,
    pub group_b_count: usize,
    #[serde(flatten)]
    pub latency: LatencyStats,
}

pub struct PollingEngine {
    options: EngineOptions,
    settings: ConnectionSettings,
    connector: Arc<dyn Connector>,
    source: Arc<dyn PollerConfigSource>,
    transport: Option<Box<dyn RegisterTransport>>,
    register_map: RegisterMap,
    groups: GroupPartition,
    last_values: HashMap<u16, u16>,
    last_poll: Option<DateTime<Utc>>,
    poll_count: u64,
    error_count: u64,
    latency: LatencyMonitor,
}

impl std::fmt::Debug for PollingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingEngine")
            .field("endpoint", &self.settings.endpoint())
            .field("connected", &self.is_connected())
            .field("registers", &self.register_map.len())
            .field("poll_count", &self.poll_count)
            .finish()
    }
}

impl PollingEngine {
    /// Load the register map and settings; the link opens on first use
    pub fn new(
        options: EngineOptions,
        connector: Arc<dyn Connector>,
        source: Arc<dyn PollerConfigSource>,
    ) -> Self {
        let register_map = source.load_register_map();
        let groups = register_map.partition();
        let settings = Self::derive_settings(&options, source.as_ref());
        let latency = LatencyMonitor::new(options.latency_threshold_ms);

        info!(
            "Polling engine: {} registers (A={}, B={}) at {} slave {}",
            register_map.len(),
            groups.a_registers,
            groups.b_registers,
            settings.endpoint(),
            settings.slave_id
        );

        Self {
            options,
            settings,
            connector,
            source,
            transport: None,
            register_map,
            groups,
            last_values: HashMap::new(),
            last_poll: None,
            poll_count: 0,
            error_count: 0,
            latency,
        }
    }

    fn derive_settings(options: &EngineOptions, source: &dyn PollerConfigSource) -> ConnectionSettings {
        match source.load_connection_profile() {
            Some(profile) => profile.effective_settings(options.defaults.slave_id),
            None => options.defaults.clone(),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn register_map(&self) -> &RegisterMap {
        &self.register_map
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn throttle_active(&self) -> bool {
        self.latency.throttle_active()
    }

    pub fn latency(&self) -> &LatencyMonitor {
        &self.latency
    }

    /// Open the link if needed; failures are logged, never raised
    pub async fn connect(&mut self) -> bool {
        if self.transport.is_some() {
            return true;
        }
        match self
            .connector
            .connect(&self.settings, self.options.timeout)
            .await
        {
            Ok(transport) => {
                info!("Connected to Modbus device at {}", self.settings.endpoint());
                self.transport = Some(transport);
                true
            },
            Err(e) => {
                warn!("Connection to {} failed: {}", self.settings.endpoint(), e);
                false
            },
        }
    }

    pub async fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
            debug!("Disconnected from {}", self.settings.endpoint());
        }
    }

    /// Read one chunk, reconnecting first if the link is down
    ///
    /// Device exceptions keep the link; transport failures drop it so the
    /// next read reconnects.
    pub async fn read_registers(&mut self, start: u16, count: u16) -> GcsResult<Vec<u16>> {
        if !self.connect().await {
            return Err(GcsError::NotConnected);
        }
        let slave_id = self.settings.slave_id;
        let Some(transport) = self.transport.as_mut() else {
            return Err(GcsError::NotConnected);
        };

        let result = transport.read_holding_registers(slave_id, start, count).await;
        match result {
            Ok(words) => Ok(words),
            Err(e) => {
                self.error_count += 1;
                if e.is_connection_error() {
                    warn!("Read {}+{} failed, dropping link: {}", start, count, e);
                    self.disconnect().await;
                } else {
                    warn!("Read {}+{} rejected: {}", start, count, e);
                }
                Err(e)
            },
        }
    }

    /// Run one poll cycle and return the freshly read values, scaled
    ///
    /// Unread registers keep their last observed word in the cache.
    pub async fn poll_cycle(&mut self) -> HashMap<String, f64> {
        let throttled = self.latency.throttle_active();
        let addresses = self.groups.addresses(throttled);
        if addresses.is_empty() {
            return HashMap::new();
        }
        if throttled && !self.groups.group_a.is_empty() {
            debug!("Throttle active, polling group A only ({} words)", addresses.len());
        }

        let started = tokio::time::Instant::now();
        let mut fresh: HashMap<u16, u16> = HashMap::new();

        'blocks: for block in build_blocks(&addresses) {
            for chunk in block.chunks(MAX_REGISTERS_PER_READ) {
                match self.read_registers(chunk.start, chunk.count).await {
                    Ok(words) => {
                        for (i, word) in words.into_iter().enumerate() {
                            if let Ok(address) = u16::try_from(usize::from(chunk.start) + i) {
                                fresh.insert(address, word);
                            }
                        }
                    },
                    Err(e) if e.is_connection_error() => {
                        debug!("Link down, abandoning remaining reads this cycle");
                        break 'blocks;
                    },
                    Err(_) => {},
                }
            }
        }

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.latency.record(duration_ms);

        self.last_values.extend(fresh.iter().map(|(a, w)| (*a, *w)));
        self.last_poll = Some(Utc::now());
        self.poll_count += 1;

        scale_registers(self.register_map.iter(), &fresh)
    }

    /// Scaled view of every cached register
    pub fn get_data(&self) -> HashMap<String, f64> {
        scale_registers(self.register_map.iter(), &self.last_values)
    }

    pub fn status(&self) -> PollerStatus {
        PollerStatus {
            host: self.settings.host.clone(),
            port: self.settings.port,
            slave_id: self.settings.slave_id,
            connected: self.is_connected(),
            poll_count: self.poll_count,
            error_count: self.error_count,
            last_poll: self.last_poll,
            registers_cached: self.last_values.len(),
            group_a_count: self.groups.a_registers,
            group_b_count: self.groups.b_registers,
            latency: self.latency.stats(),
        }
    }

    /// Replace the register map and reconcile the connection settings
    pub async fn reload_config(&mut self) {
        self.register_map = self.source.load_register_map();
        self.groups = self.register_map.partition();
        info!(
            "Reloaded {} registers (A={}, B={})",
            self.register_map.len(),
            self.groups.a_registers,
            self.groups.b_registers
        );
        self.reconcile_connection().await;
    }

    /// Re-derive settings; any change forces disconnect then reconnect
    pub async fn reconcile_connection(&mut self) {
        let settings = Self::derive_settings(&self.options, self.source.as_ref());
        if settings == self.settings {
            return;
        }
        info!(
            "Connection settings changed: {} slave {} -> {} slave {}",
            self.settings.endpoint(),
            self.settings.slave_id,
            settings.endpoint(),
            settings.slave_id
        );
        let was_connected = self.is_connected();
        self.disconnect().await;
        self.settings = settings;
        if was_connected {
            self.connect().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
pub(crate) mod tests {
    use super::*;
    use crate::connection::{ConnectionMode, ConnectionProfile};
    use crate::source::StaticConfigSource;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Behaviour injected into the fake device
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub(crate) enum Fault {
        None,
        Exception,
        Disconnect,
    }

    #[derive(Debug, Default)]
    pub(crate) struct DeviceState {
        pub words: HashMap<u16, u16>,
        pub requests: Vec<(u16, u16)>,
        pub connects: Vec<ConnectionSettings>,
        pub closes: usize,
        pub refuse_connect: bool,
        pub faults: HashMap<u16, Fault>,
        pub delay: Duration,
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakeDevice(pub Arc<Mutex<DeviceState>>);

    struct FakeTransport(Arc<Mutex<DeviceState>>);

    #[async_trait]
    impl RegisterTransport for FakeTransport {
        async fn read_holding_registers(
            &mut self,
            _slave_id: u8,
            start: u16,
            count: u16,
        ) -> GcsResult<Vec<u16>> {
            let (delay, fault) = {
                let mut state = self.0.lock();
                state.requests.push((start, count));
                (
                    state.delay,
                    state.faults.get(&start).copied().unwrap_or(Fault::None),
                )
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match fault {
                Fault::Exception => Err(GcsError::ModbusException {
                    function: 0x03,
                    code: 0x02,
                }),
                Fault::Disconnect => Err(GcsError::read_failed(start, count, "connection reset")),
                Fault::None => {
                    let state = self.0.lock();
                    Ok((start..start + count)
                        .map(|a| state.words.get(&a).copied().unwrap_or(0))
                        .collect())
                },
            }
        }

        async fn close(&mut self) {
            self.0.lock().closes += 1;
        }
    }

    #[async_trait]
    impl Connector for FakeDevice {
        async fn connect(
            &self,
            settings: &ConnectionSettings,
            _timeout: Duration,
        ) -> GcsResult<Box<dyn RegisterTransport>> {
            let mut state = self.0.lock();
            state.connects.push(settings.clone());
            if state.refuse_connect {
                return Err(GcsError::connection_failed(settings.endpoint(), "refused"));
            }
            Ok(Box::new(FakeTransport(self.0.clone())))
        }
    }

    pub(crate) const MAP: &str = r#"
registers:
  - {address: 0, name: Engine RPM}
  - {address: 1, name: Engine Lube Oil Pressure, scale: 0.1}
  - {address: 2, name: Hour Meter}
  - {address: 3, name: Fuel Totalizer}
  - {address: 10, name: Discharge Stage 1 Pressure, scale: 0.1}
"#;

    fn engine_with(device: &FakeDevice, source: Arc<StaticConfigSource>) -> PollingEngine {
        PollingEngine::new(EngineOptions::default(), Arc::new(device.clone()), source)
    }

    fn default_engine(device: &FakeDevice) -> PollingEngine {
        let map = RegisterMap::from_yaml_str(MAP).unwrap();
        engine_with(device, Arc::new(StaticConfigSource::new(map, None)))
    }

    #[tokio::test]
    async fn test_poll_cycle_reads_blocks_and_scales() {
        let device = FakeDevice::default();
        {
            let mut state = device.0.lock();
            state.words.extend([(0, 1200), (1, 653), (2, 77), (3, 5), (10, 4501)]);
        }
        let mut engine = default_engine(&device);

        let values = engine.poll_cycle().await;
        assert_eq!(values["Engine RPM"], 1200.0);
        assert_eq!(values["engine_rpm"], 1200.0);
        assert_eq!(values["engine_oil_pressure"], 65.3);
        assert_eq!(values["stg1_discharge_pressure"], 450.1);
        assert_eq!(values["Hour Meter"], 77.0);

        assert_eq!(device.0.lock().requests, vec![(0, 4), (10, 1)]);
        let status = engine.status();
        assert!(status.connected);
        assert_eq!(status.poll_count, 1);
        assert_eq!(status.error_count, 0);
        assert_eq!(status.registers_cached, 5);
        assert_eq!(status.group_a_count, 3);
        assert_eq!(status.group_b_count, 2);
        assert!(status.last_poll.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_throttles_to_group_a() {
        let device = FakeDevice::default();
        device.0.lock().delay = Duration::from_millis(1000);
        let mut engine = default_engine(&device);

        // two chunk reads at 1s each
        engine.poll_cycle().await;
        assert!(engine.throttle_active());
        assert!((engine.latency().last_ms() - 2000.0).abs() < 5.0);

        device.0.lock().delay = Duration::ZERO;
        // window [2000, 0] then [2000, 0, 0]: average still above 560ms
        for _ in 0..2 {
            device.0.lock().requests.clear();
            engine.poll_cycle().await;
            // group A: RPM (0), oil pressure (1), stage 1 pressure (10)
            assert_eq!(device.0.lock().requests, vec![(0, 2), (10, 1)]);
            assert!(engine.throttle_active());
        }

        // [2000, 0, 0, 0] averages 500ms and releases
        engine.poll_cycle().await;
        assert!(!engine.throttle_active());

        device.0.lock().requests.clear();
        engine.poll_cycle().await;
        assert_eq!(device.0.lock().requests, vec![(0, 4), (10, 1)]);
    }

    #[tokio::test]
    async fn test_throttle_releases_without_group_a() {
        let device = FakeDevice::default();
        let map = RegisterMap::from_yaml_str(
            "registers:\n  - {address: 2, name: Hour Meter}\n  - {address: 3, name: Fuel Totalizer}\n",
        )
        .unwrap();
        let mut engine = engine_with(&device, Arc::new(StaticConfigSource::new(map, None)));
        engine.latency.record(2000.0);
        assert!(engine.throttle_active());

        // [2000, 0] and [2000, 0, 0] stay throttled, [2000, 0, 0, 0] releases
        for cycle in 0..3 {
            device.0.lock().requests.clear();
            let values = engine.poll_cycle().await;
            assert!(values.contains_key("Hour Meter"));
            assert_eq!(device.0.lock().requests, vec![(2, 2)]);
            assert_eq!(engine.throttle_active(), cycle < 2);
        }
        assert_eq!(engine.latency().stats().total_poll_count, 4);
    }

    #[tokio::test]
    async fn test_group_counts_are_register_counts() {
        let device = FakeDevice::default();
        let map = RegisterMap::from_yaml_str(
            "registers:\n  - {address: 0, name: Engine RPM}\n  - {address: 4, bit: 0, name: Low Oil Alarm}\n  - {address: 4, bit: 1, name: High Temp Alarm}\n  - {address: 4, bit: 2, name: Fault Lamp}\n  - {address: 9, name: Hour Meter}\n",
        )
        .unwrap();
        let engine = engine_with(&device, Arc::new(StaticConfigSource::new(map, None)));
        let status = engine.status();
        assert_eq!(status.group_a_count, 4);
        assert_eq!(status.group_b_count, 1);
    }

    #[tokio::test]
    async fn test_cache_survives_throttled_cycles() {
        let device = FakeDevice::default();
        device.0.lock().words.extend([(0, 1000), (2, 42)]);
        let mut engine = default_engine(&device);
        engine.poll_cycle().await;

        for _ in 0..3 {
            engine.latency.record(1000.0);
        }
        device.0.lock().words.insert(2, 99);
        device.0.lock().words.insert(0, 1100);
        let fresh = engine.poll_cycle().await;
        assert!(!fresh.contains_key("Hour Meter"));
        assert_eq!(fresh["Engine RPM"], 1100.0);

        let data = engine.get_data();
        assert_eq!(data["Hour Meter"], 42.0);
        assert_eq!(data["Engine RPM"], 1100.0);
    }

    #[tokio::test]
    async fn test_large_block_is_chunked() {
        let yaml: String = std::iter::once("registers:\n".to_string())
            .chain((0..250).map(|a| format!("  - {{address: {}, name: Point {}}}\n", a, a)))
            .collect();
        let device = FakeDevice::default();
        let map = RegisterMap::from_yaml_str(&yaml).unwrap();
        let mut engine = engine_with(&device, Arc::new(StaticConfigSource::new(map, None)));

        let values = engine.poll_cycle().await;
        assert_eq!(values.len(), 250);
        assert_eq!(
            device.0.lock().requests,
            vec![(0, 100), (100, 100), (200, 50)]
        );
    }

    #[tokio::test]
    async fn test_exception_is_counted_and_cycle_continues() {
        let device = FakeDevice::default();
        {
            let mut state = device.0.lock();
            state.faults.insert(0, Fault::Exception);
            state.words.insert(10, 100);
        }
        let mut engine = default_engine(&device);

        let values = engine.poll_cycle().await;
        assert_eq!(values["Discharge Stage 1 Pressure"], 10.0);
        assert!(!values.contains_key("Engine RPM"));

        let status = engine.status();
        assert_eq!(status.error_count, 1);
        assert!(status.connected);
        assert_eq!(status.poll_count, 1);
    }

    #[tokio::test]
    async fn test_connection_loss_drops_link_and_recovers() {
        let device = FakeDevice::default();
        device.0.lock().faults.insert(0, Fault::Disconnect);
        let mut engine = default_engine(&device);

        let values = engine.poll_cycle().await;
        assert!(values.is_empty());
        assert!(!engine.is_connected());
        assert_eq!(engine.status().error_count, 1);
        assert_eq!(device.0.lock().requests, vec![(0, 4)]);
        assert_eq!(device.0.lock().closes, 1);

        device.0.lock().faults.clear();
        device.0.lock().words.insert(0, 900);
        let values = engine.poll_cycle().await;
        assert_eq!(values["Engine RPM"], 900.0);
        assert!(engine.is_connected());
        assert_eq!(device.0.lock().connects.len(), 2);
    }

    #[tokio::test]
    async fn test_refused_connection_yields_no_data() {
        let device = FakeDevice::default();
        device.0.lock().refuse_connect = true;
        let mut engine = default_engine(&device);

        assert!(!engine.connect().await);
        assert!(matches!(
            engine.read_registers(0, 1).await,
            Err(GcsError::NotConnected)
        ));

        let values = engine.poll_cycle().await;
        assert!(values.is_empty());
        assert_eq!(engine.status().poll_count, 1);
        assert!(device.0.lock().requests.is_empty());
    }

    #[tokio::test]
    async fn test_empty_map_polls_nothing() {
        let device = FakeDevice::default();
        let mut engine = engine_with(&device, Arc::new(StaticConfigSource::default()));
        assert!(engine.poll_cycle().await.is_empty());
        assert_eq!(engine.status().poll_count, 0);
        assert!(device.0.lock().connects.is_empty());
    }

    #[tokio::test]
    async fn test_reload_reconciles_changed_settings() {
        let device = FakeDevice::default();
        let map = RegisterMap::from_yaml_str(MAP).unwrap();
        let source = Arc::new(StaticConfigSource::new(map, None));
        let mut engine = engine_with(&device, source.clone());
        assert!(engine.connect().await);

        // unchanged settings keep the link
        engine.reload_config().await;
        assert_eq!(device.0.lock().connects.len(), 1);
        assert_eq!(device.0.lock().closes, 0);

        source.set_connection_profile(Some(ConnectionProfile {
            mode: ConnectionMode::Real,
            real_host: Some("10.0.0.9".to_string()),
            real_port: 502,
            slave_id: Some(7),
            ..Default::default()
        }));
        source.set_register_map(
            RegisterMap::from_yaml_str("registers:\n  - {address: 5, name: Engine RPM}\n").unwrap(),
        );
        engine.reload_config().await;

        let state = device.0.lock();
        assert_eq!(state.closes, 1);
        assert_eq!(state.connects.len(), 2);
        assert_eq!(state.connects[1].endpoint(), "10.0.0.9:502");
        assert_eq!(state.connects[1].slave_id, 7);
        drop(state);

        assert_eq!(engine.register_map().len(), 1);
        assert_eq!(engine.status().group_a_count, 1);
    }
}
