//! Connection settings and the transport seam
//!
//! The engine talks to a device only through [`RegisterTransport`], created
//! by a [`Connector`]. Production uses a `tokio-modbus` TCP client; tests
//! plug in fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, warn};

use errors::{GcsError, GcsResult};

const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Hosts that can never be a real device address
const PLACEHOLDER_HOSTS: &[&str] = &["0.0.0.0", "127.0.0.1", "localhost"];

/// Effective endpoint the engine connects to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
}

impl ConnectionSettings {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5020,
            slave_id: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    #[serde(alias = "simulation", alias = "sim")]
    Simulated,
    Real,
}

/// Operator-facing endpoint selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default)]
    pub mode: ConnectionMode,

    #[serde(default = "default_sim_host")]
    pub sim_host: String,

    #[serde(default = "default_sim_port")]
    pub sim_port: u16,

    #[serde(default)]
    pub real_host: Option<String>,

    #[serde(default = "default_real_port")]
    pub real_port: u16,

    #[serde(default)]
    pub slave_id: Option<u8>,
}

fn default_sim_host() -> String {
    "localhost".to_string()
}

fn default_sim_port() -> u16 {
    5020
}

fn default_real_port() -> u16 {
    502
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Simulated,
            sim_host: default_sim_host(),
            sim_port: default_sim_port(),
            real_host: None,
            real_port: default_real_port(),
            slave_id: None,
        }
    }
}

impl ConnectionProfile {
    /// Derive the endpoint for the active mode
    ///
    /// Real mode with an empty or placeholder host falls back to the
    /// simulator endpoint.
    pub fn effective_settings(&self, default_slave_id: u8) -> ConnectionSettings {
        let slave_id = self.slave_id.unwrap_or(default_slave_id);
        let simulated = ConnectionSettings {
            host: self.sim_host.clone(),
            port: self.sim_port,
            slave_id,
        };

        match self.mode {
            ConnectionMode::Simulated => simulated,
            ConnectionMode::Real => {
                let host = self.real_host.as_deref().map(str::trim).unwrap_or("");
                if host.is_empty() || PLACEHOLDER_HOSTS.contains(&host) {
                    warn!(
                        "Real mode configured with unusable host '{}', using simulator at {}",
                        host,
                        simulated.endpoint()
                    );
                    simulated
                } else {
                    ConnectionSettings {
                        host: host.to_string(),
                        port: self.real_port,
                        slave_id,
                    }
                }
            },
        }
    }
}

/// An open link able to read holding registers
#[async_trait]
pub trait RegisterTransport: Send {
    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> GcsResult<Vec<u16>>;

    async fn close(&mut self);
}

/// Opens transports for a set of connection settings
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
        timeout: Duration,
    ) -> GcsResult<Box<dyn RegisterTransport>>;
}

/// One Modbus TCP link; the unit id is set per request
pub struct ModbusTcpTransport {
    ctx: Context,
    endpoint: String,
    timeout: Duration,
}

impl ModbusTcpTransport {
    /// Connect with a bounded wait
    pub async fn connect(settings: &ConnectionSettings, timeout: Duration) -> GcsResult<Self> {
        let endpoint = settings.endpoint();
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&endpoint)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(GcsError::connection_failed(&endpoint, e)),
            Err(_) => return Err(GcsError::timeout(&endpoint)),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY on {}: {}", endpoint, e);
        }
        debug!("Connected to {}", endpoint);

        Ok(Self {
            ctx: tcp::attach_slave(stream, Slave(settings.slave_id)),
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RegisterTransport for ModbusTcpTransport {
    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start: u16,
        count: u16,
    ) -> GcsResult<Vec<u16>> {
        self.ctx.set_slave(Slave(slave_id));
        let request = self.ctx.read_holding_registers(start, count);
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(Ok(words))) => Ok(words),
            Ok(Ok(Err(exception))) => Err(GcsError::ModbusException {
                function: FC_READ_HOLDING_REGISTERS,
                code: u8::from(exception),
            }),
            Ok(Err(e)) => Err(GcsError::read_failed(start, count, e)),
            Err(_) => Err(GcsError::timeout(&self.endpoint)),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ctx.disconnect().await {
            debug!("Closing {}: {}", self.endpoint, e);
        }
    }
}

/// Modbus TCP connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
        timeout: Duration,
    ) -> GcsResult<Box<dyn RegisterTransport>> {
        let transport = ModbusTcpTransport::connect(settings, timeout).await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    #[test]
    fn test_simulated_mode() {
        let profile = ConnectionProfile {
            sim_host: "sim.local".to_string(),
            sim_port: 5021,
            ..Default::default()
        };
        assert_eq!(
            profile.effective_settings(4),
            ConnectionSettings {
                host: "sim.local".to_string(),
                port: 5021,
                slave_id: 4
            }
        );
    }

    #[test]
    fn test_real_mode_uses_real_endpoint() {
        let profile = ConnectionProfile {
            mode: ConnectionMode::Real,
            real_host: Some(" 192.168.10.20 ".to_string()),
            real_port: 502,
            slave_id: Some(2),
            ..Default::default()
        };
        let settings = profile.effective_settings(1);
        assert_eq!(settings.endpoint(), "192.168.10.20:502");
        assert_eq!(settings.slave_id, 2);
    }

    #[test]
    fn test_real_mode_placeholder_falls_back_to_simulator() {
        for host in [None, Some(""), Some("0.0.0.0"), Some("127.0.0.1"), Some("localhost")] {
            let profile = ConnectionProfile {
                mode: ConnectionMode::Real,
                real_host: host.map(str::to_string),
                ..Default::default()
            };
            assert_eq!(profile.effective_settings(1).endpoint(), "localhost:5020");
        }
    }

    #[test]
    #[traced_test]
    fn test_placeholder_fallback_is_logged() {
        let profile = ConnectionProfile {
            mode: ConnectionMode::Real,
            real_host: Some("0.0.0.0".to_string()),
            sim_host: "sim.local".to_string(),
            ..Default::default()
        };
        assert_eq!(profile.effective_settings(1).endpoint(), "sim.local:5020");
        assert!(logs_contain("unusable host '0.0.0.0'"));
        assert!(logs_contain("using simulator at sim.local:5020"));
    }

    #[test]
    #[traced_test]
    fn test_usable_real_host_is_not_logged() {
        let profile = ConnectionProfile {
            mode: ConnectionMode::Real,
            real_host: Some("10.1.2.3".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.effective_settings(1).endpoint(), "10.1.2.3:502");
        assert!(!logs_contain("unusable host"));
    }

    #[tokio::test]
    async fn test_transport_reads_and_maps_exceptions() {
        let store = Arc::new(simsrv::RegisterStore::default());
        store.write_batch(&[(10, 300), (11, 301), (12, 302)]);
        let cancel = CancellationToken::new();
        let (addr, server) = simsrv::ModbusServer::new(store)
            .start("127.0.0.1:0", cancel.clone())
            .await
            .unwrap();

        let settings = ConnectionSettings {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            slave_id: 1,
        };
        let mut transport = TcpConnector
            .connect(&settings, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(
            transport.read_holding_registers(7, 10, 3).await.unwrap(),
            vec![300, 301, 302]
        );
        let err = transport
            .read_holding_registers(1, 4999, 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GcsError::ModbusException {
                function: 0x03,
                code: 0x02
            }
        ));
        assert!(!err.is_connection_error());
        // link survives an exception
        assert_eq!(
            transport.read_holding_registers(1, 11, 1).await.unwrap(),
            vec![301]
        );

        transport.close().await;
        cancel.cancel();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connect_is_a_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = ConnectionSettings {
            host: "127.0.0.1".to_string(),
            port,
            slave_id: 1,
        };
        let err = ModbusTcpTransport::connect(&settings, Duration::from_secs(2))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GcsError::ConnectionFailed { .. }));
        assert!(err.is_connection_error());
    }
}
