//! SessionBuilder -- fluent builder for constructing [`Session`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters and timeout values before the session exists.
//! Building never touches the device; call [`Session::open`] (or use
//! [`SessionBuilder::connect`]) to establish the link.
//!
//! # Example
//!
//! ```no_run
//! use rfe_analyzer::builder::SessionBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> rfe_core::Result<()> {
//! let session = SessionBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .sweep_timeout(Duration::from_secs(5))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rfe_core::error::{Error, Result};
use rfe_core::transport::Connector;
use rfe_transport::{analyzer_ports, SerialConfig, SerialConnector, DEFAULT_BAUD_RATE};
use tracing::{debug, info};

use crate::session::{Session, SessionSettings};

/// Fluent builder for [`Session`].
pub struct SessionBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    settings: SessionSettings,
}

impl SessionBuilder {
    /// Create a builder with default timeouts (2 s each) and baud rate
    /// (500 000).
    pub fn new() -> Self {
        SessionBuilder {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            settings: SessionSettings::default(),
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the baud rate. The analyzer can also be set to 2400 baud
    /// from its front panel.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// How long to wait for the analyzer to acknowledge a command or sweep
    /// configuration (default: 2 s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.settings.command_timeout = timeout;
        self
    }

    /// How long a blocking sweep waits for its record once the
    /// configuration is acknowledged (default: 2 s).
    pub fn sweep_timeout(mut self, timeout: Duration) -> Self {
        self.settings.sweep_timeout = timeout;
        self
    }

    /// How long `open()` waits for the analyzer to identify itself
    /// (default: 2 s).
    pub fn info_timeout(mut self, timeout: Duration) -> Self {
        self.settings.info_timeout = timeout;
        self
    }

    /// Capacity of the event broadcast channel (default: 64).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.settings.event_capacity = capacity;
        self
    }

    /// Build a [`Session`] around a caller-provided connector.
    ///
    /// This is the primary entry point for testing (pass a
    /// `MockConnector` from `rfe-test-harness`).
    pub fn build_with_connector(self, connector: Box<dyn Connector>) -> Session {
        Session::new(connector, self.settings)
    }

    /// Build a [`Session`] for a serial port.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub fn build(self) -> Result<Session> {
        let port = self
            .serial_port
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;
        let config = SerialConfig {
            baud_rate: self.baud_rate,
            ..SerialConfig::default()
        };
        let connector = SerialConnector::new(port, config);
        Ok(self.build_with_connector(Box::new(connector)))
    }

    /// Build a serial [`Session`] and open it.
    pub async fn connect(self) -> Result<Session> {
        let session = self.build()?;
        session.open().await?;
        Ok(session)
    }

    /// Open the first detected analyzer port that completes the handshake.
    ///
    /// Ports are tried in the order the OS lists them; any port set with
    /// [`serial_port()`](Self::serial_port) is ignored. Fails with
    /// [`Error::NotFound`] if no port answers.
    pub async fn connect_any(self) -> Result<Session> {
        let connectors = self.detected_connectors()?;
        self.open_first(connectors).await
    }

    /// Open every detected analyzer port that completes the handshake.
    ///
    /// Fails with [`Error::NotFound`] if no port answers.
    pub async fn connect_all(self) -> Result<Vec<Session>> {
        let connectors = self.detected_connectors()?;
        self.open_each(connectors).await
    }

    fn detected_connectors(&self) -> Result<Vec<Box<dyn Connector>>> {
        let config = SerialConfig {
            baud_rate: self.baud_rate,
            ..SerialConfig::default()
        };
        let ports = analyzer_ports()?;
        debug!(count = ports.len(), "candidate analyzer ports");
        Ok(ports
            .into_iter()
            .map(|port| {
                Box::new(SerialConnector::new(port.name, config.clone())) as Box<dyn Connector>
            })
            .collect())
    }

    async fn open_first(&self, connectors: Vec<Box<dyn Connector>>) -> Result<Session> {
        for connector in connectors {
            if let Some(session) = self.try_open(connector).await {
                return Ok(session);
            }
        }
        Err(Error::NotFound("no analyzer answered on any port".into()))
    }

    async fn open_each(&self, connectors: Vec<Box<dyn Connector>>) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for connector in connectors {
            if let Some(session) = self.try_open(connector).await {
                sessions.push(session);
            }
        }
        if sessions.is_empty() {
            return Err(Error::NotFound("no analyzer answered on any port".into()));
        }
        Ok(sessions)
    }

    async fn try_open(&self, connector: Box<dyn Connector>) -> Option<Session> {
        let port = connector.describe();
        let session = Session::new(connector, self.settings.clone());
        match session.open().await {
            Ok(()) => {
                info!(port = %port, "analyzer detected");
                Some(session)
            }
            Err(e) => {
                debug!(port = %port, error = %e, "no analyzer on port");
                None
            }
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::mock_with_handshake;
    use rfe_core::SessionState;
    use rfe_test_harness::{MockConnector, MockTransport};

    #[test]
    fn builder_defaults() {
        let builder = SessionBuilder::new();
        assert_eq!(builder.baud_rate, 500_000);
        assert_eq!(builder.settings.command_timeout, Duration::from_secs(2));
        assert_eq!(builder.settings.sweep_timeout, Duration::from_secs(2));
        assert_eq!(builder.settings.info_timeout, Duration::from_secs(2));
        assert_eq!(builder.settings.event_capacity, 64);
    }

    #[test]
    fn builder_overrides() {
        let builder = SessionBuilder::new()
            .baud_rate(2_400)
            .command_timeout(Duration::from_millis(250))
            .sweep_timeout(Duration::from_secs(10))
            .info_timeout(Duration::from_secs(3))
            .event_capacity(8);
        assert_eq!(builder.baud_rate, 2_400);
        assert_eq!(builder.settings.command_timeout, Duration::from_millis(250));
        assert_eq!(builder.settings.sweep_timeout, Duration::from_secs(10));
        assert_eq!(builder.settings.info_timeout, Duration::from_secs(3));
        assert_eq!(builder.settings.event_capacity, 8);
    }

    #[test]
    fn build_requires_serial_port() {
        let result = SessionBuilder::new().build();
        match result {
            Err(Error::InvalidParameter(msg)) => assert!(msg.contains("serial_port")),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("build without a port succeeded"),
        }
    }

    #[test]
    fn build_names_the_port() {
        let session = SessionBuilder::new()
            .serial_port("/dev/ttyUSB3")
            .build()
            .unwrap();
        assert_eq!(session.port_name(), "/dev/ttyUSB3");
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    fn quick() -> SessionBuilder {
        SessionBuilder::new().info_timeout(Duration::from_millis(200))
    }

    fn failing() -> Box<dyn Connector> {
        let connector = MockConnector::new();
        connector.push_failure(Error::PermissionDenied("/dev/ttyUSB0".into()));
        Box::new(connector)
    }

    fn silent() -> Box<dyn Connector> {
        Box::new(MockConnector::with_transport(MockTransport::new()))
    }

    fn answering() -> Box<dyn Connector> {
        Box::new(MockConnector::with_transport(mock_with_handshake()))
    }

    #[tokio::test]
    async fn open_first_skips_ports_without_analyzer() {
        let builder = quick();
        let session = builder
            .open_first(vec![failing(), silent(), answering()])
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        session.close().await;
    }

    #[tokio::test]
    async fn open_first_without_analyzer_is_not_found() {
        let builder = quick();
        let result = builder.open_first(vec![failing(), silent()]).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let result = builder.open_first(Vec::new()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn open_each_keeps_every_answering_port() {
        let builder = quick();
        let sessions = builder
            .open_each(vec![answering(), failing(), answering()])
            .await
            .unwrap();
        assert_eq!(sessions.len(), 2);
        for session in &sessions {
            assert_eq!(session.state(), SessionState::Idle);
            session.close().await;
        }

        let result = builder.open_each(vec![silent()]).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn build_with_connector_starts_disconnected() {
        let session = SessionBuilder::new().build_with_connector(Box::new(
            MockConnector::with_transport(mock_with_handshake()),
        ));
        assert_eq!(session.state(), SessionState::Disconnected);

        session.open().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        session.close().await;
    }
}
