//! Serial port transport for analyzer communication.
//!
//! This module provides [`SerialTransport`], which implements the [`Transport`]
//! trait for the USB virtual COM port an RF Explorer presents, and
//! [`SerialConnector`], which opens one on demand for a session.
//!
//! RF Explorer analyzers ship configured for 500 000 baud. Older firmware
//! and some configurations use 2400 baud, selectable from the device menu.
//!
//! # Example
//!
//! ```no_run
//! use rfe_transport::{SerialConfig, SerialTransport};
//!
//! # async fn example() -> rfe_core::Result<()> {
//! let config = SerialConfig {
//!     baud_rate: 2400,
//!     ..Default::default()
//! };
//! let transport = SerialTransport::open_with_config("/dev/ttyUSB0", config).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use rfe_core::error::{Error, Result};
use rfe_core::transport::{Connector, Transport};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

/// Factory baud rate of the analyzer.
pub const DEFAULT_BAUD_RATE: u32 = 500_000;

/// Serial port settings.
///
/// Framing is fixed at 8N1 without flow control; the analyzer offers no
/// other mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// 500 000 from the factory; 2400 is the only other rate.
    pub baud_rate: u32,
    /// Take an exclusive lock on the device node (Unix only).
    pub exclusive: bool,
    /// Drop bytes already buffered by the driver when the port opens.
    /// A streaming analyzer leaves partial sweeps behind from the last
    /// session.
    pub discard_stale_input: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            exclusive: true,
            discard_stale_input: true,
        }
    }
}

/// Map a port open failure onto the driver's error taxonomy.
fn open_error(port: &str, e: tokio_serial::Error) -> Error {
    use tokio_serial::ErrorKind;

    match e.kind {
        ErrorKind::NoDevice | ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            Error::NotFound(port.to_string())
        }
        ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            Error::PermissionDenied(port.to_string())
        }
        _ => Error::Transport(format!("Failed to open serial port {}: {}", port, e)),
    }
}

/// Map a read or write failure. Broken pipes mean the device went away.
fn io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::UnexpectedEof => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

/// The analyzer's USB virtual COM port.
pub struct SerialTransport {
    /// `None` once closed.
    port: Option<SerialStream>,
    port_name: String,
}

impl SerialTransport {
    /// Open `port` (`/dev/ttyUSB0`, `COM3`) at `baud_rate` with default
    /// settings.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, config).await
    }

    /// Open a serial port with explicit settings.
    ///
    /// Fails with [`Error::NotFound`] if the port does not exist,
    /// [`Error::PermissionDenied`] if the OS refuses access, and
    /// [`Error::AlreadyOpen`] if another process holds the exclusive lock.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            exclusive = config.exclusive,
            "opening analyzer port"
        );

        #[allow(unused_mut)]
        let mut stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "cannot open analyzer port");
                open_error(port, e)
            })?;

        #[cfg(unix)]
        if config.exclusive {
            if let Err(e) = stream.set_exclusive(true) {
                tracing::warn!(port = %port, error = %e, "analyzer port is locked by another process");
                return Err(Error::AlreadyOpen);
            }
        }

        if config.discard_stale_input {
            if let Err(e) = stream.clear(ClearBuffer::Input) {
                tracing::warn!(port = %port, error = %e, "could not discard stale input");
            }
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "analyzer port open");

        Ok(Self {
            port: Some(stream),
            port_name: port.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(port = %self.port_name, command = ?data, "tx");

        let written = async {
            port.write_all(data).await?;
            port.flush().await
        };
        written.await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "write to analyzer failed");
            io_error(e)
        })
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            // EOF on a tty: the USB device was unplugged.
            Ok(Ok(0)) if !buf.is_empty() => {
                tracing::warn!(port = %self.port_name, "analyzer port reached EOF");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = n, "rx");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "read from analyzer failed");
                Err(io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut port) = self.port.take() else {
            return Ok(());
        };
        if let Err(e) = port.flush().await {
            tracing::warn!(port = %self.port_name, error = %e, "flush on close failed");
        }
        drop(port);
        tracing::info!(port = %self.port_name, "analyzer port closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "analyzer port dropped without close");
        }
    }
}

/// Opens a fresh [`SerialTransport`] every time a session opens, so a
/// faulted session can be reopened after the cable is plugged back in.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    config: SerialConfig,
}

impl SerialConnector {
    /// Create a connector for `port` with the given serial settings.
    pub fn new(port: impl Into<String>, config: SerialConfig) -> Self {
        Self {
            port: port.into(),
            config,
        }
    }

    /// The serial settings used on each open.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let transport = SerialTransport::open_with_config(&self.port, self.config.clone()).await?;
        Ok(Box::new(transport))
    }

    fn describe(&self) -> String {
        self.port.clone()
    }
}
