//! Transport implementations for the RF Explorer driver.
//!
//! The analyzer connects over USB through a CP210x bridge and shows up as a
//! virtual serial port. This crate provides:
//!
//! - [`SerialTransport`]: the [`Transport`](rfe_core::Transport) over a serial port
//! - [`SerialConnector`]: a [`Connector`](rfe_core::Connector) that opens
//!   a fresh `SerialTransport` for each session open
//! - [`list_ports`] / [`analyzer_ports`]: serial port enumeration
//!
//! # Example
//!
//! ```no_run
//! use rfe_transport::SerialTransport;
//! use rfe_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> rfe_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 500_000).await?;
//!
//! // Request the current configuration
//! transport.send(b"#\x04C0").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod ports;
pub mod serial;

pub use ports::{analyzer_ports, list_ports, PortInfo, CP210X_PID, CP210X_VID};
pub use serial::{SerialConfig, SerialConnector, SerialTransport, DEFAULT_BAUD_RATE};
