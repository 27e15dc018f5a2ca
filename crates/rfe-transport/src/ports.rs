//! Serial port enumeration.
//!
//! RF Explorer analyzers use a Silicon Labs CP210x USB-to-UART bridge, so
//! [`analyzer_ports`] narrows the system's serial ports to that VID/PID.

use rfe_core::error::{Error, Result};
use tokio_serial::SerialPortType;

/// USB vendor ID of the Silicon Labs CP210x bridge.
pub const CP210X_VID: u16 = 0x10C4;

/// USB product ID of the Silicon Labs CP210x bridge.
pub const CP210X_PID: u16 = 0xEA60;

/// A serial port found on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS port name ("/dev/ttyUSB0", "COM3").
    pub name: String,
    /// USB vendor and product IDs, if the port is a USB device.
    pub usb_id: Option<(u16, u16)>,
    /// USB product string, if reported.
    pub product: Option<String>,
}

impl PortInfo {
    /// Returns `true` if the port is behind a CP210x bridge.
    pub fn is_analyzer(&self) -> bool {
        self.usb_id == Some((CP210X_VID, CP210X_PID))
    }
}

impl From<tokio_serial::SerialPortInfo> for PortInfo {
    fn from(info: tokio_serial::SerialPortInfo) -> Self {
        let (usb_id, product) = match info.port_type {
            SerialPortType::UsbPort(usb) => (Some((usb.vid, usb.pid)), usb.product),
            _ => (None, None),
        };
        PortInfo {
            name: info.port_name,
            usb_id,
            product,
        }
    }
}

/// List every serial port the OS reports.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = tokio_serial::available_ports().map_err(|e| {
        tracing::error!(error = %e, "Failed to enumerate serial ports");
        Error::Transport(format!("Failed to enumerate serial ports: {}", e))
    })?;

    tracing::debug!(count = ports.len(), "Enumerated serial ports");
    Ok(ports.into_iter().map(PortInfo::from).collect())
}

/// List serial ports that look like an RF Explorer.
pub fn analyzer_ports() -> Result<Vec<PortInfo>> {
    Ok(list_ports()?
        .into_iter()
        .filter(PortInfo::is_analyzer)
        .collect())
}
