//! Transport traits for analyzer communication.
//!
//! The [`Transport`] trait abstracts over the byte link to an RF Explorer.
//! The real implementation is a USB virtual serial port (`rfe-transport`);
//! tests use `MockTransport` from `rfe-test-harness`.
//!
//! A [`Connector`] produces fresh transports. Sessions hold a connector
//! rather than a transport so that a faulted session can be closed and
//! reopened without the caller rebuilding it.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to an analyzer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the analyzer.
    ///
    /// Implementations should not return until all bytes have been written
    /// to the underlying port.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the analyzer into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing arrives within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport. Idempotent.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Opens transports on demand.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new transport to the device.
    async fn connect(&self) -> Result<Box<dyn Transport>>;

    /// Human-readable description of the target (port name for serial).
    fn describe(&self) -> String;
}
