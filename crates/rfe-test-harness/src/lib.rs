//! rfe-test-harness: Test utilities and mock transports for the RF Explorer
//! driver.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the protocol engine without a real analyzer, and [`MockConnector`] for
//! exercising session open, fault, and reopen paths.

pub mod mock_connector;
pub mod mock_serial;

pub use mock_connector::MockConnector;
pub use mock_serial::{MockHandle, MockTransport};
