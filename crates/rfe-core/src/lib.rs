//! rfe-core: Core traits, types, and error definitions for the RF Explorer driver.
//!
//! This crate defines the device-agnostic pieces shared by the protocol
//! driver, its transports, the test harness, and the C boundary.
//!
//! # Key types
//!
//! - [`Transport`] / [`Connector`] -- byte-level communication channel
//! - [`SweepConfig`] / [`SweepRecord`] -- what to sweep and what came back
//! - [`DeviceInfo`] -- identity of a connected analyzer
//! - [`SessionState`] / [`DeviceEvent`] -- session lifecycle
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod helpers;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use events::DeviceEvent;
pub use helpers::{dbm_to_mw, format_freq_mhz};
pub use transport::{Connector, Transport};
pub use types::*;
