//! RF Explorer spectrum analyzer protocol engine.
//!
//! This crate implements the serial protocol spoken by RF Explorer handheld
//! spectrum analyzers and the session that drives one. It provides:
//!
//! - **Frame decoder** ([`frame`]) -- cut the mixed binary/ASCII stream into
//!   sweep, screen dump, and text frames, recovering from truncated sweeps.
//! - **Message parser** ([`messages`]) -- turn frames into configuration,
//!   setup, serial number, and sweep messages.
//! - **Command builders** ([`commands`]) -- encode host-to-device commands.
//! - **Model definitions** ([`models`]) -- radio module codes and frequency
//!   limits.
//! - **Session** ([`session`]) -- open, identify, configure, and sweep, with
//!   blocking and callback delivery.
//! - **SessionBuilder** ([`builder`]) -- fluent construction with
//!   configurable timeouts.
//!
//! # Example
//!
//! ```
//! use rfe_analyzer::frame::{decode_frame, DecodeResult, Frame};
//! use rfe_analyzer::messages::{parse_message, Message};
//!
//! let bytes = [b'$', b'S', 3, 80, 100, 120, b'\r', b'\n'];
//! if let DecodeResult::Frame(frame, consumed) = decode_frame(&bytes) {
//!     assert_eq!(consumed, bytes.len());
//!     assert!(matches!(frame, Frame::Sweep { .. }));
//!     if let Ok(Message::Sweep(amps)) = parse_message(&frame) {
//!         assert_eq!(amps, vec![-40.0, -50.0, -60.0]);
//!     }
//! }
//! ```

pub mod builder;
pub mod callback;
pub mod commands;
pub mod error;
pub mod frame;
mod io;
pub mod messages;
pub mod models;
pub mod modes;
pub mod session;

#[cfg(test)]
mod test_support;

pub use builder::SessionBuilder;
pub use callback::SweepHandler;
pub use error::ParseError;
pub use messages::DeviceConfig;
pub use models::Model;
pub use modes::{CalcMode, DspMode, InputStage, RadioModule, TrackingStatus};
pub use session::Session;
