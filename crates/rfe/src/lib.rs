//! # rfe -- RF Explorer spectrum analyzer driver
//!
//! `rfe` is an asynchronous Rust driver for RF Explorer handheld spectrum
//! analyzers. It opens the analyzer's USB serial port, identifies the
//! device, configures sweeps, and delivers amplitude records either as the
//! return value of a call or to a callback as they stream in.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rfe::{SessionBuilder, SweepConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = SessionBuilder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .connect()
//!         .await?;
//!
//!     let sweep = session
//!         .sweep_blocking(SweepConfig::new(430_000_000, 440_000_000, 112))
//!         .await?;
//!     if let Some((freq_hz, dbm)) = sweep.peak() {
//!         println!("peak {} at {dbm:.1} dBm", rfe::format_freq_mhz(freq_hz));
//!     }
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate               | Purpose                                             |
//! |---------------------|-----------------------------------------------------|
//! | `rfe-core`          | Shared types, [`Transport`] / [`Connector`], errors |
//! | `rfe-transport`     | Serial transport and port enumeration               |
//! | `rfe-analyzer`      | Wire protocol, IO task, [`Session`]                 |
//! | `rfe-ffi`           | C ABI over the session                              |
//! | **`rfe`**           | This facade crate -- re-exports everything          |
//!
//! ## Sweep Delivery
//!
//! [`Session::sweep_blocking`] configures the analyzer and returns the first
//! record produced under the new configuration.
//! [`Session::sweep_with_callback`] registers a [`SweepHandler`] that runs
//! on a dedicated thread for every record until
//! [`Session::unregister`] or [`Session::close`].
//!
//! ## Event Subscription
//!
//! ```no_run
//! use rfe::{DeviceEvent, Session};
//! # async fn example(session: &Session) {
//! let mut events = session.subscribe();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         DeviceEvent::StateChanged(state) => println!("state: {state}"),
//!         DeviceEvent::FrameDiscarded { reason } => println!("dropped frame: {reason}"),
//!         other => println!("{other:?}"),
//!     }
//! }
//! # }
//! ```

pub use rfe_core::*;

pub use rfe_analyzer::{
    CalcMode, DeviceConfig, DspMode, InputStage, Model, ParseError, RadioModule, Session,
    SessionBuilder, SweepHandler, TrackingStatus,
};

/// Wire protocol, session internals and builder.
pub mod analyzer {
    pub use rfe_analyzer::*;
}

/// Serial transport and port enumeration.
pub mod transport {
    pub use rfe_transport::*;
}

pub use rfe_transport::{analyzer_ports, list_ports, PortInfo};

/// Every analyzer module this driver knows about.
///
/// # Example
///
/// ```
/// for model in rfe::supported_models() {
///     println!("{:>8}  {} .. {} Hz", model.name(), model.min_freq_hz(), model.max_freq_hz());
/// }
/// ```
pub fn supported_models() -> &'static [Model] {
    &Model::ALL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_models_cover_plus_and_basic() {
        let models = supported_models();
        assert_eq!(models.len(), 12);
        assert!(models.iter().any(|m| m.is_plus()));
        assert!(models.iter().any(|m| !m.is_plus()));
    }

    #[test]
    fn facade_reexports_core_types() {
        let config = SweepConfig::new(100_000_000, 200_000_000, 100);
        assert_eq!(config.effective_points(), 112);
        assert_eq!(SessionState::default(), SessionState::Disconnected);
    }
}
