//! Asynchronous session event types.
//!
//! Events are emitted by a session through a [`tokio::sync::broadcast`]
//! channel as the device link changes. Displays and loggers subscribe to
//! them instead of polling the session.

use crate::types::SessionState;

/// An event emitted by a session.
///
/// Delivery is best effort through a bounded broadcast channel; slow
/// subscribers may miss events when the analyzer streams fast sweeps.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The transport opened and the device answered the handshake.
    Connected,

    /// The transport closed or failed.
    Disconnected,

    /// The session moved to a new state.
    StateChanged(SessionState),

    /// The analyzer reported a new sweep configuration.
    ConfigChanged {
        /// First frequency of the sweep in hertz.
        start_hz: u64,
        /// Last frequency of the sweep in hertz.
        stop_hz: u64,
        /// Number of points per sweep.
        sweep_points: u16,
    },

    /// A sweep record was parsed.
    SweepReceived {
        /// Number of amplitude samples in the record.
        points: usize,
    },

    /// A malformed or unparseable frame was dropped.
    FrameDiscarded {
        /// Why the frame was discarded.
        reason: String,
    },
}
