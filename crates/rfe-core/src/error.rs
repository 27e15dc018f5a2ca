//! Error types for the RF Explorer driver.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, session contract
//! violations, and protocol errors that escape the decoder are captured here.
//! Frame-level parse errors have their own type in `rfe-analyzer` and never
//! surface through this enum.

/// The error type for all driver operations.
///
/// The transport-level variants ([`NotFound`](Error::NotFound),
/// [`PermissionDenied`](Error::PermissionDenied), [`ConnectionLost`](Error::ConnectionLost),
/// [`Transport`](Error::Transport), [`Io`](Error::Io)) are usually fatal to a
/// session. The session-level variants ([`NotConnected`](Error::NotConnected),
/// [`Faulted`](Error::Faulted), [`Closed`](Error::Closed),
/// [`AlreadyRegistered`](Error::AlreadyRegistered)) report API contract
/// violations or the outcome of a pending call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port setup, driver failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unexpected reply, malformed command).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for data from the analyzer.
    ///
    /// This typically indicates the analyzer is switched off, the baud rate
    /// is wrong, or the device is busy in a mode that does not stream sweeps.
    #[error("timeout waiting for response")]
    Timeout,

    /// The requested operation is not supported by this analyzer model.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed to a session operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The session has no open connection.
    #[error("not connected")]
    NotConnected,

    /// The connection to the analyzer was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The serial port could not be found.
    #[error("port not found: {0}")]
    NotFound(String),

    /// The operating system refused access to the serial port.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The session is already open.
    #[error("session already open")]
    AlreadyOpen,

    /// The session hit a fatal transport error and must be closed and reopened.
    #[error("session faulted")]
    Faulted,

    /// The session was closed while the call was pending.
    #[error("session closed")]
    Closed,

    /// A sweep callback is already registered on this session.
    #[error("a sweep callback is already registered")]
    AlreadyRegistered,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this error means the link to the device is unusable.
    ///
    /// Receive timeouts are routine while idling and are not fatal; every
    /// other transport-level failure is.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConnectionLost
                | Error::NotConnected
                | Error::Transport(_)
                | Error::Io(_)
                | Error::NotFound(_)
                | Error::PermissionDenied(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
