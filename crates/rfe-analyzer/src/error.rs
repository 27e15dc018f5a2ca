//! Frame-level parse errors.
//!
//! A [`ParseError`] means one frame was dropped. It is logged by the IO task
//! and never surfaces through the session API.

/// Why a frame or message could not be turned into a [`Message`](crate::messages::Message).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The frame ended before its declared payload did (sweep aborted by the
    /// device, or cut short by a text message).
    #[error("truncated payload")]
    TruncatedPayload,

    /// The number of amplitude bytes disagrees with the count in the header.
    #[error("invalid sample count: declared {declared}, found {found}")]
    InvalidSampleCount { declared: usize, found: usize },

    /// A binary frame was not followed by a line ending or the next frame.
    #[error("bad frame terminator")]
    BadTerminator,

    /// A text message contained a control byte or `$` before its line
    /// ending, so it was really part of a binary frame.
    #[error("non-printable byte in text message")]
    NotText,

    /// A text message exceeded the maximum line length without a line ending.
    #[error("text message too long")]
    Overlong,

    /// A recognised message had a field that failed to parse.
    #[error("invalid message: {0}")]
    Invalid(String),

    /// The frame is well formed but not a message this driver understands.
    #[error("unknown message type")]
    UnknownMessage,
}
