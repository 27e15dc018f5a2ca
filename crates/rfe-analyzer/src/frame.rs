//! Frame decoder for the analyzer's byte stream.
//!
//! The device interleaves binary sweep frames with ASCII text messages on a
//! single serial stream, with no checksums. Frames are recognised by their
//! start marker and delimited by a length header (binary) or a line ending
//! (text).
//!
//! # Frame formats
//!
//! ```text
//! $S <n:u8>     <n bytes>            [\r\n]   standard sweep
//! $s <n:u8>     <(n+1)*16 bytes>     [\r\n]   extended sweep
//! $z <n:u16be>  <n bytes>            [\r\n]   large sweep
//! $D            <1024 bytes>         [\r\n]   screen dump
//! # ...                               \r\n    text message
//! DSP: ...                            \r\n    DSP mode report
//! ```
//!
//! A sweep that contains the end-of-transmission marker or the start of a
//! `#C2-` text message was cut short by the device. It is reported as
//! malformed and decoding resumes after the marker, or at the text message.

use bytes::{Buf, BytesMut};

use crate::error::ParseError;

/// End-of-transmission marker the device sends when it aborts a sweep.
pub const EEOT: [u8; 5] = [0xFF, 0xFE, 0xFF, 0xFE, 0x00];

/// Start of the configuration and setup messages.
const TEXT_CONFIG_PREFIX: &[u8] = b"#C2-";

/// Size of a screen dump payload (128 x 8 bytes).
pub const SCREEN_DUMP_LEN: usize = 128 * 8;

/// Longest text message accepted before the line is declared malformed.
pub const MAX_TEXT_LEN: usize = 512;

/// Upper bound on buffered bytes. A single frame never exceeds this.
pub const MAX_BUFFERED: usize = 128 * 1024;

/// Which sweep header introduced a sweep frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepFormat {
    /// `$S`: one-byte sample count.
    Standard,
    /// `$s`: one-byte count in units of 16, minus one.
    Extended,
    /// `$z`: big-endian `u16` sample count.
    Large,
}

/// A complete frame cut from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw amplitude bytes of one sweep.
    Sweep {
        format: SweepFormat,
        /// Sample count from the header.
        declared: usize,
        payload: Vec<u8>,
    },
    /// Raw screen dump bytes.
    ScreenDump(Vec<u8>),
    /// A text line without its line ending (starts with `#` or `DSP:`).
    Text(Vec<u8>),
}

/// Result of attempting to decode a frame from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete frame was decoded. The `usize` is the number of bytes
    /// consumed, including any trailing line ending.
    Frame(Frame, usize),

    /// The buffer does not yet contain a complete frame.
    Incomplete,

    /// The buffer starts with bytes that are not a frame start; discard
    /// this many.
    Skip(usize),

    /// The frame at the start of the buffer is malformed; discard
    /// `consumed` bytes and try again.
    Malformed { consumed: usize, error: ParseError },
}

/// Length of the marker-and-header prefix and the payload length of a
/// binary frame starting at `buf[0] == b'$'`, or `None` if more bytes are
/// needed to tell. `Some(Err(()))` means the byte after `$` is not a
/// known frame type.
fn binary_header(buf: &[u8]) -> Option<Result<(Option<SweepFormat>, usize, usize), ()>> {
    let kind = *buf.get(1)?;
    let header = match kind {
        b'S' => (Some(SweepFormat::Standard), 3, usize::from(*buf.get(2)?)),
        b's' => (
            Some(SweepFormat::Extended),
            3,
            (usize::from(*buf.get(2)?) + 1) * 16,
        ),
        b'z' => {
            let len = u16::from_be_bytes([*buf.get(2)?, *buf.get(3)?]);
            (Some(SweepFormat::Large), 4, usize::from(len))
        }
        b'D' => (None, 2, SCREEN_DUMP_LEN),
        _ => return Some(Err(())),
    };
    Some(Ok(header))
}

/// Look for a sign that a sweep payload was cut short. Returns the number of
/// bytes (from the start of `payload`) to discard.
fn find_truncation(payload: &[u8]) -> Option<usize> {
    (0..payload.len()).find_map(|i| {
        let rest = &payload[i..];
        if rest.starts_with(&EEOT) {
            Some(i + EEOT.len())
        } else if rest.starts_with(TEXT_CONFIG_PREFIX) {
            Some(i)
        } else {
            None
        }
    })
}

/// Returns `true` if `b` can start the next frame.
fn is_frame_start(b: u8) -> bool {
    matches!(b, b'$' | b'#' | b'D')
}

/// Decode a length-delimited binary frame at the start of `buf`.
fn decode_binary(buf: &[u8]) -> DecodeResult {
    let (format, header_len, payload_len) = match binary_header(buf) {
        None => return DecodeResult::Incomplete,
        Some(Err(())) => return DecodeResult::Skip(1),
        Some(Ok(h)) => h,
    };

    let end = header_len + payload_len;
    let available = &buf[header_len.min(buf.len())..end.min(buf.len())];

    if format.is_some() {
        if let Some(cut) = find_truncation(available) {
            return DecodeResult::Malformed {
                consumed: header_len + cut,
                error: ParseError::TruncatedPayload,
            };
        }
    }

    if buf.len() < end {
        return DecodeResult::Incomplete;
    }

    let consumed = match buf.get(end) {
        None => end,
        Some(b'\r') => match buf.get(end + 1) {
            Some(b'\n') => end + 2,
            _ => end + 1,
        },
        Some(&b) if is_frame_start(b) => end,
        Some(_) => {
            return DecodeResult::Malformed {
                consumed: 1,
                error: ParseError::BadTerminator,
            }
        }
    };

    let payload = buf[header_len..end].to_vec();
    let frame = match format {
        Some(format) => Frame::Sweep {
            format,
            declared: payload_len,
            payload,
        },
        None => Frame::ScreenDump(payload),
    };
    DecodeResult::Frame(frame, consumed)
}

/// Decode a `\r\n`-terminated text frame at the start of `buf`.
///
/// Text is printable ASCII. A control byte or `$` before the line ending
/// means the candidate started inside binary data; everything before that
/// byte is discarded so decoding resumes at it.
fn decode_text(buf: &[u8]) -> DecodeResult {
    let limit = buf.len().min(MAX_TEXT_LEN + 2);
    for (i, &b) in buf[..limit].iter().enumerate() {
        match b {
            b'\r' => {
                return match buf.get(i + 1) {
                    Some(b'\n') => DecodeResult::Frame(Frame::Text(buf[..i].to_vec()), i + 2),
                    Some(_) => DecodeResult::Malformed {
                        consumed: i,
                        error: ParseError::NotText,
                    },
                    None => DecodeResult::Incomplete,
                }
            }
            b'$' => {
                return DecodeResult::Malformed {
                    consumed: i,
                    error: ParseError::NotText,
                }
            }
            b' '..=b'~' => {}
            _ => {
                return DecodeResult::Malformed {
                    consumed: i,
                    error: ParseError::NotText,
                }
            }
        }
    }

    if buf.len() >= MAX_TEXT_LEN + 2 {
        DecodeResult::Malformed {
            consumed: 1,
            error: ParseError::Overlong,
        }
    } else {
        DecodeResult::Incomplete
    }
}

/// Attempt to decode one frame from the start of a byte buffer.
///
/// Returns [`DecodeResult::Frame`] with the number of bytes consumed
/// (the caller should drain these), [`DecodeResult::Incomplete`] if more
/// data is needed, [`DecodeResult::Skip`] for leading bytes that cannot
/// start a frame, or [`DecodeResult::Malformed`] for a frame that must be
/// discarded.
///
/// # Example
///
/// ```
/// use rfe_analyzer::frame::{decode_frame, DecodeResult, Frame};
///
/// let buf = b"$S\x03\x50\x60\x70\r\n";
/// match decode_frame(buf) {
///     DecodeResult::Frame(Frame::Sweep { payload, .. }, consumed) => {
///         assert_eq!(payload, vec![0x50, 0x60, 0x70]);
///         assert_eq!(consumed, 8);
///     }
///     other => panic!("expected a sweep frame, got {other:?}"),
/// }
/// ```
pub fn decode_frame(buf: &[u8]) -> DecodeResult {
    let Some(&first) = buf.first() else {
        return DecodeResult::Incomplete;
    };

    match first {
        b'$' => decode_binary(buf),
        b'#' => decode_text(buf),
        b'D' => {
            let n = buf.len().min(4);
            if buf[..n] != b"DSP:"[..n] {
                DecodeResult::Skip(1)
            } else if n < 4 {
                DecodeResult::Incomplete
            } else {
                decode_text(buf)
            }
        }
        _ => {
            let run = buf
                .iter()
                .position(|&b| is_frame_start(b))
                .unwrap_or(buf.len());
            DecodeResult::Skip(run)
        }
    }
}

/// Buffers stream input and yields complete frames.
///
/// Partial frames are kept across [`push`](Self::push) calls. Iterating
/// yields `Ok(frame)` for each complete frame and `Err(error)` for each
/// malformed frame that was discarded; it stops when the buffered bytes do
/// not contain another complete frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    skipped: u64,
    malformed: u64,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the transport.
    pub fn push(&mut self, data: &[u8]) {
        if self.buf.len() + data.len() > MAX_BUFFERED {
            tracing::warn!(len = self.buf.len(), "frame buffer overflow, resetting");
            self.malformed += 1;
            self.buf.clear();
        }
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Number of frames discarded as malformed so far.
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// Number of stray bytes skipped between frames (line endings excluded).
    pub fn skipped_count(&self) -> u64 {
        self.skipped
    }

    /// Drop any buffered partial frame.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Iterator for FrameDecoder {
    type Item = Result<Frame, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match decode_frame(&self.buf) {
                DecodeResult::Frame(frame, consumed) => {
                    self.buf.advance(consumed);
                    return Some(Ok(frame));
                }
                DecodeResult::Incomplete => return None,
                DecodeResult::Skip(n) => {
                    let stray = self.buf[..n]
                        .iter()
                        .filter(|&&b| b != b'\r' && b != b'\n')
                        .count();
                    if stray > 0 {
                        tracing::trace!(bytes = stray, "skipping bytes outside any frame");
                        self.skipped += stray as u64;
                    }
                    self.buf.advance(n);
                }
                DecodeResult::Malformed { consumed, error } => {
                    self.buf.advance(consumed);
                    self.malformed += 1;
                    return Some(Err(error));
                }
            }
        }
    }
}
