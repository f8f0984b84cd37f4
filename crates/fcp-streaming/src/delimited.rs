//! `delimited=length` framing.
//!
//! A streaming body alternates length lines and payload lines, each ended by
//! `\r\n`. Between them the server may write a bare `\r\n` as a keep-alive:
//!
//! ```text
//! 9\r\n
//! {"a":1}\r\n
//! \r\n
//! ```
//!
//! The declared length counts the payload bytes plus the trailing terminator.
//! Malformed length lines and length mismatches are reported, never fatal: the
//! decoder keeps alternating between the two line kinds no matter what.

use std::borrow::Cow;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::{DEFAULT_MAX_BUFFER_SIZE, StreamError, StreamResult};

/// Line terminator used by delimited streams.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// What the decoder expects the next complete line to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderMode {
    /// Next line is a decimal length.
    #[default]
    AwaitingLength,
    /// Next line is a payload.
    AwaitingPayload,
}

impl DecoderMode {
    const fn toggled(self) -> Self {
        match self {
            Self::AwaitingLength => Self::AwaitingPayload,
            Self::AwaitingPayload => Self::AwaitingLength,
        }
    }
}

/// Length announced by a length line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredLength {
    /// Parsed decimal value, terminator included. May be negative.
    Valid(i64),
    /// The line was not a decimal integer; the raw text is kept.
    Invalid(String),
}

impl DeclaredLength {
    /// Parse a length line. Surrounding ASCII whitespace is ignored.
    #[must_use]
    pub fn parse(line: &[u8]) -> Self {
        let text = String::from_utf8_lossy(line);
        text.trim()
            .parse::<i64>()
            .map_or_else(|_| Self::Invalid(text.into_owned()), Self::Valid)
    }

    /// The parsed value, if the line was numeric.
    #[must_use]
    pub const fn value(&self) -> Option<i64> {
        match self {
            Self::Valid(value) => Some(*value),
            Self::Invalid(_) => None,
        }
    }

    /// Whether a payload of `payload_len` bytes satisfies this declaration.
    #[must_use]
    pub fn matches(&self, payload_len: usize) -> bool {
        let actual = payload_len + LINE_TERMINATOR.len();
        match self {
            Self::Valid(declared) => i64::try_from(actual).is_ok_and(|actual| actual == *declared),
            Self::Invalid(_) => false,
        }
    }
}

/// Declared and actual size of a payload line that disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthMismatch {
    /// What the preceding length line announced, if anything was announced.
    pub declared: Option<DeclaredLength>,
    /// Payload bytes plus terminator.
    pub actual: usize,
}

/// A resolved payload line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Bytes,
    mismatch: Option<LengthMismatch>,
}

impl Payload {
    /// Raw payload bytes, terminator excluded.
    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Payload as text. Invalid UTF-8 is replaced.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Length diagnostic, present when the declared length was off.
    #[must_use]
    pub const fn mismatch(&self) -> Option<&LengthMismatch> {
        self.mismatch.as_ref()
    }

    /// Whether the payload line was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume the payload, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// One decoded unit of a delimited stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Keep-alive: a chunk that was exactly `\r\n`.
    Heartbeat,
    /// A length line.
    Length(DeclaredLength),
    /// A payload line.
    Payload(Payload),
}

/// Incremental decoder for `delimited=length` streams.
///
/// Owns the bytes received but not yet resolved into a full line. One decoder
/// belongs to exactly one connection; a new connection starts a new decoder.
#[derive(Debug)]
pub struct DelimitedDecoder {
    buffer: BytesMut,
    /// Prefix of `buffer` already searched for a terminator.
    scanned: usize,
    mode: DecoderMode,
    declared: Option<DeclaredLength>,
    max_buffer_size: usize,
}

impl Default for DelimitedDecoder {
    fn default() -> Self {
        Self::with_max_buffer_size(DEFAULT_MAX_BUFFER_SIZE)
    }
}

impl DelimitedDecoder {
    /// Create a decoder expecting a length line, with the default ceiling on
    /// unterminated bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder whose [`check_buffer`](Self::check_buffer) fails once
    /// more than `limit` bytes wait for a terminator.
    #[must_use]
    pub fn with_max_buffer_size(limit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            mode: DecoderMode::default(),
            declared: None,
            max_buffer_size: limit,
        }
    }

    /// Feed one chunk and return the frames it completes.
    ///
    /// A chunk that is exactly `\r\n` is a heartbeat and leaves the buffer and
    /// mode untouched. Any other chunk is appended to the buffer, and the
    /// returned iterator resolves complete lines one at a time. Lines the
    /// iterator does not get to stay buffered and come out of the next feed.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        if chunk == LINE_TERMINATOR {
            return Frames {
                decoder: self,
                heartbeat: true,
                lines: false,
            };
        }

        self.buffer.extend_from_slice(chunk);
        Frames {
            decoder: self,
            heartbeat: false,
            lines: true,
        }
    }

    /// Current expectation for the next line.
    #[must_use]
    pub const fn mode(&self) -> DecoderMode {
        self.mode
    }

    /// Bytes held back waiting for a terminator.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Ceiling on bytes held back waiting for a terminator.
    #[must_use]
    pub const fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// Fail if the unterminated tail of the buffer exceeds the ceiling.
    ///
    /// Meant to be called after the frames of a feed have been drained, so
    /// only bytes that no terminator has claimed count against the limit.
    pub fn check_buffer(&self) -> StreamResult<()> {
        let size = self.buffer.len();
        if size > self.max_buffer_size {
            return Err(StreamError::BufferOverflow {
                size,
                limit: self.max_buffer_size,
            });
        }
        Ok(())
    }

    /// The most recently announced length.
    #[must_use]
    pub const fn declared_length(&self) -> Option<&DeclaredLength> {
        self.declared.as_ref()
    }

    fn next_line(&mut self) -> Option<BytesMut> {
        // Back up one byte so a terminator split across feeds is still found.
        let start = self.scanned.saturating_sub(LINE_TERMINATOR.len() - 1);
        let Some(offset) = find_terminator(&self.buffer[start..]) else {
            self.scanned = self.buffer.len();
            return None;
        };

        let line = self.buffer.split_to(start + offset);
        self.buffer.advance(LINE_TERMINATOR.len());
        self.scanned = 0;
        Some(line)
    }

    fn resolve(&mut self, line: BytesMut) -> Frame {
        let frame = match self.mode {
            DecoderMode::AwaitingLength => {
                let declared = DeclaredLength::parse(&line);
                if let DeclaredLength::Invalid(raw) = &declared {
                    warn!(line = %raw, "Length line is not a decimal integer");
                }
                debug!(declared = ?declared, "Received length line");
                self.declared = Some(declared.clone());
                Frame::Length(declared)
            }
            DecoderMode::AwaitingPayload => {
                let mismatch = match &self.declared {
                    Some(declared) if declared.matches(line.len()) => None,
                    declared => {
                        let mismatch = LengthMismatch {
                            declared: declared.clone(),
                            actual: line.len() + LINE_TERMINATOR.len(),
                        };
                        warn!(
                            declared = ?mismatch.declared,
                            actual = mismatch.actual,
                            "Payload length does not match declared length"
                        );
                        Some(mismatch)
                    }
                };
                Frame::Payload(Payload {
                    bytes: line.freeze(),
                    mismatch,
                })
            }
        };

        self.mode = self.mode.toggled();
        frame
    }
}

/// Frames completed by one [`DelimitedDecoder::feed`] call.
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut DelimitedDecoder,
    heartbeat: bool,
    lines: bool,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if std::mem::take(&mut self.heartbeat) {
            debug!("Received heartbeat");
            return Some(Frame::Heartbeat);
        }
        if !self.lines {
            return None;
        }

        let Some(line) = self.decoder.next_line() else {
            self.lines = false;
            return None;
        };
        Some(self.decoder.resolve(line))
    }
}

/// Encode one payload as a length line followed by the payload line.
#[must_use]
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let length = (payload.len() + LINE_TERMINATOR.len()).to_string();
    let mut out = BytesMut::with_capacity(length.len() + payload.len() + 2 * LINE_TERMINATOR.len());
    out.put_slice(length.as_bytes());
    out.put_slice(LINE_TERMINATOR);
    out.put_slice(payload);
    out.put_slice(LINE_TERMINATOR);
    out.freeze()
}

fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(LINE_TERMINATOR.len())
        .position(|window| window == LINE_TERMINATOR)
}
