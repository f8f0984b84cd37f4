//! FCP Streaming - delimited-length frame decoding for FCP connectors
//!
//! Long-lived HTTP streams that use `delimited=length` framing interleave a
//! decimal length line with a payload line, and keep the socket warm with bare
//! `\r\n` heartbeats. This crate provides:
//!
//! - **Decoder**: an incremental [`DelimitedDecoder`] that turns arbitrary
//!   chunks into [`Frame`]s without ever losing synchronization
//! - **Stream adapter**: [`DelimitedStream`] over any byte stream
//! - **Encoder**: [`encode_frame`] for building bodies in tests and fixtures
//!
//! # Quick Start
//!
//! ```rust
//! use fcp_streaming::{DelimitedDecoder, Frame};
//!
//! let mut decoder = DelimitedDecoder::new();
//! assert!(decoder.feed(b"9\r\n").all(|f| matches!(f, Frame::Length(_))));
//!
//! let frames: Vec<Frame> = decoder.feed(b"{\"a\":1}\r\n").collect();
//! assert!(matches!(&frames[..], [Frame::Payload(p)] if p.mismatch().is_none()));
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod delimited;
mod error;
mod stream;

pub use delimited::*;
pub use error::*;
pub use stream::*;

/// Default ceiling on bytes buffered while waiting for a line terminator.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;
