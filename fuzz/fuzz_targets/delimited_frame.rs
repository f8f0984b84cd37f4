//! Delimited Frame Fuzz Target
//!
//! Fuzzes the `delimited=length` decoder:
//! - Length line parsing (signs, whitespace, overflow, non-digits)
//! - Payload resolution with mismatched declared lengths
//! - Arbitrary chunk boundaries, including bare `\r\n` heartbeats
//!
//! Goal: Ensure no panics on arbitrary input and that a payload is only ever
//! produced from complete lines.

#![no_main]

use fcp_streaming::{DelimitedDecoder, Frame, LINE_TERMINATOR};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the chunk size so the same body is cut many ways.
    let Some((&split, body)) = data.split_first() else {
        return;
    };
    let chunk_size = usize::from(split % 32) + 1;

    let mut decoder = DelimitedDecoder::new();
    let mut payload_bytes = 0;
    for chunk in body.chunks(chunk_size) {
        for frame in decoder.feed(chunk) {
            if let Frame::Payload(payload) = frame {
                assert!(!payload.bytes().windows(2).any(|w| w == LINE_TERMINATOR));
                payload_bytes += payload.bytes().len();
                let _ = payload.text();
            }
        }
    }

    // Nothing is invented: every payload byte came from the input.
    assert!(payload_bytes <= body.len());
    assert!(decoder.buffered() <= body.len());
});
