//! Test fixtures for delimited streams.
//!
//! Provides pre-built bodies and the message shapes a filter stream carries.

use bytes::{Bytes, BytesMut};
use fcp_streaming::encode_frame;

// ─────────────────────────────────────────────────────────────────────────────
// Body Fixtures
// ─────────────────────────────────────────────────────────────────────────────

/// Concatenate correctly framed payloads into one body.
#[must_use]
pub fn delimited_body(payloads: &[&str]) -> Bytes {
    let mut body = BytesMut::new();
    for payload in payloads {
        body.extend_from_slice(&encode_frame(payload.as_bytes()));
    }
    body.freeze()
}

/// Frame each JSON value in its compact form.
#[must_use]
pub fn delimited_json_body(values: &[serde_json::Value]) -> Bytes {
    let payloads: Vec<String> = values.iter().map(ToString::to_string).collect();
    let refs: Vec<&str> = payloads.iter().map(String::as_str).collect();
    delimited_body(&refs)
}

// ─────────────────────────────────────────────────────────────────────────────
// Message Fixtures
// ─────────────────────────────────────────────────────────────────────────────

/// A minimal status message.
#[must_use]
pub fn tweet(id: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "id_str": id,
        "text": text,
        "user": {
            "id_str": "12",
            "screen_name": "jack"
        }
    })
}

/// A limit notice: statuses withheld because the filter matched too much.
#[must_use]
pub fn limit_notice(track: u64) -> serde_json::Value {
    serde_json::json!({
        "limit": {
            "track": track
        }
    })
}

/// A stall warning, sent when `stall_warnings=true` and the client lags.
#[must_use]
pub fn stall_warning(percent_full: u8) -> serde_json::Value {
    serde_json::json!({
        "warning": {
            "code": "FALLING_BEHIND",
            "message": format!("Your connection is falling behind. Queue is {percent_full}% full."),
            "percent_full": percent_full
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimited_json_body_is_compact() {
        let body = delimited_json_body(&[serde_json::json!({"a": 1})]);
        assert_eq!(&body[..], b"9\r\n{\"a\":1}\r\n");
    }

    #[test]
    fn test_delimited_body_concatenates() {
        let body = delimited_body(&["ab", ""]);
        assert_eq!(&body[..], b"4\r\nab\r\n2\r\n\r\n");
    }
}
