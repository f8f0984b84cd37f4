//! Public stream events.
//!
//! Every event of every connection a [`crate::TwitterStream`] opens arrives on
//! one ordered channel as a [`StreamEvent`]. The event names returned by
//! [`StreamEvent::name`] are the wire contract consumers match on.

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Sentinel carried by a `close` event when the server ended the body.
pub const SOCKET_END: &str = "socket end";

/// An observable stream event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "lowercase")]
pub enum StreamEvent {
    /// The server accepted the request (status 200 or below).
    Connected,

    /// Keep-alive received.
    Heartbeat,

    /// A payload that decoded as JSON.
    Data(serde_json::Value),

    /// A payload that did not decode, as received.
    Garbage(String),

    /// The request failed or was rejected. The connection is gone.
    Error(StreamFailure),

    /// The socket failed or ended. The connection is gone.
    Close(CloseReason),
}

impl StreamEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Heartbeat => "heartbeat",
            Self::Data(_) => "data",
            Self::Garbage(_) => "garbage",
            Self::Error(_) => "error",
            Self::Close(_) => "close",
        }
    }

    /// Whether the connection that produced this event is finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Close(_))
    }
}

/// Why a connection never started streaming.
///
/// Serializes as `{"type": "request" | "response", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamFailure {
    /// The request could not be dispatched.
    #[error("Request failed: {message}")]
    Request {
        /// Transport error description.
        message: String,
    },

    /// The server answered with a status above 200.
    #[error("Stream rejected with status {code}")]
    Response {
        /// HTTP status code.
        code: u16,
    },
}

impl StreamFailure {
    /// `"request"` or `"response"`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Response { .. } => "response",
        }
    }
}

/// Why a streaming connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The socket failed mid-stream.
    SocketError(String),
    /// The server ended the body.
    SocketEnd,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SocketError(message) => f.write_str(message),
            Self::SocketEnd => f.write_str(SOCKET_END),
        }
    }
}

impl Serialize for CloseReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
