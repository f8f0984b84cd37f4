//! Payload classification.

use fcp_streaming::Payload;
use tracing::warn;

use crate::error::DecodeError;
use crate::event::StreamEvent;

/// Structured decoding of a payload line.
pub trait JsonDecoder: Send + Sync {
    /// Decode one payload.
    fn decode(&self, payload: &[u8]) -> Result<serde_json::Value, DecodeError>;
}

/// [`JsonDecoder`] backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonDecoder;

impl JsonDecoder for SerdeJsonDecoder {
    fn decode(&self, payload: &[u8]) -> Result<serde_json::Value, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Turn a payload into a `data` event, or a `garbage` event if it does not decode.
pub fn classify(decoder: &dyn JsonDecoder, payload: &Payload) -> StreamEvent {
    match decoder.decode(payload.bytes()) {
        Ok(value) => StreamEvent::Data(value),
        Err(e) => {
            let text = payload.text().into_owned();
            warn!(error = %e, data = %text, "Received unparseable stream payload");
            StreamEvent::Garbage(text)
        }
    }
}
