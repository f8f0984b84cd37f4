//! Streaming error types.

/// Streaming errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The underlying byte stream failed.
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Buffer overflow.
    #[error("Buffer overflow: {size} bytes exceeds limit of {limit}")]
    BufferOverflow {
        /// Current size.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;
