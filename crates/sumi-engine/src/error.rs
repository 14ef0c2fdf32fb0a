//! Error type for the engine.

use crate::classify::ClassifyError;

/// Errors from engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No usable model adapter was supplied at construction.
    #[error("no usable model adapter")]
    NoAdapter,

    /// Classification failed (malformed tag, refusal, or transport loss).
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// Document mutation failed.
    #[error(transparent)]
    Buffer(#[from] sumi_buffer::BufferError),

    /// The streaming transport failed before a stream could be opened.
    #[error("transport error: {0}")]
    Transport(String),

    /// A session operation was invoked in a state that does not allow it.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),
}
