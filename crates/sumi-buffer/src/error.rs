//! Error type for buffer and editor operations.

use crate::{BufferId, WindowId};

/// Errors from buffer/editor operations.
///
/// Out-of-range *columns* are clamped rather than raised (streamed model
/// output routinely lands at the end of a line); out-of-range *lines* and
/// unknown ids are hard errors because they indicate the caller lost
/// track of document state.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("no such buffer: {0}")]
    UnknownBuffer(BufferId),

    #[error("no such window: {0}")]
    UnknownWindow(WindowId),

    #[error("line {line} out of range for buffer {buffer} ({len} lines)")]
    LineOutOfRange {
        buffer: BufferId,
        line: usize,
        len: usize,
    },

    #[error("no keymap {lhs:?} on buffer {buffer}")]
    UnknownKeymap { buffer: BufferId, lhs: String },
}
