//! In-memory editor model for sumi.
//!
//! This crate is the document side of the inline-assist engine: a set of
//! line-addressed text buffers, the windows that view them, buffer-scoped
//! keymaps with group-based cleanup, and the "last response" slot the
//! engine publishes into when a stream completes.
//!
//! All mutation goes through [`Editor`], which serializes every change
//! behind a single lock. Stream callbacks may fire from any task; by the
//! time they touch a buffer they are strictly ordered and never
//! interleaved with another writer of the same editor.

mod buffer;
mod editor;
mod error;
mod ids;

pub use buffer::{Buffer, BufferKind};
pub use editor::{Editor, SplitOrientation, SplitSize};
pub use error::BufferError;
pub use ids::{BufferId, WindowId};

/// Result type for buffer operations.
pub type Result<T> = std::result::Result<T, BufferError>;

/// A write cursor: the place where the next piece of text lands.
///
/// `line` is 1-based (editor convention), `col` is a 0-based byte offset
/// into the line. The pair advances as streamed text is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// 1-based line number.
    pub line: usize,
    /// 0-based byte column within the line.
    pub col: usize,
    /// Buffer the cursor points into.
    pub buffer: BufferId,
}

impl Cursor {
    /// Create a cursor at the given position.
    pub fn new(line: usize, col: usize, buffer: BufferId) -> Self {
        Self { line, col, buffer }
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.buffer, self.line, self.col)
    }
}
