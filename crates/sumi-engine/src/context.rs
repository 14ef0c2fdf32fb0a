//! Snapshot of the originating selection.

use serde::{Deserialize, Serialize};
use sumi_buffer::{BufferId, BufferKind, WindowId};

/// Immutable description of where a session was invoked.
///
/// Captured once by the editor integration layer when the session
/// starts. Selection bounds are 1-indexed and `end` is inclusive. The
/// only mutation the engine ever performs is the one-line forward
/// adjustment the `before` placement makes to `start_line`/`start_col`
/// after inserting its blank line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Owning buffer.
    pub buffer: BufferId,
    /// Window the invocation happened in.
    pub window: WindowId,
    /// 1-based first line of the selection (or the cursor line).
    pub start_line: usize,
    /// 1-based first column.
    pub start_col: usize,
    /// 1-based last line, inclusive.
    pub end_line: usize,
    /// 1-based last column, inclusive.
    pub end_col: usize,
    /// Whether the invocation was a visual/range selection.
    pub is_visual: bool,
    /// Language identifier of the buffer.
    pub filetype: String,
    /// Document kind.
    pub kind: BufferKind,
    /// The selected lines, verbatim, at capture time.
    pub lines: Vec<String>,
}

impl Context {
    /// Snapshot a cursor-only invocation at `(line, col)` (1-based).
    pub fn at_cursor(
        buffer: BufferId,
        window: WindowId,
        line: usize,
        col: usize,
        filetype: impl Into<String>,
    ) -> Self {
        Self {
            buffer,
            window,
            start_line: line,
            start_col: col,
            end_line: line,
            end_col: col,
            is_visual: false,
            filetype: filetype.into(),
            kind: BufferKind::Normal,
            lines: Vec::new(),
        }
    }

    /// Snapshot a visual selection with its captured lines.
    #[allow(clippy::too_many_arguments)]
    pub fn selection(
        buffer: BufferId,
        window: WindowId,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
        filetype: impl Into<String>,
        lines: Vec<String>,
    ) -> Self {
        Self {
            buffer,
            window,
            start_line,
            start_col,
            end_line,
            end_col,
            is_visual: true,
            filetype: filetype.into(),
            kind: BufferKind::Normal,
            lines,
        }
    }

    /// The selected text as one string.
    pub fn selected_text(&self) -> String {
        self.lines.join("\n")
    }
}
