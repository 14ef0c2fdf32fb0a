//! Incremental stream writer.
//!
//! Appends streamed text at a write cursor without corrupting line
//! structure. The cursor is persisted back after every chunk, so a
//! response split into N chunks at arbitrary byte offsets produces the
//! same document as one delivery: each write starts exactly where the
//! previous one stopped.

use sumi_buffer::{Cursor, Editor};

use crate::Result;

/// Write one chunk of streamed text at `pos`, advancing it in place.
///
/// Non-empty segments between newlines are inserted literally at
/// `(line, col)`; each newline inserts a fresh empty line after the
/// current one and resets the column.
pub fn write_chunk(editor: &Editor, pos: &mut Cursor, text: &str) -> Result<()> {
    let mut line = pos.line;
    let mut col = pos.col;

    editor.with_buffer(pos.buffer, |buffer| -> sumi_buffer::Result<()> {
        let mut rest = text;
        loop {
            match rest.find('\n') {
                Some(newline) => {
                    let segment = &rest[..newline];
                    if !segment.is_empty() {
                        buffer.insert_text(line.saturating_sub(1), col, segment)?;
                    }
                    buffer.insert_line(line, "")?;
                    line += 1;
                    col = 0;
                    rest = &rest[newline + 1..];
                }
                None => {
                    if !rest.is_empty() {
                        let at = buffer.insert_text(line.saturating_sub(1), col, rest)?;
                        col = at + rest.len();
                    }
                    break;
                }
            }
        }
        Ok(())
    })??;

    pos.line = line;
    pos.col = col;
    Ok(())
}

/// Keep the active window's view glued to the write cursor.
///
/// Used by the `new` placement: as long as the target buffer is still
/// the one shown in the current window, the view follows the insertion
/// point.
pub fn follow_cursor(editor: &Editor, pos: &Cursor) {
    if let Some(window) = editor.current_window() {
        if editor.window_buffer(window).ok() == Some(pos.buffer) {
            let _ = editor.set_cursor(window, pos.line, pos.col);
        }
    }
}
