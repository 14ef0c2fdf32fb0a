//! Placement engine: mutate the document, compute the write cursor.
//!
//! Exactly one branch runs per session, chosen by the classifier (or an
//! explicit override). The returned pre-edit line set, present for the
//! reviewable placements, is what the diff overlay later restores on
//! reject.

use sumi_buffer::{Cursor, Editor};
use tracing::debug;

use crate::classify::Placement;
use crate::config::Settings;
use crate::context::Context;
use crate::error::EngineError;
use crate::Result;

/// Outcome of placing: where to write, plus the captured pre-edit lines
/// for placements that rewrite an existing buffer.
#[derive(Debug, Clone)]
pub struct Placed {
    pub pos: Cursor,
    pub before_lines: Option<Vec<String>>,
}

/// Mutate the document for `placement` and compute the write cursor.
///
/// `ctx` is only mutated by the `before` branch (the documented one-line
/// forward adjustment). `Chat` never reaches this function; the session
/// state machine routes it to the conversation handoff instead.
pub fn place(
    editor: &Editor,
    settings: &Settings,
    ctx: &mut Context,
    placement: Placement,
) -> Result<Placed> {
    let placed = match placement {
        Placement::Replace => {
            let before_lines = editor.buffer_lines(ctx.buffer)?;

            // Normalize 1-based inclusive selection to 0-based byte span;
            // the end column is clamped inside the buffer.
            let start_line = ctx.start_line.saturating_sub(1);
            let start_col = ctx.start_col.saturating_sub(1);
            let end_line = ctx.end_line.saturating_sub(1);
            let end_col = ctx.end_col;

            editor.with_buffer(ctx.buffer, |buffer| {
                buffer.delete_span(start_line, start_col, end_line, end_col)
            })??;
            editor.set_cursor(ctx.window, ctx.start_line, start_col)?;

            Placed {
                pos: Cursor::new(ctx.start_line, start_col, ctx.buffer),
                before_lines: Some(before_lines),
            }
        }

        Placement::Add => {
            let before_lines = editor.buffer_lines(ctx.buffer)?;
            // Blank line immediately after the selection's end line,
            // clamped to the buffer; the write cursor targets exactly
            // the inserted line.
            let at = editor.with_buffer(ctx.buffer, |buffer| -> sumi_buffer::Result<usize> {
                let at = ctx.end_line.min(buffer.line_count());
                buffer.insert_line(at, "")?;
                Ok(at)
            })??;

            Placed {
                pos: Cursor::new(at + 1, 0, ctx.buffer),
                before_lines: Some(before_lines),
            }
        }

        Placement::Before => {
            let before_lines = editor.buffer_lines(ctx.buffer)?;
            let original_start_line = ctx.start_line;
            let original_start_col = ctx.start_col;

            editor.with_buffer(ctx.buffer, |buffer| {
                // Blank line immediately before the selection's start line.
                buffer.insert_line(original_start_line.saturating_sub(1), "")
            })??;

            // The selection shifted down one line; record that on the
            // context so later consumers see where it actually is.
            ctx.start_line = original_start_line + 1;
            ctx.start_col = original_start_col;

            Placed {
                pos: Cursor::new(
                    original_start_line,
                    original_start_col.saturating_sub(1),
                    ctx.buffer,
                ),
                before_lines: Some(before_lines),
            }
        }

        Placement::New => {
            let buffer = editor.create_buffer(ctx.filetype.clone());
            let window = editor.split(buffer, settings.split.orientation, settings.split.size)?;
            editor.set_current_window(window)?;

            Placed {
                pos: Cursor::new(1, 0, buffer),
                before_lines: None,
            }
        }

        Placement::Chat => {
            return Err(EngineError::InvalidState(
                "chat placement is routed to the conversation handoff, not placed",
            ));
        }
    };

    debug!(%placement, pos = %placed.pos, "placement applied");
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sumi_buffer::{BufferId, BufferKind, SplitOrientation, SplitSize, WindowId};

    fn setup(lines: &[&str]) -> (Editor, BufferId) {
        let editor = Editor::new();
        let buffer = editor.create_buffer_with(
            "rust",
            BufferKind::Normal,
            lines.iter().map(|s| s.to_string()).collect(),
        );
        (editor, buffer)
    }

    fn ctx_for(buffer: BufferId, start: (usize, usize), end: (usize, usize)) -> Context {
        Context::selection(
            buffer,
            WindowId(1),
            start.0,
            start.1,
            end.0,
            end.1,
            "rust",
            Vec::new(),
        )
    }

    #[test]
    fn test_replace_deletes_selection() {
        let (editor, buffer) = setup(&["line one", "old12", "line three"]);
        let mut ctx = ctx_for(buffer, (2, 1), (2, 5));

        let placed = place(&editor, &Settings::new(), &mut ctx, Placement::Replace).unwrap();
        assert_eq!(
            editor.buffer_lines(buffer).unwrap(),
            vec!["line one", "", "line three"]
        );
        assert_eq!(placed.pos, Cursor::new(2, 0, buffer));
        assert_eq!(placed.before_lines.as_ref().unwrap()[1], "old12");
    }

    #[test]
    fn test_replace_clamps_overlong_end_col() {
        let (editor, buffer) = setup(&["short"]);
        let mut ctx = ctx_for(buffer, (1, 1), (1, 500));

        place(&editor, &Settings::new(), &mut ctx, Placement::Replace).unwrap();
        assert_eq!(editor.buffer_lines(buffer).unwrap(), vec![""]);
    }

    #[test]
    fn test_replace_multiline_joins_edges() {
        let (editor, buffer) = setup(&["fn main() {", "    body();", "}"]);
        let mut ctx = ctx_for(buffer, (1, 1), (3, 1));

        let placed = place(&editor, &Settings::new(), &mut ctx, Placement::Replace).unwrap();
        assert_eq!(editor.buffer_lines(buffer).unwrap(), vec![""]);
        assert_eq!(placed.pos, Cursor::new(1, 0, buffer));
    }

    #[test]
    fn test_add_clamps_end_line_past_buffer() {
        let (editor, buffer) = setup(&["a", "b"]);
        let mut ctx = ctx_for(buffer, (1, 1), (5, 1));

        let placed = place(&editor, &Settings::new(), &mut ctx, Placement::Add).unwrap();
        assert_eq!(editor.buffer_lines(buffer).unwrap(), vec!["a", "b", ""]);
        assert_eq!(placed.pos, Cursor::new(3, 0, buffer));

        // The cursor points at a real line, so writing succeeds.
        let mut pos = placed.pos;
        crate::write::write_chunk(&editor, &mut pos, "tail").unwrap();
        assert_eq!(editor.buffer_lines(buffer).unwrap(), vec!["a", "b", "tail"]);
    }

    #[test]
    fn test_add_inserts_blank_line_after() {
        let (editor, buffer) = setup(&["a", "b", "c"]);
        let mut ctx = ctx_for(buffer, (1, 1), (2, 1));

        let placed = place(&editor, &Settings::new(), &mut ctx, Placement::Add).unwrap();
        assert_eq!(editor.buffer_lines(buffer).unwrap(), vec!["a", "b", "", "c"]);
        assert_eq!(placed.pos, Cursor::new(3, 0, buffer));
    }

    #[test]
    fn test_before_inserts_and_adjusts_context() {
        let (editor, buffer) = setup(&["a", "b", "c"]);
        let mut ctx = ctx_for(buffer, (2, 3), (2, 3));

        let placed = place(&editor, &Settings::new(), &mut ctx, Placement::Before).unwrap();
        assert_eq!(editor.buffer_lines(buffer).unwrap(), vec!["a", "", "b", "c"]);
        assert_eq!(placed.pos, Cursor::new(2, 2, buffer));
        assert_eq!(ctx.start_line, 3);
        assert_eq!(ctx.start_col, 3);
    }

    #[test]
    fn test_new_opens_split_with_filetype() {
        let (editor, buffer) = setup(&["existing"]);
        let mut ctx = ctx_for(buffer, (1, 1), (1, 1));
        let settings =
            Settings::new().with_split(SplitOrientation::Horizontal, SplitSize::Fixed(15));

        let placed = place(&editor, &settings, &mut ctx, Placement::New).unwrap();
        assert_ne!(placed.pos.buffer, buffer);
        assert_eq!(placed.pos, Cursor::new(1, 0, placed.pos.buffer));
        assert!(placed.before_lines.is_none());

        let active = editor.current_window().unwrap();
        assert_eq!(editor.window_buffer(active).unwrap(), placed.pos.buffer);
        let filetype = editor
            .with_buffer(placed.pos.buffer, |b| b.filetype().to_string())
            .unwrap();
        assert_eq!(filetype, "rust");
    }

    #[test]
    fn test_chat_never_places() {
        let (editor, buffer) = setup(&["x"]);
        let mut ctx = ctx_for(buffer, (1, 1), (1, 1));
        assert!(place(&editor, &Settings::new(), &mut ctx, Placement::Chat).is_err());
    }
}
