//! Before/after review overlay for reviewable placements.
//!
//! Constructed for `replace`, `add`, and `before` right before streaming
//! begins, from the pre-edit line set the placement engine captured. The
//! overlay computes line-level hunks between the saved lines and the
//! buffer's current content, and exposes the accept/reject/cycle surface
//! that the wired keybindings invoke.
//!
//! The session only depends on the [`DiffReview`] trait; embedders can
//! inject their own reviewer via a [`DiffFactory`] and the built-in
//! [`DiffOverlay`] is the fallback.

use std::sync::Arc;

use similar::{ChangeTag, TextDiff};
use sumi_buffer::{BufferId, Cursor, Editor, WindowId};

use crate::Result;

/// Review surface for one streamed response.
///
/// Everything past construction is opaque to the session: it wires the
/// three operations to keybindings and otherwise never looks inside.
pub trait DiffReview: Send + Sync {
    /// Keep the streamed result.
    fn accept(self: Box<Self>, editor: &Editor);
    /// Restore the pre-edit content, reverting the response as one unit.
    fn reject(self: Box<Self>, editor: &Editor) -> Result<()>;
    /// Move the review cursor to the next changed line.
    fn cycle(&mut self, editor: &Editor) -> Result<()>;
}

/// Builds a reviewer from the placement outcome: target buffer, write
/// cursor, language identifier, pre-edit line set, originating window.
pub type DiffFactory =
    Arc<dyn Fn(BufferId, Cursor, String, Vec<String>, WindowId) -> Box<dyn DiffReview> + Send + Sync>;

/// Kind of change in one diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkKind {
    /// Line present only in the post-edit content.
    Added,
    /// Line present only in the pre-edit content.
    Removed,
}

/// One changed line between the pre-edit and post-edit states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub kind: HunkKind,
    /// 1-based line number in whichever side the line belongs to.
    pub line: usize,
    pub text: String,
}

/// Reviewable before/after visualization for one streamed response.
#[derive(Debug, Clone)]
pub struct DiffOverlay {
    buffer: BufferId,
    window: WindowId,
    filetype: String,
    cursor: Cursor,
    before: Vec<String>,
    next_hunk: usize,
}

impl DiffOverlay {
    /// Capture an overlay over `buffer` with its pre-edit `before` lines.
    pub fn new(
        buffer: BufferId,
        cursor: Cursor,
        filetype: impl Into<String>,
        before: Vec<String>,
        window: WindowId,
    ) -> Self {
        Self {
            buffer,
            window,
            filetype: filetype.into(),
            cursor,
            before,
            next_hunk: 0,
        }
    }

    /// Target buffer.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Originating window.
    pub fn window(&self) -> WindowId {
        self.window
    }

    /// Language identifier for highlighting the visualization.
    pub fn filetype(&self) -> &str {
        &self.filetype
    }

    /// Cursor position at construction time.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// The saved pre-edit line set.
    pub fn before_lines(&self) -> &[String] {
        &self.before
    }

    /// Line-level hunks between the saved lines and the buffer's current
    /// content.
    pub fn hunks(&self, editor: &Editor) -> Result<Vec<DiffHunk>> {
        let after = editor.buffer_lines(self.buffer)?;
        let old = self.before.join("\n");
        let new = after.join("\n");
        let diff = TextDiff::from_lines(&old, &new);

        let mut hunks = Vec::new();
        for change in diff.iter_all_changes() {
            let text = change.value().trim_end_matches('\n').to_string();
            match change.tag() {
                ChangeTag::Insert => hunks.push(DiffHunk {
                    kind: HunkKind::Added,
                    line: change.new_index().unwrap_or(0) + 1,
                    text,
                }),
                ChangeTag::Delete => hunks.push(DiffHunk {
                    kind: HunkKind::Removed,
                    line: change.old_index().unwrap_or(0) + 1,
                    text,
                }),
                ChangeTag::Equal => {}
            }
        }
        Ok(hunks)
    }

    /// Keep the streamed result; the saved lines are dropped.
    pub fn accept(self, _editor: &Editor) {
        tracing::debug!(buffer = %self.buffer, "diff accepted");
    }

    /// Restore the pre-edit lines, reverting the whole response as one
    /// unit.
    pub fn reject(self, editor: &Editor) -> Result<()> {
        tracing::debug!(buffer = %self.buffer, "diff rejected, restoring pre-edit lines");
        editor.set_buffer_lines(self.buffer, self.before)?;
        Ok(())
    }

    /// Jump the originating window's cursor to the next added line,
    /// wrapping around. A no-op when nothing was added.
    pub fn cycle(&mut self, editor: &Editor) -> Result<()> {
        let added: Vec<usize> = self
            .hunks(editor)?
            .into_iter()
            .filter(|h| h.kind == HunkKind::Added)
            .map(|h| h.line)
            .collect();
        if added.is_empty() {
            return Ok(());
        }
        let line = added[self.next_hunk % added.len()];
        self.next_hunk = (self.next_hunk + 1) % added.len();
        editor.set_cursor(self.window, line, 0)?;
        Ok(())
    }
}

impl DiffReview for DiffOverlay {
    fn accept(self: Box<Self>, editor: &Editor) {
        DiffOverlay::accept(*self, editor);
    }

    fn reject(self: Box<Self>, editor: &Editor) -> Result<()> {
        DiffOverlay::reject(*self, editor)
    }

    fn cycle(&mut self, editor: &Editor) -> Result<()> {
        DiffOverlay::cycle(self, editor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sumi_buffer::BufferKind;

    fn setup(before: &[&str], after: &[&str]) -> (Editor, DiffOverlay) {
        let editor = Editor::new();
        let buffer = editor.create_buffer_with(
            "rust",
            BufferKind::Normal,
            after.iter().map(|s| s.to_string()).collect(),
        );
        let overlay = DiffOverlay::new(
            buffer,
            Cursor::new(1, 0, buffer),
            "rust",
            before.iter().map(|s| s.to_string()).collect(),
            WindowId(1),
        );
        (editor, overlay)
    }

    #[test]
    fn test_hunks_mark_changed_lines() {
        let (editor, overlay) = setup(&["keep", "old"], &["keep", "new", "extra"]);
        let hunks = overlay.hunks(&editor).unwrap();

        assert!(hunks.contains(&DiffHunk {
            kind: HunkKind::Removed,
            line: 2,
            text: "old".into()
        }));
        assert!(hunks.contains(&DiffHunk {
            kind: HunkKind::Added,
            line: 2,
            text: "new".into()
        }));
        assert!(hunks.iter().any(|h| h.kind == HunkKind::Added && h.text == "extra"));
    }

    #[test]
    fn test_no_hunks_when_identical() {
        let (editor, overlay) = setup(&["same"], &["same"]);
        assert!(overlay.hunks(&editor).unwrap().is_empty());
    }

    #[test]
    fn test_reject_restores_before_lines() {
        let (editor, overlay) = setup(&["original"], &["mutated", "badly"]);
        let buffer = overlay.buffer();

        overlay.reject(&editor).unwrap();
        assert_eq!(editor.buffer_lines(buffer).unwrap(), vec!["original"]);
    }

    #[test]
    fn test_accept_keeps_current_content() {
        let (editor, overlay) = setup(&["original"], &["streamed"]);
        let buffer = overlay.buffer();

        overlay.accept(&editor);
        assert_eq!(editor.buffer_lines(buffer).unwrap(), vec!["streamed"]);
    }

    #[test]
    fn test_cycle_steps_through_added_lines() {
        let (editor, mut overlay) = setup(&["keep", "old"], &["keep", "new", "extra"]);
        let window = overlay.window();

        overlay.cycle(&editor).unwrap();
        assert_eq!(editor.cursor(window).unwrap(), (2, 0));
        overlay.cycle(&editor).unwrap();
        assert_eq!(editor.cursor(window).unwrap(), (3, 0));
        // Wraps around.
        overlay.cycle(&editor).unwrap();
        assert_eq!(editor.cursor(window).unwrap(), (2, 0));
    }

    #[test]
    fn test_cycle_without_additions_is_noop() {
        let (editor, mut overlay) = setup(&["same"], &["same"]);
        let window = overlay.window();
        let before = editor.cursor(window).unwrap();

        overlay.cycle(&editor).unwrap();
        assert_eq!(editor.cursor(window).unwrap(), before);
    }
}
