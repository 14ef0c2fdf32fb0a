//! Line-addressed text buffer.
//!
//! A [`Buffer`] is a plain `Vec<String>` of lines plus metadata. The API
//! is 0-indexed; the engine's user-facing coordinates (1-based lines,
//! inclusive columns) are normalized before they reach this type.
//!
//! Column arguments are byte offsets and are clamped to the line, and to
//! the nearest character boundary below, rather than raised as errors —
//! streamed output regularly targets the moving end of a line.

use serde::{Deserialize, Serialize};

use crate::{BufferError, BufferId, Result};

/// What kind of document a buffer holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    /// A regular editable document.
    #[default]
    Normal,
    /// Terminal-like scrollback; selections here are advisory only.
    Terminal,
}

/// A single text buffer: ordered lines plus metadata.
#[derive(Debug, Clone)]
pub struct Buffer {
    id: BufferId,
    filetype: String,
    kind: BufferKind,
    lines: Vec<String>,
}

impl Buffer {
    /// Create an empty buffer (one empty line, like a fresh editor buffer).
    pub fn new(id: BufferId, filetype: impl Into<String>, kind: BufferKind) -> Self {
        Self {
            id,
            filetype: filetype.into(),
            kind,
            lines: vec![String::new()],
        }
    }

    /// Create a buffer with initial content.
    pub fn from_lines(
        id: BufferId,
        filetype: impl Into<String>,
        kind: BufferKind,
        lines: Vec<String>,
    ) -> Self {
        let lines = if lines.is_empty() {
            vec![String::new()]
        } else {
            lines
        };
        Self {
            id,
            filetype: filetype.into(),
            kind,
            lines,
        }
    }

    /// Buffer identifier.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Language identifier (filetype) of the buffer.
    pub fn filetype(&self) -> &str {
        &self.filetype
    }

    /// Set the language identifier.
    pub fn set_filetype(&mut self, filetype: impl Into<String>) {
        self.filetype = filetype.into();
    }

    /// Document kind.
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Number of lines. Never zero.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// All lines, in order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// A single line by 0-based index.
    pub fn line(&self, index: usize) -> Result<&str> {
        self.lines
            .get(index)
            .map(String::as_str)
            .ok_or(BufferError::LineOutOfRange {
                buffer: self.id,
                line: index,
                len: self.lines.len(),
            })
    }

    /// Replace the entire line set.
    pub fn set_lines(&mut self, lines: Vec<String>) {
        self.lines = if lines.is_empty() {
            vec![String::new()]
        } else {
            lines
        };
    }

    /// Insert a line at 0-based `index` (`index == line_count()` appends).
    pub fn insert_line(&mut self, index: usize, text: impl Into<String>) -> Result<()> {
        if index > self.lines.len() {
            return Err(BufferError::LineOutOfRange {
                buffer: self.id,
                line: index,
                len: self.lines.len(),
            });
        }
        self.lines.insert(index, text.into());
        Ok(())
    }

    /// Replace line `index` wholesale.
    pub fn replace_line(&mut self, index: usize, text: impl Into<String>) -> Result<()> {
        let len = self.lines.len();
        let line = self
            .lines
            .get_mut(index)
            .ok_or(BufferError::LineOutOfRange {
                buffer: self.id,
                line: index,
                len,
            })?;
        *line = text.into();
        Ok(())
    }

    /// Remove lines in the half-open 0-based range `start..end`.
    ///
    /// An empty buffer is never produced: removing every line leaves one
    /// empty line behind.
    pub fn remove_lines(&mut self, start: usize, end: usize) -> Result<()> {
        if start > end || end > self.lines.len() {
            return Err(BufferError::LineOutOfRange {
                buffer: self.id,
                line: end,
                len: self.lines.len(),
            });
        }
        self.lines.drain(start..end);
        if self.lines.is_empty() {
            self.lines.push(String::new());
        }
        Ok(())
    }

    /// Insert `text` (no newlines) into line `index` at byte column `col`.
    ///
    /// `col` is clamped to the line length and snapped down to a character
    /// boundary. Returns the column where the insertion actually happened.
    pub fn insert_text(&mut self, index: usize, col: usize, text: &str) -> Result<usize> {
        let len = self.lines.len();
        let line = self
            .lines
            .get_mut(index)
            .ok_or(BufferError::LineOutOfRange {
                buffer: self.id,
                line: index,
                len,
            })?;
        let col = snap_col(line, col);
        line.insert_str(col, text);
        Ok(col)
    }

    /// Delete the span from `(start_line, start_col)` to
    /// `(end_line, end_col)`, all 0-based, `end_col` exclusive bytes.
    ///
    /// The prefix of the start line and the suffix of the end line are
    /// joined into one line. Columns are clamped to their lines.
    pub fn delete_span(
        &mut self,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Result<()> {
        if end_line >= self.lines.len() || start_line > end_line {
            return Err(BufferError::LineOutOfRange {
                buffer: self.id,
                line: end_line,
                len: self.lines.len(),
            });
        }
        let start_col = snap_col(&self.lines[start_line], start_col);
        let end_col = snap_col(&self.lines[end_line], end_col);

        let prefix = self.lines[start_line][..start_col].to_string();
        let suffix = self.lines[end_line][end_col..].to_string();
        self.lines[start_line] = prefix + &suffix;
        if end_line > start_line {
            self.lines.drain(start_line + 1..=end_line);
        }
        Ok(())
    }
}

/// Clamp a byte column to the line and snap down to a char boundary.
fn snap_col(line: &str, col: usize) -> usize {
    let mut col = col.min(line.len());
    while col > 0 && !line.is_char_boundary(col) {
        col -= 1;
    }
    col
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(lines: &[&str]) -> Buffer {
        Buffer::from_lines(
            BufferId(1),
            "text",
            BufferKind::Normal,
            lines.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_new_buffer_has_one_empty_line() {
        let b = Buffer::new(BufferId(1), "rust", BufferKind::Normal);
        assert_eq!(b.line_count(), 1);
        assert_eq!(b.line(0).unwrap(), "");
    }

    #[test]
    fn test_insert_and_remove_lines() {
        let mut b = buf(&["one", "three"]);
        b.insert_line(1, "two").unwrap();
        assert_eq!(b.lines(), &["one", "two", "three"]);

        b.remove_lines(0, 2).unwrap();
        assert_eq!(b.lines(), &["three"]);

        // Removing everything leaves one empty line
        b.remove_lines(0, 1).unwrap();
        assert_eq!(b.lines(), &[""]);
    }

    #[test]
    fn test_insert_line_out_of_range() {
        let mut b = buf(&["only"]);
        assert!(b.insert_line(5, "nope").is_err());
    }

    #[test]
    fn test_insert_text_mid_line() {
        let mut b = buf(&["held"]);
        let col = b.insert_text(0, 3, "lo wor").unwrap();
        assert_eq!(col, 3);
        assert_eq!(b.line(0).unwrap(), "hello word");
    }

    #[test]
    fn test_insert_text_clamps_column() {
        let mut b = buf(&["ab"]);
        let col = b.insert_text(0, 99, "c").unwrap();
        assert_eq!(col, 2);
        assert_eq!(b.line(0).unwrap(), "abc");
    }

    #[test]
    fn test_insert_text_snaps_to_char_boundary() {
        let mut b = buf(&["héllo"]);
        // byte 2 falls inside 'é'; snaps down to 1
        let col = b.insert_text(0, 2, "x").unwrap();
        assert_eq!(col, 1);
        assert_eq!(b.line(0).unwrap(), "hxéllo");
    }

    #[test]
    fn test_delete_span_single_line() {
        let mut b = buf(&["old12"]);
        b.delete_span(0, 0, 0, 5).unwrap();
        assert_eq!(b.line(0).unwrap(), "");
    }

    #[test]
    fn test_delete_span_multi_line() {
        let mut b = buf(&["keep-start", "middle", "end-keep"]);
        b.delete_span(0, 4, 2, 3).unwrap();
        assert_eq!(b.lines(), &["keep-keep"]);
    }

    #[test]
    fn test_delete_span_clamps_end_col() {
        let mut b = buf(&["short"]);
        b.delete_span(0, 0, 0, 500).unwrap();
        assert_eq!(b.line(0).unwrap(), "");
    }

    #[test]
    fn test_delete_span_bad_line() {
        let mut b = buf(&["one"]);
        assert!(b.delete_span(0, 0, 4, 0).is_err());
    }

    #[test]
    fn test_random_edits_keep_invariants() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut b = buf(&["héllo wörld", "second", ""]);

        for _ in 0..2000 {
            let lines = b.line_count();
            match rng.gen_range(0..4) {
                0 => {
                    let _ = b.insert_text(rng.gen_range(0..lines), rng.gen_range(0..24), "ab");
                }
                1 => {
                    let _ = b.insert_line(rng.gen_range(0..=lines), "é");
                }
                2 => {
                    let start = rng.gen_range(0..lines);
                    let _ = b.remove_lines(start, (start + rng.gen_range(0..=2)).min(lines));
                }
                _ => {
                    let line = rng.gen_range(0..lines);
                    let _ = b.delete_span(line, rng.gen_range(0..24), line, rng.gen_range(0..24));
                }
            }
            // No panic from a mid-char slice, and never an empty buffer.
            assert!(b.line_count() >= 1);
        }
    }
}
