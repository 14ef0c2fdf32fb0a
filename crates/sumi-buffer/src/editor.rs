//! The shared editor handle: buffers, windows, keymaps, event groups.
//!
//! [`Editor`] is cheap to clone and safe to share across tasks. Every
//! mutation takes one internal lock, so changes from concurrent stream
//! callbacks are applied in a strict serial order — this lock is the
//! single mutation-serializing execution context the engine relies on.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::{Buffer, BufferError, BufferId, BufferKind, Cursor, Result, WindowId};

/// Direction a new split opens in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitOrientation {
    /// Side-by-side split.
    #[default]
    Vertical,
    /// Stacked split.
    Horizontal,
}

/// Size of a new split: absolute cells or a fraction of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SplitSize {
    /// Fixed number of rows/columns.
    Fixed(u16),
    /// Fraction of the current viewport (0.0..=1.0).
    Ratio(f32),
}

impl Default for SplitSize {
    fn default() -> Self {
        SplitSize::Ratio(0.5)
    }
}

/// A window: one view onto a buffer, with its own cursor.
#[derive(Debug, Clone)]
struct Window {
    buffer: BufferId,
    cursor: (usize, usize),
    #[allow(dead_code)]
    orientation: SplitOrientation,
    #[allow(dead_code)]
    size: SplitSize,
}

/// A buffer-scoped key binding.
struct KeymapEntry {
    group: Option<String>,
    desc: String,
    action: Arc<dyn Fn() + Send + Sync>,
}

impl std::fmt::Debug for KeymapEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeymapEntry")
            .field("group", &self.group)
            .field("desc", &self.desc)
            .finish()
    }
}

#[derive(Default)]
struct EditorState {
    buffers: HashMap<BufferId, Buffer>,
    windows: HashMap<WindowId, Window>,
    current_window: Option<WindowId>,
    keymaps: HashMap<(BufferId, String), KeymapEntry>,
    next_buffer: u32,
    next_window: u32,
    last_response: Option<String>,
}

/// Shared, clonable editor handle.
///
/// The first buffer/window pair is created on [`Editor::new`] so there
/// is always a current window.
#[derive(Clone)]
pub struct Editor {
    state: Arc<Mutex<EditorState>>,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Editor")
            .field("buffers", &state.buffers.len())
            .field("windows", &state.windows.len())
            .field("current_window", &state.current_window)
            .finish()
    }
}

impl Editor {
    /// Create an editor with one empty buffer shown in one window.
    pub fn new() -> Self {
        let editor = Self {
            state: Arc::new(Mutex::new(EditorState::default())),
        };
        let buf = editor.create_buffer("");
        {
            let mut state = editor.state.lock();
            let win = WindowId(1);
            state.next_window = 2;
            state.windows.insert(
                win,
                Window {
                    buffer: buf,
                    cursor: (1, 0),
                    orientation: SplitOrientation::default(),
                    size: SplitSize::default(),
                },
            );
            state.current_window = Some(win);
        }
        editor
    }

    // ── Buffers ──────────────────────────────────────────────────────────

    /// Create a new empty buffer with the given filetype.
    pub fn create_buffer(&self, filetype: impl Into<String>) -> BufferId {
        let mut state = self.state.lock();
        state.next_buffer += 1;
        let id = BufferId(state.next_buffer);
        state
            .buffers
            .insert(id, Buffer::new(id, filetype, BufferKind::Normal));
        id
    }

    /// Create a buffer with initial content.
    pub fn create_buffer_with(
        &self,
        filetype: impl Into<String>,
        kind: BufferKind,
        lines: Vec<String>,
    ) -> BufferId {
        let mut state = self.state.lock();
        state.next_buffer += 1;
        let id = BufferId(state.next_buffer);
        state
            .buffers
            .insert(id, Buffer::from_lines(id, filetype, kind, lines));
        id
    }

    /// Run `f` with mutable access to a buffer, under the editor lock.
    pub fn with_buffer<T>(&self, id: BufferId, f: impl FnOnce(&mut Buffer) -> T) -> Result<T> {
        let mut state = self.state.lock();
        let buffer = state
            .buffers
            .get_mut(&id)
            .ok_or(BufferError::UnknownBuffer(id))?;
        Ok(f(buffer))
    }

    /// Full line set of a buffer.
    pub fn buffer_lines(&self, id: BufferId) -> Result<Vec<String>> {
        self.with_buffer(id, |b| b.lines().to_vec())
    }

    /// Replace a buffer's entire content.
    pub fn set_buffer_lines(&self, id: BufferId, lines: Vec<String>) -> Result<()> {
        self.with_buffer(id, |b| b.set_lines(lines))
    }

    // ── Windows ──────────────────────────────────────────────────────────

    /// Open a new split showing `buffer` and return its window.
    pub fn split(
        &self,
        buffer: BufferId,
        orientation: SplitOrientation,
        size: SplitSize,
    ) -> Result<WindowId> {
        let mut state = self.state.lock();
        if !state.buffers.contains_key(&buffer) {
            return Err(BufferError::UnknownBuffer(buffer));
        }
        let id = WindowId(state.next_window);
        state.next_window += 1;
        state.windows.insert(
            id,
            Window {
                buffer,
                cursor: (1, 0),
                orientation,
                size,
            },
        );
        Ok(id)
    }

    /// The buffer a window is showing.
    pub fn window_buffer(&self, window: WindowId) -> Result<BufferId> {
        let state = self.state.lock();
        state
            .windows
            .get(&window)
            .map(|w| w.buffer)
            .ok_or(BufferError::UnknownWindow(window))
    }

    /// Make `window` the active view.
    pub fn set_current_window(&self, window: WindowId) -> Result<()> {
        let mut state = self.state.lock();
        if !state.windows.contains_key(&window) {
            return Err(BufferError::UnknownWindow(window));
        }
        state.current_window = Some(window);
        Ok(())
    }

    /// The currently active window.
    pub fn current_window(&self) -> Option<WindowId> {
        self.state.lock().current_window
    }

    /// Place a window's cursor (1-based line, 0-based byte col).
    pub fn set_cursor(&self, window: WindowId, line: usize, col: usize) -> Result<()> {
        let mut state = self.state.lock();
        let win = state
            .windows
            .get_mut(&window)
            .ok_or(BufferError::UnknownWindow(window))?;
        win.cursor = (line, col);
        Ok(())
    }

    /// A window's cursor position.
    pub fn cursor(&self, window: WindowId) -> Result<(usize, usize)> {
        let state = self.state.lock();
        state
            .windows
            .get(&window)
            .map(|w| w.cursor)
            .ok_or(BufferError::UnknownWindow(window))
    }

    /// Cursor of the active window as a [`Cursor`], if any window is active.
    pub fn current_cursor(&self) -> Option<Cursor> {
        let state = self.state.lock();
        let win = state.current_window?;
        let window = state.windows.get(&win)?;
        Some(Cursor::new(window.cursor.0, window.cursor.1, window.buffer))
    }

    // ── Keymaps ──────────────────────────────────────────────────────────

    /// Register a buffer-scoped key binding.
    ///
    /// `group` scopes the binding for bulk removal via [`Editor::clear_group`].
    pub fn register_keymap(
        &self,
        buffer: BufferId,
        lhs: impl Into<String>,
        desc: impl Into<String>,
        group: Option<String>,
        action: Arc<dyn Fn() + Send + Sync>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !state.buffers.contains_key(&buffer) {
            return Err(BufferError::UnknownBuffer(buffer));
        }
        state.keymaps.insert(
            (buffer, lhs.into()),
            KeymapEntry {
                group,
                desc: desc.into(),
                action,
            },
        );
        Ok(())
    }

    /// Remove one binding. Removing a binding that is already gone is not
    /// an error; cleanup paths run unconditionally.
    pub fn remove_keymap(&self, buffer: BufferId, lhs: &str) {
        self.state.lock().keymaps.remove(&(buffer, lhs.to_string()));
    }

    /// Whether a binding exists.
    pub fn has_keymap(&self, buffer: BufferId, lhs: &str) -> bool {
        self.state
            .lock()
            .keymaps
            .contains_key(&(buffer, lhs.to_string()))
    }

    /// Trigger a binding, as if the key was pressed in that buffer.
    pub fn feed(&self, buffer: BufferId, lhs: &str) -> Result<()> {
        let action = {
            let state = self.state.lock();
            state
                .keymaps
                .get(&(buffer, lhs.to_string()))
                .map(|entry| Arc::clone(&entry.action))
                .ok_or(BufferError::UnknownKeymap {
                    buffer,
                    lhs: lhs.to_string(),
                })?
        };
        // Run outside the lock: actions may re-enter the editor.
        action();
        Ok(())
    }

    /// Remove every binding registered under `group`.
    pub fn clear_group(&self, group: &str) {
        let mut state = self.state.lock();
        let before = state.keymaps.len();
        state
            .keymaps
            .retain(|_, entry| entry.group.as_deref() != Some(group));
        tracing::debug!(group, removed = before - state.keymaps.len(), "cleared keymap group");
    }

    /// Number of bindings registered under `group`.
    pub fn group_len(&self, group: &str) -> usize {
        self.state
            .lock()
            .keymaps
            .values()
            .filter(|entry| entry.group.as_deref() == Some(group))
            .count()
    }

    // ── Last response ────────────────────────────────────────────────────

    /// Store the most recent complete model response.
    pub fn set_last_response(&self, response: impl Into<String>) {
        self.state.lock().last_response = Some(response.into());
    }

    /// The most recent complete model response, if any.
    pub fn last_response(&self) -> Option<String> {
        self.state.lock().last_response.clone()
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_editor_has_window() {
        let editor = Editor::new();
        let win = editor.current_window().unwrap();
        let buf = editor.window_buffer(win).unwrap();
        assert_eq!(editor.buffer_lines(buf).unwrap(), vec![String::new()]);
    }

    #[test]
    fn test_split_and_activate() {
        let editor = Editor::new();
        let buf = editor.create_buffer("rust");
        let win = editor
            .split(buf, SplitOrientation::Vertical, SplitSize::Fixed(80))
            .unwrap();
        editor.set_current_window(win).unwrap();
        assert_eq!(editor.current_window(), Some(win));
        assert_eq!(editor.window_buffer(win).unwrap(), buf);
    }

    #[test]
    fn test_split_unknown_buffer() {
        let editor = Editor::new();
        let err = editor.split(BufferId(999), SplitOrientation::Vertical, SplitSize::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_keymap_roundtrip() {
        let editor = Editor::new();
        let buf = editor.create_buffer("");
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);

        editor
            .register_keymap(
                buf,
                "q",
                "test binding",
                Some("grp".into()),
                Arc::new(move || {
                    hits2.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        editor.feed(buf, "q").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        editor.clear_group("grp");
        assert!(!editor.has_keymap(buf, "q"));
        assert!(editor.feed(buf, "q").is_err());
    }

    #[test]
    fn test_group_scoped_removal_leaves_others() {
        let editor = Editor::new();
        let buf = editor.create_buffer("");
        let noop: Arc<dyn Fn() + Send + Sync> = Arc::new(|| {});
        editor
            .register_keymap(buf, "a", "", Some("one".into()), Arc::clone(&noop))
            .unwrap();
        editor
            .register_keymap(buf, "b", "", Some("two".into()), noop)
            .unwrap();

        editor.clear_group("one");
        assert!(!editor.has_keymap(buf, "a"));
        assert!(editor.has_keymap(buf, "b"));
    }

    #[test]
    fn test_last_response() {
        let editor = Editor::new();
        assert!(editor.last_response().is_none());
        editor.set_last_response("fn main() {}");
        assert_eq!(editor.last_response().unwrap(), "fn main() {}");
    }
}
