//! # sumi-engine
//!
//! Inline-assist execution engine. Given a selection (or cursor) in a
//! live buffer and a natural-language instruction, the engine:
//!
//! 1. asks the model *where* the output should land (classification),
//! 2. mutates the document for the chosen placement and computes a
//!    write cursor,
//! 3. streams the model's response chunk by chunk into that cursor,
//!    optionally under a reviewable diff overlay, until the stream ends
//!    or the session is cancelled.
//!
//! The five placements:
//!
//! - `replace` — delete the selection, stream into its place
//! - `add` — stream onto a fresh blank line after the selection
//! - `before` — stream onto a fresh blank line before the selection
//! - `new` — stream into a brand-new buffer opened in a split
//! - `chat` — no buffer mutation; hand the prompt to a conversation
//!
//! One [`Session`](session::Session) owns a region from start to
//! finish. Two streaming round trips happen per session (classify, then
//! submit), never concurrently, and cancellation is cooperative via the
//! request handle's shutdown.

pub mod chat;
pub mod classify;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod llm;
pub mod place;
pub mod prompt;
pub mod session;
pub mod write;

pub use chat::Chat;
pub use classify::{ClassifyError, Placement, extract_tag};
pub use config::{Settings, SplitSettings};
pub use context::Context;
pub use diff::{DiffFactory, DiffHunk, DiffOverlay, DiffReview, HunkKind};
pub use error::EngineError;
pub use llm::{
    Adapter, Message, MessageOpts, RequestHandle, Role, ScriptedAdapter, ScriptedResponse,
    StreamEvent, WireMessage,
};
pub use place::{Placed, place};
pub use prompt::{Template, TemplateContent, assemble};
pub use session::{Session, SessionEvent, SessionOpts, SessionOutcome, SessionParams, SessionState};
pub use sumi_buffer::{Buffer, BufferId, BufferKind, Cursor, Editor, WindowId};
pub use write::{follow_cursor, write_chunk};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
