//! Model adapter seam and streaming transport types.
//!
//! The engine never speaks a vendor wire protocol itself. An [`Adapter`]
//! maps engine messages to transport-ready ones, opens a streaming
//! request, and knows how to pull display text out of a raw chunk.
//! Everything downstream of the adapter works on [`StreamEvent`]s
//! delivered over an mpsc channel; the end of the stream is the channel
//! closing, so the "done" continuation always fires — including after a
//! cooperative shutdown.

mod scripted;

pub use scripted::{ScriptedAdapter, ScriptedResponse};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Role of a message in a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction to the model.
    System,
    /// Human-authored content.
    User,
    /// Model-authored content.
    Llm,
}

/// Per-message options: a filtering tag and a visibility flag.
///
/// `tag` is only used for later filtering (e.g. stripping the `visual`
/// code-context message before a chat handoff); `visible` marks whether
/// the message should survive into a user-facing conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl Default for MessageOpts {
    fn default() -> Self {
        Self {
            tag: None,
            visible: true,
        }
    }
}

/// A prompt message. Ordering within a prompt is significant and
/// preserved end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub opts: MessageOpts,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            opts: MessageOpts::default(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            opts: MessageOpts::default(),
        }
    }

    /// Create a model-authored message.
    pub fn llm(content: impl Into<String>) -> Self {
        Self {
            role: Role::Llm,
            content: content.into(),
            opts: MessageOpts::default(),
        }
    }

    /// Attach a filtering tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.opts.tag = Some(tag.into());
        self
    }

    /// Mark the message as invisible to user-facing conversations.
    pub fn invisible(mut self) -> Self {
        self.opts.visible = false;
        self
    }
}

/// A message after role mapping, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

/// One delivery from a streaming request.
///
/// Raw chunks are opaque to the engine; [`Adapter::chunk_to_text`]
/// extracts display text (or `None` for non-text chunks). Errors are
/// per-chunk: the engine logs them and keeps consuming.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A raw chunk from the transport.
    Chunk(serde_json::Value),
    /// A transport error for this delivery.
    Error(String),
}

/// Cancellable handle to one in-flight streaming request.
///
/// At most one is live per session. [`RequestHandle::shutdown`] signals
/// the transport to stop emitting; chunks already scheduled may still be
/// sitting in the channel but are never surfaced afterwards.
pub struct RequestHandle {
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl RequestHandle {
    /// Build a handle from a receiving channel and its cancellation token.
    pub fn new(events: mpsc::Receiver<StreamEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Next event, or `None` once the stream is finished or shut down.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Cooperatively stop the request. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// A clone of the cancellation token, for out-of-band shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// A model connector.
///
/// Implementations own the vendor protocol end to end; the engine only
/// needs role mapping, request parameters, chunk-to-text extraction, and
/// a way to open a cancellable stream.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapter identity, used for override matching and logging.
    fn name(&self) -> &str;

    /// Map engine messages to transport-ready messages.
    ///
    /// The default maps `Llm` to the conventional `assistant` role.
    fn map_roles(&self, messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::System => "system".to_string(),
                    Role::User => "user".to_string(),
                    Role::Llm => "assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    /// Transport configuration derived from the adapter's schema
    /// (model name, temperature, and similar knobs).
    fn request_params(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    /// Extract display text from a raw chunk, or `None` for chunks that
    /// carry no text (keepalives, metadata frames).
    fn chunk_to_text(&self, chunk: &serde_json::Value) -> Option<String>;

    /// Open a streaming request. The returned handle is the only way to
    /// consume or cancel the stream.
    async fn request(
        &self,
        messages: Vec<WireMessage>,
        params: serde_json::Value,
    ) -> Result<RequestHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let m = Message::user("hi");
        assert_eq!(m.role, Role::User);
        assert!(m.opts.visible);
        assert!(m.opts.tag.is_none());

        let m = Message::system("rules").with_tag("system_tag").invisible();
        assert_eq!(m.opts.tag.as_deref(), Some("system_tag"));
        assert!(!m.opts.visible);
    }

    #[test]
    fn test_default_role_mapping() {
        struct Nop;
        #[async_trait]
        impl Adapter for Nop {
            fn name(&self) -> &str {
                "nop"
            }
            fn chunk_to_text(&self, _chunk: &serde_json::Value) -> Option<String> {
                None
            }
            async fn request(
                &self,
                _messages: Vec<WireMessage>,
                _params: serde_json::Value,
            ) -> crate::Result<RequestHandle> {
                let (_tx, rx) = mpsc::channel(1);
                Ok(RequestHandle::new(rx, CancellationToken::new()))
            }
        }

        let wire = Nop.map_roles(&[
            Message::system("s"),
            Message::user("u"),
            Message::llm("a"),
        ]);
        let roles: Vec<&str> = wire.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant"]);
    }

    #[tokio::test]
    async fn test_handle_shutdown_suppresses_buffered_chunks() {
        let (tx, rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let mut handle = RequestHandle::new(rx, token);

        tx.send(StreamEvent::Chunk(serde_json::json!({"delta": "x"})))
            .await
            .unwrap();
        handle.shutdown();
        assert!(handle.next().await.is_none());
    }
}
