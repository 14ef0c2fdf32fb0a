//! Conversation handoff target for the `chat` placement.
//!
//! When classification decides the instruction is a discussion rather
//! than an edit, the session hands its message list to a [`Chat`]. The
//! chat owns the messages from then on; with `auto_submit` it
//! immediately issues its own first streaming request and appends the
//! reply, so the user sees an answer without re-sending.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::context::Context;
use crate::llm::{Adapter, Message, StreamEvent};
use crate::Result;

/// A conversation seeded from an inline session.
pub struct Chat {
    context: Context,
    adapter: Arc<dyn Adapter>,
    messages: Mutex<Vec<Message>>,
    auto_submit: bool,
}

impl std::fmt::Debug for Chat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chat")
            .field("adapter", &self.adapter.name())
            .field("messages", &self.messages.lock().len())
            .field("auto_submit", &self.auto_submit)
            .finish()
    }
}

impl Chat {
    /// Create a conversation with an initial message set.
    pub fn new(
        context: Context,
        adapter: Arc<dyn Adapter>,
        messages: Vec<Message>,
        auto_submit: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            context,
            adapter,
            messages: Mutex::new(messages),
            auto_submit,
        })
    }

    /// The originating invocation context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Whether the conversation submits its first request on its own.
    pub fn auto_submit(&self) -> bool {
        self.auto_submit
    }

    /// The ordered message list.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Issue one streaming request over the current messages and append
    /// the accumulated reply as a model message.
    pub async fn submit(&self) -> Result<()> {
        let messages = self.messages();
        let wire = self.adapter.map_roles(&messages);
        let mut handle = self
            .adapter
            .request(wire, self.adapter.request_params())
            .await?;

        let mut reply = String::new();
        while let Some(event) = handle.next().await {
            match event {
                StreamEvent::Chunk(chunk) => {
                    if let Some(text) = self.adapter.chunk_to_text(&chunk) {
                        reply.push_str(&text);
                    }
                }
                StreamEvent::Error(message) => {
                    warn!(adapter = self.adapter.name(), %message, "chat chunk error");
                }
            }
        }

        self.messages.lock().push(Message::llm(reply));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ScriptedAdapter, ScriptedResponse};
    use sumi_buffer::{BufferId, WindowId};

    fn ctx() -> Context {
        Context::at_cursor(BufferId(1), WindowId(1), 1, 1, "rust")
    }

    #[tokio::test]
    async fn test_submit_appends_reply() {
        let adapter = ScriptedAdapter::new([ScriptedResponse::chunks(["It ", "allocates."])]);
        let chat = Chat::new(
            ctx(),
            adapter.clone(),
            vec![Message::user("why does this allocate?")],
            true,
        );

        chat.submit().await.unwrap();
        let messages = chat.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, crate::Role::Llm);
        assert_eq!(messages[1].content, "It allocates.");
    }

    #[tokio::test]
    async fn test_messages_preserve_order() {
        let adapter = ScriptedAdapter::new([]);
        let chat = Chat::new(
            ctx(),
            adapter,
            vec![Message::system("a"), Message::user("b")],
            false,
        );
        let roles: Vec<_> = chat.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![crate::Role::System, crate::Role::User]);
    }
}
