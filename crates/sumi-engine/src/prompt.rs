//! Prompt assembly: templates in, ordered messages out.
//!
//! A session is started with an ordered template list. Assembly walks
//! the list once, skipping templates whose conditions fail or whose code
//! content is forbidden by configuration, rendering dynamic content
//! against the [`Context`], and finally appending the fenced selection
//! as a `visual`-tagged user message when a range selection is present.
//!
//! Assembly is deterministic and side-effect-free: it reads the template
//! list and the context, nothing else.

use std::sync::Arc;

use crate::context::Context;
use crate::llm::{Message, MessageOpts, Role};

/// Renders template content from the invocation context.
pub type ContentFn = Arc<dyn Fn(&Context) -> String + Send + Sync>;

/// Predicate over the invocation context.
pub type ConditionFn = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Template content: fixed text or a function of the context.
#[derive(Clone)]
pub enum TemplateContent {
    /// A static string, emitted as-is.
    Text(String),
    /// Rendered against the context at assembly time.
    Render(ContentFn),
}

impl std::fmt::Debug for TemplateContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Render(_) => f.write_str("Render(..)"),
        }
    }
}

/// One prompt template.
///
/// Templates are plain values; cloning a template list gives the session
/// its own copy, so nothing the session does during assembly can reach
/// back into the caller's list.
#[derive(Clone)]
pub struct Template {
    pub role: Role,
    pub content: TemplateContent,
    /// Skip the template unless this predicate holds.
    pub condition: Option<ConditionFn>,
    /// The template may emit code from the document; skipped entirely
    /// when configuration forbids sending code.
    pub contains_code: bool,
    pub opts: MessageOpts,
}

impl Template {
    /// A static-text template.
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: TemplateContent::Text(content.into()),
            condition: None,
            contains_code: false,
            opts: MessageOpts::default(),
        }
    }

    /// A template rendered from the context.
    pub fn render(role: Role, f: impl Fn(&Context) -> String + Send + Sync + 'static) -> Self {
        Self {
            role,
            content: TemplateContent::Render(Arc::new(f)),
            condition: None,
            contains_code: false,
            opts: MessageOpts::default(),
        }
    }

    /// Gate the template on a context predicate.
    pub fn when(mut self, condition: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Mark the template as potentially containing document code.
    pub fn with_code(mut self) -> Self {
        self.contains_code = true;
        self
    }

    /// Attach a filtering tag to the emitted message.
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.opts.tag = Some(tag.into());
        self
    }

    /// Mark the emitted message invisible to user-facing conversations.
    pub fn invisible(mut self) -> Self {
        self.opts.visible = false;
        self
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("role", &self.role)
            .field("content", &self.content)
            .field("conditional", &self.condition.is_some())
            .field("contains_code", &self.contains_code)
            .field("opts", &self.opts)
            .finish()
    }
}

/// Tag applied to the appended selection message.
pub const VISUAL_TAG: &str = "visual";

/// Assemble the ordered message list for a session.
///
/// * `send_code` — whether configuration permits document code in
///   prompts; code-bearing templates and the trailing selection are
///   dropped when false.
/// * `suppress_visual` — session-level opt-out of the trailing
///   selection message.
pub fn assemble(
    templates: &[Template],
    ctx: &Context,
    send_code: bool,
    suppress_visual: bool,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(templates.len() + 1);

    for template in templates {
        if template.contains_code && !send_code {
            continue;
        }
        if let Some(condition) = &template.condition {
            if !condition(ctx) {
                continue;
            }
        }
        let content = match &template.content {
            TemplateContent::Text(text) => text.clone(),
            TemplateContent::Render(f) => f(ctx),
        };
        messages.push(Message {
            role: template.role,
            content,
            opts: template.opts.clone(),
        });
    }

    if send_code && ctx.is_visual && !suppress_visual {
        messages.push(
            Message::user(format!(
                "```{}\n{}\n```",
                ctx.filetype,
                ctx.selected_text()
            ))
            .with_tag(VISUAL_TAG),
        );
    }

    messages
}

/// Concatenate the user-authored portion of an assembled prompt into the
/// single piece of text the classifier judges.
pub fn merge_user_text(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
