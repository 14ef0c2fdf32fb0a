//! Session controller: lifecycle, cancellation, and the classify→submit
//! state machine.
//!
//! A session owns one instruction against one document region, from
//! start until it finishes, aborts, or is cancelled. The two streaming
//! round trips (classify, then submit) run strictly in sequence; the
//! session holds at most one live request handle at a time, and `stop`
//! cancels whichever one is live.
//!
//! ```text
//! Idle → Classifying → Placed → Streaming → Done
//!              │                    │
//!              ├─→ ToChat → Done    └─→ Cancelled
//!              ├─→ Cancelled
//!              └─→ Aborted
//! ```
//!
//! Classification failure is terminal without reaching `Done`: the
//! session logs one diagnostic and ends in `Aborted` with zero
//! document mutation.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sumi_buffer::{Cursor, Editor};

use crate::chat::Chat;
use crate::classify::{self, CODE_ONLY_PROMPT, Placement, wrap_question};
use crate::config::Settings;
use crate::context::Context;
use crate::diff::{DiffFactory, DiffOverlay, DiffReview};
use crate::error::EngineError;
use crate::llm::{Adapter, Message, Role, StreamEvent};
use crate::place::place;
use crate::prompt::{self, Template, VISUAL_TAG, merge_user_text};
use crate::write::{follow_cursor, write_chunk};
use crate::Result;

/// Key bound to cancelling the in-flight request, scoped to the target
/// buffer for the session's lifetime.
pub const CANCEL_KEY: &str = "<C-c>";
/// Key bound to accepting a reviewable response.
pub const ACCEPT_KEY: &str = "ga";
/// Key bound to rejecting a reviewable response.
pub const REJECT_KEY: &str = "gr";
/// Key bound to cycling the review cursor through changed lines.
pub const CYCLE_KEY: &str = "gn";

/// Tag on invisible system directives (stripped before chat handoff).
pub const SYSTEM_TAG: &str = "system_tag";

/// Lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Classifying,
    Placed,
    Streaming,
    ToChat,
    Done,
    Cancelled,
    Aborted,
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The response streamed to completion under `placement`.
    Done(Placement),
    /// The instruction was routed to a conversation.
    Chat(Arc<Chat>),
    /// Classification failed; nothing was written.
    Aborted,
    /// `stop` ended the session early; cleanup still ran.
    Cancelled,
}

/// Observable lifecycle notifications.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started {
        id: Uuid,
    },
    Finished {
        id: Uuid,
        placement: Option<Placement>,
    },
}

/// Free-form options a session may be started with.
#[derive(Debug, Clone, Default)]
pub struct SessionOpts {
    /// Skip classification entirely and use this placement.
    pub placement: Option<Placement>,
    /// Classify this instruction instead of the assembled user prompt.
    pub user_prompt: Option<String>,
    /// Do not append the selection as prompt context.
    pub omit_visual_context: bool,
}

/// Everything a session is constructed from.
pub struct SessionParams {
    /// The resolved model adapter. Construction fails without one.
    pub adapter: Option<Arc<dyn Adapter>>,
    /// Prior-conversation messages, copied in read-only.
    pub chat_context: Vec<Message>,
    /// Snapshot of the originating selection.
    pub context: Context,
    /// Builds the review surface for reviewable placements; the
    /// built-in [`DiffOverlay`] is used when absent.
    pub diff: Option<DiffFactory>,
    pub editor: Editor,
    pub opts: SessionOpts,
    /// Invoked once, right as the session starts.
    pub pre_hook: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Ordered template list, owned by the session from here on.
    pub templates: Vec<Template>,
    pub settings: Settings,
}

/// The mutable decision record, populated in two waves.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub placement: Option<Placement>,
    pub pos: Option<Cursor>,
    pub prompts: Vec<Message>,
}

/// One inline-assist session.
pub struct Session {
    id: Uuid,
    adapter: Arc<dyn Adapter>,
    editor: Editor,
    context: Mutex<Context>,
    chat_context: Vec<Message>,
    templates: Vec<Template>,
    opts: SessionOpts,
    settings: Settings,
    classification: Mutex<Classification>,
    state: Mutex<SessionState>,
    current_request: Mutex<Option<CancellationToken>>,
    diff_factory: Option<DiffFactory>,
    diff: Arc<Mutex<Option<Box<dyn DiffReview>>>>,
    pre_hook: Option<Arc<dyn Fn() + Send + Sync>>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("adapter", &self.adapter.name())
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Session {
    /// Construct a session. Fails with [`EngineError::NoAdapter`] when no
    /// adapter was resolved; nothing else can fail this early.
    pub fn new(params: SessionParams) -> Result<Arc<Self>> {
        let adapter = params.adapter.ok_or(EngineError::NoAdapter)?;
        let (events, _) = broadcast::channel(16);
        Ok(Arc::new(Self {
            id: Uuid::new_v4(),
            adapter,
            editor: params.editor,
            context: Mutex::new(params.context),
            chat_context: params.chat_context,
            templates: params.templates,
            opts: params.opts,
            settings: params.settings,
            classification: Mutex::new(Classification::default()),
            state: Mutex::new(SessionState::Idle),
            current_request: Mutex::new(None),
            diff_factory: params.diff,
            diff: Arc::new(Mutex::new(None)),
            pre_hook: params.pre_hook,
            events,
        }))
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Snapshot of the decision record.
    pub fn classification(&self) -> Classification {
        self.classification.lock().clone()
    }

    /// Snapshot of the (possibly adjusted) invocation context.
    pub fn context(&self) -> Context {
        self.context.lock().clone()
    }

    /// Subscribe to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Cooperatively cancel the live request, if any. Idempotent; safe
    /// to call from keymap actions or other tasks.
    pub fn stop(&self) {
        if let Some(token) = self.current_request.lock().clone() {
            debug!(session = %self.id, "stopping in-flight request");
            token.cancel();
        }
    }

    fn group(&self) -> String {
        format!("sumi-inline-{}", self.id)
    }

    fn request_cancelled(&self) -> bool {
        self.current_request
            .lock()
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Drive the session to a terminal state.
    ///
    /// Runs the whole pipeline: assemble → classify → place → submit →
    /// stream. Cleanup (keymap removal, event-group clear, the finished
    /// notification) runs on every exit path that placed anything.
    pub async fn start(self: &Arc<Self>) -> Result<SessionOutcome> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Idle {
                return Err(EngineError::InvalidState("session already started"));
            }
            *state = SessionState::Classifying;
        }
        if let Some(hook) = &self.pre_hook {
            hook();
        }
        let _ = self.events.send(SessionEvent::Started { id: self.id });
        info!(session = %self.id, adapter = self.adapter.name(), "inline session started");

        // ── Classify ─────────────────────────────────────────────────────
        let ctx = self.context.lock().clone();
        let assembled = prompt::assemble(
            &self.templates,
            &ctx,
            self.settings.send_code,
            self.opts.omit_visual_context,
        );
        self.classification.lock().prompts = assembled.clone();

        let placement = match self.opts.placement {
            Some(overridden) => {
                debug!(session = %self.id, placement = %overridden, "placement override, skipping classification");
                overridden
            }
            None => {
                let merged = match &self.opts.user_prompt {
                    Some(instruction) => wrap_question(instruction),
                    None => merge_user_text(&assembled),
                };
                let result = classify::classify(self.adapter.as_ref(), &merged, |token| {
                    *self.current_request.lock() = Some(token);
                })
                .await;
                let cancelled = self.request_cancelled();
                *self.current_request.lock() = None;

                match result {
                    Ok(placement) => placement,
                    Err(_) if cancelled => {
                        *self.state.lock() = SessionState::Cancelled;
                        let _ = self.events.send(SessionEvent::Finished {
                            id: self.id,
                            placement: None,
                        });
                        return Ok(SessionOutcome::Cancelled);
                    }
                    Err(err) => {
                        *self.state.lock() = SessionState::Aborted;
                        error!(session = %self.id, %err, "classification failed, aborting");
                        return Ok(SessionOutcome::Aborted);
                    }
                }
            }
        };
        self.classification.lock().placement = Some(placement);
        debug!(session = %self.id, %placement, "placement decided");

        // ── Route to chat ────────────────────────────────────────────────
        if placement == Placement::Chat {
            *self.state.lock() = SessionState::ToChat;
            return self.hand_to_chat(assembled).await;
        }

        // ── Place ────────────────────────────────────────────────────────
        let placed = {
            let mut ctx = self.context.lock();
            place(&self.editor, &self.settings, &mut ctx, placement)?
        };
        self.classification.lock().pos = Some(placed.pos);
        *self.state.lock() = SessionState::Placed;

        // Second-wave prompt additions: the structured-output directive,
        // then the freshest model-authored message from the prior
        // conversation, both invisible.
        {
            let mut classification = self.classification.lock();
            classification
                .prompts
                .push(Message::system(CODE_ONLY_PROMPT).with_tag(SYSTEM_TAG).invisible());
            if let Some(last) = self
                .chat_context
                .iter()
                .rev()
                .find(|m| m.role == Role::Llm && !m.content.is_empty())
            {
                classification
                    .prompts
                    .push(Message::llm(last.content.clone()).with_tag(SYSTEM_TAG).invisible());
            }
        }

        self.wire_keymaps(placed.pos, placement, placed.before_lines);

        // ── Submit and stream ────────────────────────────────────────────
        let outcome = self.stream_response(placed.pos, placement).await;
        self.finish(placement);
        outcome
    }

    /// Strip handoff-inappropriate messages and hand the rest to a
    /// conversation, auto-submitting its first request.
    async fn hand_to_chat(self: &Arc<Self>, assembled: Vec<Message>) -> Result<SessionOutcome> {
        let ctx = self.context.lock().clone();
        let mut messages: Vec<Message> = assembled
            .into_iter()
            .filter(|m| !(m.role == Role::System && !m.opts.visible))
            .collect();
        if ctx.is_visual {
            // The conversation re-derives selection context itself.
            messages.retain(|m| m.opts.tag.as_deref() != Some(VISUAL_TAG));
        }

        let chat = Chat::new(ctx, Arc::clone(&self.adapter), messages, true);
        if chat.auto_submit() {
            if let Err(err) = chat.submit().await {
                warn!(session = %self.id, %err, "chat auto-submit failed");
            }
        }

        *self.state.lock() = SessionState::Done;
        let _ = self.events.send(SessionEvent::Finished {
            id: self.id,
            placement: Some(Placement::Chat),
        });
        info!(session = %self.id, "handed off to chat");
        Ok(SessionOutcome::Chat(chat))
    }

    /// Register the cancel binding (session-scoped) and, for reviewable
    /// placements, the diff overlay with its accept/reject bindings
    /// (these outlive the session so the user can review after `Done`).
    fn wire_keymaps(
        self: &Arc<Self>,
        pos: Cursor,
        placement: Placement,
        before_lines: Option<Vec<String>>,
    ) {
        let weak = Arc::downgrade(self);
        let register = self.editor.register_keymap(
            pos.buffer,
            CANCEL_KEY,
            "Cancel the inline request",
            Some(self.group()),
            Arc::new(move || {
                if let Some(session) = weak.upgrade() {
                    session.stop();
                }
            }),
        );
        if let Err(err) = register {
            warn!(session = %self.id, %err, "could not register cancel keymap");
        }

        if !placement.reviewable() {
            return;
        }
        let Some(before) = before_lines else {
            return;
        };

        let ctx = self.context.lock().clone();
        let reviewer: Box<dyn DiffReview> = match &self.diff_factory {
            Some(factory) => factory(pos.buffer, pos, ctx.filetype, before, ctx.window),
            None => Box::new(DiffOverlay::new(
                pos.buffer,
                pos,
                ctx.filetype,
                before,
                ctx.window,
            )),
        };
        *self.diff.lock() = Some(reviewer);

        let release = |editor: &Editor, buffer| {
            editor.remove_keymap(buffer, ACCEPT_KEY);
            editor.remove_keymap(buffer, REJECT_KEY);
            editor.remove_keymap(buffer, CYCLE_KEY);
        };

        let buffer = pos.buffer;
        let editor = self.editor.clone();
        let slot = Arc::clone(&self.diff);
        let accept = {
            let editor = editor.clone();
            let slot = Arc::clone(&slot);
            Arc::new(move || {
                if let Some(reviewer) = slot.lock().take() {
                    reviewer.accept(&editor);
                    release(&editor, buffer);
                }
            })
        };
        let reject = {
            let editor = editor.clone();
            let slot = Arc::clone(&slot);
            Arc::new(move || {
                if let Some(reviewer) = slot.lock().take() {
                    if let Err(err) = reviewer.reject(&editor) {
                        warn!(%err, "diff reject failed");
                    }
                    release(&editor, buffer);
                }
            })
        };
        let cycle = Arc::new(move || {
            if let Some(reviewer) = slot.lock().as_mut() {
                if let Err(err) = reviewer.cycle(&editor) {
                    warn!(%err, "diff cycle failed");
                }
            }
        });

        let bindings: [(&str, &str, Arc<dyn Fn() + Send + Sync>); 3] = [
            (ACCEPT_KEY, "Accept the streamed response", accept),
            (REJECT_KEY, "Reject and restore the original", reject),
            (CYCLE_KEY, "Jump to the next changed line", cycle),
        ];
        for (key, desc, action) in bindings {
            if let Err(err) = self
                .editor
                .register_keymap(pos.buffer, key, desc, None, action)
            {
                warn!(session = %self.id, %err, "could not register review keymap");
            }
        }
    }

    /// Issue the submit request and write the streamed response at the
    /// placed cursor until the stream ends or the session is stopped.
    async fn stream_response(
        self: &Arc<Self>,
        mut pos: Cursor,
        placement: Placement,
    ) -> Result<SessionOutcome> {
        let prompts = self.classification.lock().prompts.clone();
        let wire = self.adapter.map_roles(&prompts);
        let params = self.settings.merged_params(self.adapter.request_params());
        let mut handle = match self.adapter.request(wire, params).await {
            Ok(handle) => handle,
            Err(err) => {
                error!(session = %self.id, %err, "submit request failed to open");
                return Ok(SessionOutcome::Aborted);
            }
        };
        *self.current_request.lock() = Some(handle.cancel_token());
        *self.state.lock() = SessionState::Streaming;

        let mut response = String::new();
        while let Some(event) = handle.next().await {
            match event {
                StreamEvent::Chunk(chunk) => {
                    let Some(text) = self.adapter.chunk_to_text(&chunk) else {
                        continue;
                    };
                    write_chunk(&self.editor, &mut pos, &text)?;
                    self.classification.lock().pos = Some(pos);
                    if placement == Placement::New {
                        follow_cursor(&self.editor, &pos);
                    }
                    response.push_str(&text);
                }
                StreamEvent::Error(message) => {
                    warn!(session = %self.id, %message, "transport chunk error");
                }
            }
        }

        let cancelled = self.request_cancelled();
        if !response.is_empty() {
            self.editor.set_last_response(response);
        }
        if cancelled {
            *self.state.lock() = SessionState::Cancelled;
            Ok(SessionOutcome::Cancelled)
        } else {
            *self.state.lock() = SessionState::Done;
            Ok(SessionOutcome::Done(placement))
        }
    }

    /// Release per-session resources and emit the finished notification.
    /// Runs exactly once, on every exit path past `Placed`.
    fn finish(&self, placement: Placement) {
        *self.current_request.lock() = None;
        if let Some(pos) = self.classification.lock().pos {
            self.editor.remove_keymap(pos.buffer, CANCEL_KEY);
        }
        self.editor.clear_group(&self.group());

        // A transport failure before streaming leaves the state at
        // Placed; normalize that to Done so the session stays terminal.
        {
            let mut state = self.state.lock();
            if matches!(*state, SessionState::Placed | SessionState::Streaming) {
                *state = SessionState::Done;
            }
        }

        let _ = self.events.send(SessionEvent::Finished {
            id: self.id,
            placement: Some(placement),
        });
        info!(session = %self.id, %placement, "inline session finished");
    }
}
