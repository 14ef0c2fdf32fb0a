//! Offline adapter that replays canned responses.
//!
//! Useful for tests and dry runs: each call to
//! [`Adapter::request`](super::Adapter::request) consumes the next queued
//! [`ScriptedResponse`] and streams its chunks over a real channel, so
//! the full chunk/done/cancel machinery is exercised without a network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Adapter, RequestHandle, StreamEvent, WireMessage};
use crate::Result;

/// One chunk in a scripted response.
#[derive(Debug, Clone)]
enum ScriptedChunk {
    /// A text delta, delivered as `{"delta": ...}`.
    Text(String),
    /// A raw non-text chunk (metadata frame, keepalive).
    Raw(serde_json::Value),
    /// A per-chunk transport error.
    Error(String),
}

/// A canned streaming response.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    chunks: Vec<ScriptedChunk>,
    /// Repeat the chunk list forever (until cancelled). For cancellation
    /// tests and long-running dry runs.
    endless: bool,
}

impl ScriptedResponse {
    /// A response delivered as a single text chunk.
    pub fn text(content: impl Into<String>) -> Self {
        Self::default().then_text(content)
    }

    /// A response delivered as the given sequence of text chunks.
    pub fn chunks<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut resp = Self::default();
        for part in parts {
            resp = resp.then_text(part);
        }
        resp
    }

    /// Append a text chunk.
    pub fn then_text(mut self, content: impl Into<String>) -> Self {
        self.chunks.push(ScriptedChunk::Text(content.into()));
        self
    }

    /// Append a raw non-text chunk.
    pub fn then_raw(mut self, chunk: serde_json::Value) -> Self {
        self.chunks.push(ScriptedChunk::Raw(chunk));
        self
    }

    /// Append a per-chunk transport error.
    pub fn then_error(mut self, message: impl Into<String>) -> Self {
        self.chunks.push(ScriptedChunk::Error(message.into()));
        self
    }

    /// Repeat the chunk list until the request is shut down.
    pub fn endless(mut self) -> Self {
        self.endless = true;
        self
    }
}

/// Adapter replaying queued [`ScriptedResponse`]s in order.
///
/// Requests beyond the queued scripts produce an empty stream. The
/// adapter records every request's message list, so tests can assert on
/// exactly what was sent (and on how many round trips happened).
pub struct ScriptedAdapter {
    name: String,
    scripts: Mutex<VecDeque<ScriptedResponse>>,
    requests: AtomicUsize,
    captured: Mutex<Vec<Vec<WireMessage>>>,
}

impl ScriptedAdapter {
    /// Create an adapter with a queue of responses.
    pub fn new<I>(scripts: I) -> Arc<Self>
    where
        I: IntoIterator<Item = ScriptedResponse>,
    {
        Arc::new(Self {
            name: "scripted".to_string(),
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: AtomicUsize::new(0),
            captured: Mutex::new(Vec::new()),
        })
    }

    /// Number of streaming requests issued so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Message lists of every request, in order.
    pub fn captured_requests(&self) -> Vec<Vec<WireMessage>> {
        self.captured.lock().clone()
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn chunk_to_text(&self, chunk: &serde_json::Value) -> Option<String> {
        chunk
            .get("delta")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }

    async fn request(
        &self,
        messages: Vec<WireMessage>,
        _params: serde_json::Value,
    ) -> Result<RequestHandle> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.captured.lock().push(messages);

        let script = self.scripts.lock().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            loop {
                for chunk in &script.chunks {
                    let event = match chunk {
                        ScriptedChunk::Text(text) => {
                            StreamEvent::Chunk(serde_json::json!({ "delta": text }))
                        }
                        ScriptedChunk::Raw(value) => StreamEvent::Chunk(value.clone()),
                        ScriptedChunk::Error(message) => StreamEvent::Error(message.clone()),
                    };
                    tokio::select! {
                        _ = token.cancelled() => return,
                        sent = tx.send(event) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
                if !script.endless {
                    break;
                }
                // Let the consumer run between repetitions.
                tokio::task::yield_now().await;
            }
            // tx drops here; the receiver sees the stream end.
        });

        Ok(RequestHandle::new(rx, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain_text(adapter: &ScriptedAdapter, mut handle: RequestHandle) -> String {
        let mut out = String::new();
        while let Some(event) = handle.next().await {
            if let StreamEvent::Chunk(chunk) = event {
                if let Some(text) = adapter.chunk_to_text(&chunk) {
                    out.push_str(&text);
                }
            }
        }
        out
    }

    #[tokio::test]
    async fn test_replays_chunks_in_order() {
        let adapter = ScriptedAdapter::new([ScriptedResponse::chunks(["he", "llo"])]);
        let handle = adapter
            .request(vec![], serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(drain_text(&adapter, handle).await, "hello");
        assert_eq!(adapter.request_count(), 1);
    }

    #[tokio::test]
    async fn test_non_text_chunks_yield_no_text() {
        let adapter = ScriptedAdapter::new([ScriptedResponse::default()
            .then_raw(serde_json::json!({"usage": {"output_tokens": 3}}))
            .then_text("ok")]);
        let handle = adapter
            .request(vec![], serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(drain_text(&adapter, handle).await, "ok");
    }

    #[tokio::test]
    async fn test_exhausted_queue_gives_empty_stream() {
        let adapter = ScriptedAdapter::new([]);
        let mut handle = adapter
            .request(vec![], serde_json::json!({}))
            .await
            .unwrap();
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn test_endless_stream_stops_on_shutdown() {
        let adapter = ScriptedAdapter::new([ScriptedResponse::text("x").endless()]);
        let mut handle = adapter
            .request(vec![], serde_json::json!({}))
            .await
            .unwrap();
        assert!(handle.next().await.is_some());
        handle.shutdown();
        assert!(handle.next().await.is_none());
    }
}
