//! Placement classification: one round trip to decide where output lands.
//!
//! The classifier sends a fixed system instruction plus the merged
//! user-authored text, accumulates the streamed reply raw, and extracts
//! the first `<...>` token once the stream ends. Extraction is a narrow,
//! explicitly-validated parse: anything outside the closed tag set fails
//! classification immediately rather than leaking an unknown tag into
//! the placement engine.

use std::str::FromStr;

use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::llm::{Adapter, Message, StreamEvent};

/// Where the model's output should land.
///
/// The closed set of actionable placements. The classifier's `<error>`
/// tag is not a placement; it surfaces as [`ClassifyError::Refused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Placement {
    /// Delete the selection and stream into its place.
    Replace,
    /// Stream onto a fresh blank line after the selection.
    Add,
    /// Stream onto a fresh blank line before the selection.
    Before,
    /// Stream into a brand-new buffer opened in a split.
    New,
    /// No buffer mutation; hand off to a conversation.
    Chat,
}

impl Placement {
    /// Whether this placement mutates a document.
    pub fn mutates(&self) -> bool {
        !matches!(self, Placement::Chat)
    }

    /// Whether this placement gets a diff overlay (it rewrites an
    /// existing buffer rather than opening a new one).
    pub fn reviewable(&self) -> bool {
        matches!(self, Placement::Replace | Placement::Add | Placement::Before)
    }
}

/// Classification failures. All are terminal for the session and leave
/// the document untouched.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("no placement tag in classification output: {0:?}")]
    MissingTag(String),

    #[error("unrecognized placement tag <{0}>")]
    Unrecognized(String),

    #[error("model declined to classify the instruction")]
    Refused,

    #[error("classification transport failed: {0}")]
    Transport(String),
}

/// System instruction describing the five placements, with worked
/// examples. Sent verbatim as the first classification message.
pub const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are in charge of a code assistant embedded in a text editor. The user has written an instruction; your only job is to decide where the assistant's answer should be placed. Reply with exactly one of these tags and nothing else:

<replace> the answer should replace the user's current selection
<add>     the answer should be inserted after the selection
<before>  the answer should be inserted before the selection
<new>     the answer belongs in a new, separate document
<chat>    the instruction is a question or discussion, not an edit
<error>   the instruction cannot be classified

Examples:
"refactor this function to use iterators" -> <replace>
"write unit tests for this module" -> <add>
"add a doc comment for this struct" -> <before>
"write a shell script that renames these files" -> <new>
"why does this function allocate?" -> <chat>"#;

/// The "structured output only" directive appended before the second
/// (submit) round trip.
pub const CODE_ONLY_PROMPT: &str = "Respond with code only. Do not use markdown \
fences, do not explain, do not add commentary before or after the code. Your \
entire reply is inserted into the user's document verbatim.";

/// Build the two-message classification request around the merged
/// user-authored text.
pub fn classification_request(merged: &str) -> Vec<Message> {
    vec![
        Message::system(CLASSIFY_SYSTEM_PROMPT),
        Message::user(format!(
            "The instruction to classify is:\n\n\"{merged}\""
        )),
    ]
}

/// Wrap an explicit caller-supplied instruction the way assembled user
/// prompts are merged.
pub fn wrap_question(instruction: &str) -> String {
    format!("<question>{instruction}</question>")
}

/// Extract and validate the first `<...>` token from model output.
pub fn extract_tag(text: &str) -> Result<Placement, ClassifyError> {
    let open = text
        .find('<')
        .ok_or_else(|| ClassifyError::MissingTag(snippet(text)))?;
    let rest = &text[open + 1..];
    let close = rest
        .find('>')
        .ok_or_else(|| ClassifyError::MissingTag(snippet(text)))?;
    let tag = rest[..close].trim();

    if tag == "error" {
        return Err(ClassifyError::Refused);
    }
    Placement::from_str(tag).map_err(|_| ClassifyError::Unrecognized(tag.to_string()))
}

fn snippet(text: &str) -> String {
    let mut s: String = text.chars().take(80).collect();
    if s.len() < text.len() {
        s.push('…');
    }
    s
}

/// Run the classification round trip.
///
/// `register` receives the request's cancellation token before any chunk
/// is consumed, so the owning session can cancel mid-classification.
/// Per-chunk transport errors are logged and skipped; the stream decides
/// whether to keep emitting.
pub async fn classify(
    adapter: &dyn Adapter,
    merged: &str,
    register: impl FnOnce(CancellationToken),
) -> Result<Placement, ClassifyError> {
    let messages = classification_request(merged);
    let wire = adapter.map_roles(&messages);
    let mut handle = adapter
        .request(wire, adapter.request_params())
        .await
        .map_err(|e| ClassifyError::Transport(e.to_string()))?;
    register(handle.cancel_token());

    let mut placement = String::new();
    while let Some(event) = handle.next().await {
        match event {
            StreamEvent::Chunk(chunk) => {
                if let Some(text) = adapter.chunk_to_text(&chunk) {
                    placement.push_str(&text);
                }
            }
            StreamEvent::Error(message) => {
                warn!(adapter = adapter.name(), %message, "classification chunk error");
            }
        }
    }

    extract_tag(&placement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ScriptedAdapter, ScriptedResponse};

    #[test]
    fn test_extract_tag_valid() {
        assert_eq!(extract_tag("<replace>").unwrap(), Placement::Replace);
        assert_eq!(extract_tag("  <add>  ").unwrap(), Placement::Add);
        assert_eq!(extract_tag("sure! <chat> it is").unwrap(), Placement::Chat);
        assert_eq!(extract_tag("< new >").unwrap(), Placement::New);
    }

    #[test]
    fn test_extract_tag_missing() {
        assert!(matches!(
            extract_tag("no tags here"),
            Err(ClassifyError::MissingTag(_))
        ));
        assert!(matches!(
            extract_tag("<unterminated"),
            Err(ClassifyError::MissingTag(_))
        ));
    }

    #[test]
    fn test_extract_tag_error_is_refusal() {
        assert!(matches!(extract_tag("<error>"), Err(ClassifyError::Refused)));
    }

    #[test]
    fn test_extract_tag_rejects_unknown() {
        assert!(matches!(
            extract_tag("<foo>"),
            Err(ClassifyError::Unrecognized(tag)) if tag == "foo"
        ));
    }

    #[test]
    fn test_placement_tag_strings_round_trip() {
        for placement in [
            Placement::Replace,
            Placement::Add,
            Placement::Before,
            Placement::New,
            Placement::Chat,
        ] {
            let tag = placement.to_string();
            assert_eq!(Placement::from_str(&tag).unwrap(), placement);
        }
    }

    #[tokio::test]
    async fn test_classify_accumulates_split_tag() {
        let adapter = ScriptedAdapter::new([ScriptedResponse::chunks(["<re", "place>"])]);
        let placement = classify(adapter.as_ref(), "rewrite this", |_| {})
            .await
            .unwrap();
        assert_eq!(placement, Placement::Replace);
        assert_eq!(adapter.request_count(), 1);
    }

    #[tokio::test]
    async fn test_classify_sends_system_and_question() {
        let adapter = ScriptedAdapter::new([ScriptedResponse::text("<chat>")]);
        classify(adapter.as_ref(), "why is this slow?", |_| {})
            .await
            .unwrap();

        let captured = adapter.captured_requests();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].len(), 2);
        assert_eq!(captured[0][0].role, "system");
        assert!(captured[0][1].content.contains("why is this slow?"));
    }

    #[tokio::test]
    async fn test_classify_survives_chunk_errors() {
        let adapter = ScriptedAdapter::new([ScriptedResponse::default()
            .then_error("hiccup")
            .then_text("<add>")]);
        let placement = classify(adapter.as_ref(), "x", |_| {}).await.unwrap();
        assert_eq!(placement, Placement::Add);
    }

    #[tokio::test]
    async fn test_classify_garbage_output_fails() {
        let adapter = ScriptedAdapter::new([ScriptedResponse::text("I think you should…")]);
        assert!(classify(adapter.as_ref(), "x", |_| {}).await.is_err());
    }
}
