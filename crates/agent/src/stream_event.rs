//! Chat-level streaming events.
//!
//! `ChatStreamEvent` wraps provider-level stream chunks into the events a
//! front end renders while an answer is being generated.

use docchat_core::document::RetrievalResult;
use docchat_core::provider::Usage;
use serde::{Deserialize, Serialize};

use crate::session::AnswerStatus;

/// Events emitted while streaming one answer.
///
/// - `sources`: retrieval results the answer is grounded on (always first)
/// - `chunk`: partial answer text
/// - `done`: the answer is complete and was recorded
/// - `error`: generation failed; nothing was recorded
/// - `cancelled`: the caller stopped the stream; partial text was discarded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    Sources { sources: Vec<RetrievalResult> },

    Chunk { content: String },

    Done {
        answer: String,
        status: AnswerStatus,
        usage: Option<Usage>,
    },

    Error { message: String },

    Cancelled,
}

impl ChatStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Sources { .. } => "sources",
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. } | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_chunk() {
        let event = ChatStreamEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn event_serialization_done() {
        let event = ChatStreamEvent::Done {
            answer: "Refunds take 14 days.".into(),
            status: AnswerStatus::Grounded,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""status":"grounded""#));
    }

    #[test]
    fn event_serialization_cancelled() {
        let json = serde_json::to_string(&ChatStreamEvent::Cancelled).unwrap();
        assert_eq!(json, r#"{"type":"cancelled"}"#);
    }

    #[test]
    fn event_type_names() {
        assert_eq!(
            ChatStreamEvent::Sources { sources: vec![] }.event_type(),
            "sources"
        );
        assert_eq!(
            ChatStreamEvent::Error {
                message: "x".into()
            }
            .event_type(),
            "error"
        );
        assert_eq!(ChatStreamEvent::Cancelled.event_type(), "cancelled");
    }

    #[test]
    fn terminal_events() {
        assert!(ChatStreamEvent::Cancelled.is_terminal());
        assert!(
            !ChatStreamEvent::Chunk {
                content: "x".into()
            }
            .is_terminal()
        );
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"chunk","content":"hi"}"#;
        let event: ChatStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            ChatStreamEvent::Chunk { content } => assert_eq!(content, "hi"),
            _ => panic!("Wrong variant"),
        }
    }
}
