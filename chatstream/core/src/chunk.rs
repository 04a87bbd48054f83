//! Stream Chunks
//!
//! A chunk is one server-sent event's parsed JSON payload. Its schema is
//! opaque to the transport; consumers that know the chat server's response
//! format can decode a [`StreamResponse`] view from it.

use serde::{Deserialize, Serialize};

/// One parsed event payload
pub type Chunk = serde_json::Value;

/// Kind of a chat stream response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Answer text fragment
    Answer,
    /// Knowledge references backing the answer
    References,
    /// Agent thought process
    Thinking,
    /// Agent tool invocation
    ToolCall,
    /// Agent tool result
    ToolResult,
    /// Server-side error
    Error,
    /// Agent reflection
    Reflection,
    /// Generated session title
    SessionTitle,
    /// Query received, processing started
    AgentQuery,
    /// Agent finished
    Complete,
    /// Any type this client does not know yet
    #[serde(other)]
    Unknown,
}

/// Typed view of a chat stream chunk
///
/// Every field is optional on the wire; missing ones take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamResponse {
    /// Response id
    pub id: String,
    /// Response kind
    pub response_type: Option<ResponseType>,
    /// Current fragment content
    pub content: String,
    /// Whether the response is complete
    pub done: bool,
    /// Session id (on `agent_query`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Assistant message id (on `agent_query`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_message_id: Option<String>,
    /// Knowledge references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_references: Option<serde_json::Value>,
    /// Partial tool calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
    /// Extra display metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl StreamResponse {
    /// Decode the typed view of a chunk, `None` if it does not fit
    #[must_use]
    pub fn from_chunk(chunk: &Chunk) -> Option<Self> {
        Self::deserialize(chunk).ok()
    }

    /// Whether this chunk carries answer text
    #[must_use]
    pub fn is_answer(&self) -> bool {
        matches!(self.response_type, Some(ResponseType::Answer))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_answer_chunk() {
        let chunk = json!({
            "id": "r1",
            "response_type": "answer",
            "content": "Hel",
            "done": false
        });
        let view = StreamResponse::from_chunk(&chunk).unwrap();
        assert!(view.is_answer());
        assert_eq!(view.content, "Hel");
        assert!(!view.done);
    }

    #[test]
    fn test_decode_unknown_type_and_missing_fields() {
        let chunk = json!({"response_type": "brand_new", "assistant_message_id": "m1"});
        let view = StreamResponse::from_chunk(&chunk).unwrap();
        assert_eq!(view.response_type, Some(ResponseType::Unknown));
        assert_eq!(view.assistant_message_id.as_deref(), Some("m1"));
        assert!(view.content.is_empty());
    }

    #[test]
    fn test_non_object_chunk_has_no_view() {
        assert!(StreamResponse::from_chunk(&json!([1, 2])).is_none());
    }
}
