//! Message types for the conversation log.
//!
//! Messages model the four spec roles (system, human, assistant, tool) with
//! optional multimodal content parts, assistant tool calls, and a `kind`
//! marker used to tag internal status messages that must never be fed back
//! to the model. The [`add_messages`] reducer merges message lists with
//! id-based deduplication and is the reducer behind the `messages` channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Role of the message sender.
///
/// Serializes to lowercase strings compatible with OpenAI-protocol APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Human,
    Assistant,
    Tool,
}

/// One part of a multimodal message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Image reference, either a remote URL or an inline data URL.
    Image {
        url: String,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }
}

/// Message content: plain text or an ordered list of typed blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of all textual parts.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts)
    }
}

/// A tool invocation requested by the assistant.
///
/// `id` is unique within a turn; `args` is the parsed argument object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,

    pub name: String,

    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// Generate a fresh call id in the provider's `call_*` style.
    pub fn generate_id() -> String {
        format!("call_{}", Uuid::new_v4().simple())
    }
}

/// A tool call the provider could not fully parse (unparseable args, missing
/// name). Kept around so the agent node can attempt recovery before the
/// sanitizer strips it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Raw, unparsed argument string as emitted by the model.
    pub args: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single message in a thread's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub role: MessageRole,

    pub content: MessageContent,

    /// Tool calls (assistant messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Calls the provider failed to parse; stripped before re-feeding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_tool_calls: Option<Vec<InvalidToolCall>>,

    /// Referenced tool call id (tool messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Message kind marker; `"status"` messages are never fed to the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Message {
    pub const STATUS_KIND: &'static str = "status";

    pub fn new(role: MessageRole, content: impl Into<MessageContent>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role,
            content: content.into(),
            tool_calls: None,
            invalid_tool_calls: None,
            tool_call_id: None,
            kind: None,
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn human(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn tool(content: impl Into<MessageContent>, tool_call_id: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// An assistant message flagged as an internal status marker.
    pub fn status(content: impl Into<MessageContent>) -> Self {
        let mut msg = Self::assistant(content);
        msg.kind = Some(Self::STATUS_KIND.to_string());
        msg
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }

    pub fn with_invalid_tool_calls(mut self, invalid: Vec<InvalidToolCall>) -> Self {
        self.invalid_tool_calls = Some(invalid);
        self
    }

    pub fn text(&self) -> String {
        self.content.as_text()
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    pub fn is_human(&self) -> bool {
        self.role == MessageRole::Human
    }

    pub fn is_tool(&self) -> bool {
        self.role == MessageRole::Tool
    }

    pub fn is_status(&self) -> bool {
        self.kind.as_deref() == Some(Self::STATUS_KIND)
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().map(|t| !t.is_empty()).unwrap_or(false)
    }

    pub fn ensure_id(&mut self) {
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4().to_string());
        }
    }
}

/// Reducer for the `messages` channel.
///
/// Appends `right` onto `left`, replacing any existing message that carries
/// the same id. Messages without ids get one assigned so later replacement
/// and orphan repair can address them.
pub fn add_messages(left: Vec<Message>, right: Vec<Message>) -> Vec<Message> {
    let mut merged = left;
    for m in merged.iter_mut() {
        m.ensure_id();
    }

    for mut msg in right {
        msg.ensure_id();
        let id = msg.id.clone();
        if let Some(idx) = merged
            .iter()
            .position(|m| m.id.is_some() && m.id == id)
        {
            merged[idx] = msg;
        } else {
            merged.push(msg);
        }
    }
    merged
}

/// Last human message in the log, if any.
pub fn last_human_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().rev().find(|m| m.is_human())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_messages_appends() {
        let left = vec![Message::human("q1").with_id("1")];
        let right = vec![Message::assistant("a1").with_id("2")];
        let merged = add_messages(left, right);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].text(), "a1");
    }

    #[test]
    fn test_add_messages_replaces_by_id() {
        let left = vec![Message::assistant("draft").with_id("m1")];
        let right = vec![Message::assistant("final").with_id("m1")];
        let merged = add_messages(left, right);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text(), "final");
    }

    #[test]
    fn test_add_messages_assigns_missing_ids() {
        let mut msg = Message::human("hi");
        msg.id = None;
        let merged = add_messages(vec![], vec![msg]);
        assert!(merged[0].id.is_some());
    }

    #[test]
    fn test_status_marker() {
        let msg = Message::status("⚙️ update_note finished");
        assert!(msg.is_status());
        assert!(msg.is_assistant());
        assert!(!Message::assistant("normal").is_status());
    }

    #[test]
    fn test_multimodal_text_extraction() {
        let msg = Message::human(vec![
            ContentPart::text("look at this"),
            ContentPart::image_url("data:image/png;base64,AAAA"),
        ]);
        assert_eq!(msg.text(), "look at this");
    }

    #[test]
    fn test_content_serialization_shapes() {
        let text = serde_json::to_value(Message::human("hi").content).unwrap();
        assert_eq!(text, json!("hi"));

        let parts = serde_json::to_value(MessageContent::Parts(vec![ContentPart::text("a")])).unwrap();
        assert_eq!(parts, json!([{"type": "text", "text": "a"}]));
    }

    #[test]
    fn test_tool_call_round_trip() {
        let mut args = Map::new();
        args.insert("note_id".to_string(), json!("1700000000000-abcdef012"));
        let call = ToolCall::new("call_1", "rename_note", args);
        let value = serde_json::to_value(&call).unwrap();
        let back: ToolCall = serde_json::from_value(value).unwrap();
        assert_eq!(back, call);
    }
}
