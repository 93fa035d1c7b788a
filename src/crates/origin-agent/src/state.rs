//! Per-thread turn state.
//!
//! The graph state is a flat JSON channel map; [`AgentState`] is its typed
//! view. Nodes deserialize the full state, work on the typed struct, and
//! return partial updates as JSON objects. Only `messages` accumulates — the
//! graph schema appends it through the message reducer, every other field is
//! replaced wholesale by node updates.

use notegraph_core::channels::StateSchema;
use notegraph_core::messages::{Message, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Routing outcome for the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Intent {
    #[default]
    #[serde(rename = "CHAT")]
    Chat,
    #[serde(rename = "TASK")]
    Task,
}

/// Interaction mode. `Ask` disables every write tool for the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Ask,
    #[default]
    Agent,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub intent: Intent,

    #[serde(default)]
    pub active_note_id: Option<String>,

    #[serde(default)]
    pub active_note_title: Option<String>,

    #[serde(default)]
    pub active_note_category: Option<String>,

    #[serde(default)]
    pub context_note_id: Option<String>,

    #[serde(default)]
    pub context_note_title: Option<String>,

    /// Read-only snapshot of the open note's body for this turn.
    #[serde(default)]
    pub note_content: Option<String>,

    #[serde(default)]
    pub selected_text: Option<String>,

    #[serde(default)]
    pub attachment_context: Option<String>,

    /// Forces a knowledge-base search this turn.
    #[serde(default)]
    pub use_knowledge: bool,

    #[serde(default = "default_true")]
    pub auto_accept_writes: bool,

    #[serde(default)]
    pub agent_mode: AgentMode,

    #[serde(default)]
    pub tool_call_count: u32,

    #[serde(default)]
    pub last_tool_name: Option<String>,

    #[serde(default)]
    pub last_tool_fingerprint: Option<String>,

    /// Consecutive identical invocations of the last tool.
    #[serde(default)]
    pub tool_repeat_count: u32,

    #[serde(default)]
    pub last_tool_success: Option<bool>,

    /// Cached semantic write classification for the current turn.
    #[serde(default)]
    pub write_authorized: Option<bool>,

    /// The single tool selected for the next execution step.
    #[serde(default)]
    pub next_tool_call: Option<ToolCall>,
}

impl AgentState {
    pub fn from_value(value: &Value) -> crate::error::Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Text of the most recent user message, multimodal parts flattened.
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_human())
            .map(|m| m.text())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_assistant())
    }
}

/// Channel schema for the agent graph: `messages` appends, the rest replace.
pub fn state_schema() -> StateSchema {
    StateSchema::new().with_message_channel("messages")
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::messages::ContentPart;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_state() {
        let state = AgentState::from_value(&json!({})).unwrap();
        assert!(state.auto_accept_writes);
        assert_eq!(state.agent_mode, AgentMode::Agent);
        assert_eq!(state.intent, Intent::Chat);
        assert_eq!(state.tool_call_count, 0);
    }

    #[test]
    fn test_intent_wire_format() {
        assert_eq!(serde_json::to_value(Intent::Task).unwrap(), json!("TASK"));
        assert_eq!(serde_json::to_value(Intent::Chat).unwrap(), json!("CHAT"));
    }

    #[test]
    fn test_last_user_text_skips_empty_and_multimodal() {
        let mut state = AgentState::default();
        state.messages = vec![
            Message::human("first question"),
            Message::assistant("answer"),
            Message::human(vec![
                ContentPart::text("what is in this image?"),
                ContentPart::image_url("data:image/png;base64,AA"),
            ]),
        ];
        assert_eq!(
            state.last_user_text().as_deref(),
            Some("what is in this image?")
        );
    }

    #[test]
    fn test_unknown_channels_ignored() {
        let state = AgentState::from_value(&json!({"messages": [], "future_field": 1})).unwrap();
        assert!(state.messages.is_empty());
    }
}
