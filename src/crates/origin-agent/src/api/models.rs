//! Wire models for the chat API.

use crate::state::AgentMode;
use crate::supervisor::{Attachment, AttachmentKind, TurnRequest};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentBody {
    #[serde(default)]
    pub kind: WireAttachmentKind,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mime_type: String,

    #[serde(default)]
    pub size_bytes: u64,

    #[serde(default)]
    pub data_url: Option<String>,

    #[serde(default)]
    pub text_content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WireAttachmentKind {
    Image,
    #[default]
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequestBody {
    pub message: String,

    /// `session_id` is the historical field name.
    #[serde(default, alias = "session_id")]
    pub thread_id: Option<String>,

    #[serde(default)]
    pub note_context: Option<String>,

    #[serde(default)]
    pub selected_text: Option<String>,

    #[serde(default)]
    pub active_note_id: Option<String>,

    #[serde(default)]
    pub active_note_title: Option<String>,

    #[serde(default)]
    pub context_note_id: Option<String>,

    #[serde(default)]
    pub context_note_title: Option<String>,

    #[serde(default)]
    pub use_knowledge: bool,

    #[serde(default = "default_true")]
    pub auto_accept_writes: bool,

    #[serde(default)]
    pub agent_mode: AgentMode,

    #[serde(default)]
    pub attachments: Vec<AttachmentBody>,

    #[serde(default)]
    pub resume: Option<Value>,

    #[serde(default)]
    pub model_provider_id: Option<String>,

    #[serde(default)]
    pub model_name: Option<String>,
}

impl ChatRequestBody {
    pub fn into_turn_request(self) -> TurnRequest {
        TurnRequest {
            message: self.message,
            thread_id: self
                .thread_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            note_context: self.note_context,
            selected_text: self.selected_text,
            active_note_id: self.active_note_id,
            active_note_title: self.active_note_title,
            context_note_id: self.context_note_id,
            context_note_title: self.context_note_title,
            use_knowledge: self.use_knowledge,
            auto_accept_writes: self.auto_accept_writes,
            agent_mode: self.agent_mode,
            attachments: self
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    kind: match a.kind {
                        WireAttachmentKind::Image => AttachmentKind::Image,
                        WireAttachmentKind::File => AttachmentKind::File,
                    },
                    name: a.name,
                    mime_type: a.mime_type,
                    size_bytes: a.size_bytes,
                    data_url: a.data_url,
                    text_content: a.text_content,
                })
                .collect(),
            resume: self.resume,
            model_provider_id: self.model_provider_id,
            model_name: self.model_name,
        }
    }
}
