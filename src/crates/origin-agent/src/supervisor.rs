//! Turn orchestration.
//!
//! [`AgentService`] owns the process-singleton graph runtime and drives one
//! client turn end to end: checkpoint sanity, context and multimodal input
//! assembly, graph execution, and adaptation of the event stream into client
//! JSON lines. A provider/model switch invalidates the cached runtime; the
//! next turn rebuilds it against the new configuration.

use crate::approval::parse_inline_token;
use crate::config::Settings;
use crate::error::{AgentError, Result};
use crate::graph::build_agent_graph;
use crate::nodes::AgentDeps;
use crate::sanitize::has_orphan_tool_calls;
use crate::state::AgentMode;
use crate::store::{NoteStore, SearchIndex};
use crate::stream_adapter::StreamAdapter;
use crate::tools::notes::build_note_tools;
use futures::{Stream, StreamExt};
use llm::ProviderManager;
use notegraph_checkpoint::CheckpointSaver;
use notegraph_core::executor::{CompiledGraph, GraphInput};
use notegraph_core::llm::ChatModel;
use notegraph_core::messages::{ContentPart, Message};
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

const NO_PENDING_APPROVAL_ERROR: &str = "No pending approval found for this session.";

const APPROVAL_GUIDANCE: &str =
    "A write action is awaiting your approval. Reply 'approve' or 'reject' to continue.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    File,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub data_url: Option<String>,
    pub text_content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub message: String,
    pub thread_id: String,
    pub note_context: Option<String>,
    pub selected_text: Option<String>,
    pub active_note_id: Option<String>,
    pub active_note_title: Option<String>,
    pub context_note_id: Option<String>,
    pub context_note_title: Option<String>,
    pub use_knowledge: bool,
    pub auto_accept_writes: bool,
    pub agent_mode: AgentMode,
    pub attachments: Vec<Attachment>,
    pub resume: Option<Value>,
    pub model_provider_id: Option<String>,
    pub model_name: Option<String>,
}

pub struct AgentRuntime {
    pub graph: CompiledGraph,
}

pub struct AgentService {
    providers: Arc<ProviderManager>,
    saver: Arc<dyn CheckpointSaver>,
    store: Arc<dyn NoteStore>,
    index: Arc<dyn SearchIndex>,
    settings: Arc<Settings>,
    model_override: Option<Arc<dyn ChatModel>>,
    runtime: RwLock<Option<Arc<AgentRuntime>>>,
}

pub type TurnStream = Pin<Box<dyn Stream<Item = String> + Send>>;

impl AgentService {
    pub fn new(
        providers: Arc<ProviderManager>,
        saver: Arc<dyn CheckpointSaver>,
        store: Arc<dyn NoteStore>,
        index: Arc<dyn SearchIndex>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            providers,
            saver,
            store,
            index,
            settings,
            model_override: None,
            runtime: RwLock::new(None),
        }
    }

    /// Pin the chat model instead of building one from the provider
    /// registry. Used by tests and embedded deployments.
    pub fn with_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model_override = Some(model);
        self
    }

    pub fn saver(&self) -> Arc<dyn CheckpointSaver> {
        self.saver.clone()
    }

    /// Drop the cached runtime; the next turn rebuilds it.
    pub async fn invalidate_runtime(&self) {
        *self.runtime.write().await = None;
        info!("agent runtime invalidated");
    }

    async fn runtime(&self) -> Result<Arc<AgentRuntime>> {
        if let Some(runtime) = self.runtime.read().await.clone() {
            return Ok(runtime);
        }

        let mut guard = self.runtime.write().await;
        if let Some(runtime) = guard.clone() {
            return Ok(runtime);
        }

        let model: Arc<dyn ChatModel> = match &self.model_override {
            Some(model) => model.clone(),
            None => Arc::new(self.providers.build_client().await?),
        };
        let registry = Arc::new(build_note_tools(
            self.store.clone(),
            self.index.clone(),
            model.clone(),
        ));
        let deps = Arc::new(AgentDeps {
            model,
            registry,
            settings: self.settings.clone(),
        });
        let graph = build_agent_graph(deps, self.saver.clone())?;
        let runtime = Arc::new(AgentRuntime { graph });
        *guard = Some(runtime.clone());
        info!("agent runtime built");
        Ok(runtime)
    }

    /// Handle one client turn; the returned stream yields client JSON lines.
    pub fn handle_turn(self: &Arc<Self>, request: TurnRequest) -> TurnStream {
        let service = self.clone();
        Box::pin(async_stream::stream! {
            match service.prepare_turn(&request).await {
                Ok(input) => {
                    let is_resume = matches!(input, GraphInput::Resume { .. });
                    let runtime = match service.runtime().await {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            yield json!({"error": e.to_string()}).to_string();
                            return;
                        }
                    };
                    let events = runtime.graph.stream(input, request.thread_id.clone());
                    let lines = StreamAdapter::new(is_resume).adapt(events);
                    futures::pin_mut!(lines);
                    while let Some(line) = lines.next().await {
                        yield line;
                    }
                }
                Err(e) => {
                    yield json!({"error": e.to_string()}).to_string();
                }
            }
        })
    }

    /// Validate checkpoint health and build the graph input.
    ///
    /// Every early exit carries its message in `AgentError::InvalidRequest`
    /// so `handle_turn` emits it as a single error line.
    async fn prepare_turn(&self, request: &TurnRequest) -> Result<GraphInput> {
        if request.model_provider_id.is_some() || request.model_name.is_some() {
            let changed = self
                .providers
                .apply_override(
                    request.model_provider_id.as_deref(),
                    request.model_name.as_deref(),
                )
                .await?;
            if changed {
                self.invalidate_runtime().await;
            }
        }

        let thread_id = &request.thread_id;
        let pending = self.saver.pending_interrupts(thread_id).await?;
        let mut resume_payload = request.resume.clone();

        if resume_payload.is_some() {
            let latest = self.saver.get_latest(thread_id).await?;
            if latest.is_none() || pending.is_empty() {
                return Err(AgentError::InvalidRequest(
                    NO_PENDING_APPROVAL_ERROR.to_string(),
                ));
            }
        } else if !pending.is_empty() {
            // The thread is paused. Accept an inline approve/reject token;
            // anything else gets guidance instead of a new turn.
            match parse_inline_token(request.message.trim()) {
                Some(approved) => {
                    let approval_id = pending[0]
                        .value
                        .get("value")
                        .and_then(|v| v.get("approval_id"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    info!(%thread_id, approved, "inline approval token accepted");
                    resume_payload = Some(json!({
                        "action": if approved { "approve" } else { "reject" },
                        "approval_id": approval_id,
                    }));
                }
                None => {
                    return Err(AgentError::InvalidRequest(APPROVAL_GUIDANCE.to_string()));
                }
            }
        } else if let Some(checkpoint) = self.saver.get_latest(thread_id).await? {
            // Corrupted checkpoint pre-turn: auto-heal by clearing the
            // thread before the new turn starts.
            let messages: Vec<Message> = checkpoint
                .channel_values
                .get("messages")
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or_default();
            if has_orphan_tool_calls(&messages) {
                warn!(%thread_id, "orphan tool calls in checkpoint, clearing thread state");
                self.saver.clear(thread_id).await?;
            }
        }

        let live_update = self.build_live_update(request).await?;

        let input = match resume_payload {
            Some(decision) => GraphInput::Resume {
                decision,
                state_update: Some(live_update),
            },
            None => {
                // A fresh turn resets the per-turn bookkeeping channels;
                // a resume must not touch them mid-turn.
                let user = build_user_message(request);
                let mut start = live_update;
                start["messages"] = json!([user]);
                start["write_authorized"] = Value::Null;
                start["next_tool_call"] = Value::Null;
                start["tool_call_count"] = json!(0u32);
                start["tool_repeat_count"] = json!(0u32);
                start["last_tool_name"] = Value::Null;
                start["last_tool_fingerprint"] = Value::Null;
                start["last_tool_success"] = Value::Null;
                GraphInput::Start(start)
            }
        };
        Ok(input)
    }

    /// Current UI toggles plus the runtime context text, applied on every
    /// turn — including resumes, so toggles changed while an approval dialog
    /// was open take effect immediately.
    async fn build_live_update(&self, request: &TurnRequest) -> Result<Value> {
        let mut note_content = request.note_context.clone().unwrap_or_default();
        if note_content.is_empty() {
            if let Some(id) = &request.active_note_id {
                if let Ok(Some(note)) = self.store.get_note(id).await {
                    note_content = note.readable_body().to_string();
                }
            }
        }
        if let Some(id) = &request.context_note_id {
            if let Ok(Some(note)) = self.store.get_note(id).await {
                note_content.push_str(&format!(
                    "\n\n[Referenced note: {}]\n{}",
                    note.title,
                    note.readable_body()
                ));
            }
        }

        let mut attachment_sections: Vec<String> = Vec::new();
        for attachment in &request.attachments {
            if attachment.kind == AttachmentKind::File {
                if let Some(text) = &attachment.text_content {
                    let capped: String = text
                        .chars()
                        .take(self.settings.attachment_text_cap)
                        .collect();
                    attachment_sections.push(format!("[Attachment: {}]\n{}", attachment.name, capped));
                }
            }
        }
        let attachment_context = attachment_sections.join("\n\n");

        Ok(json!({
            "active_note_id": request.active_note_id,
            "active_note_title": request.active_note_title,
            "context_note_id": request.context_note_id,
            "context_note_title": request.context_note_title,
            "note_content": note_content,
            "selected_text": request.selected_text,
            "attachment_context": attachment_context,
            "use_knowledge": request.use_knowledge,
            "auto_accept_writes": request.auto_accept_writes,
            "agent_mode": request.agent_mode,
        }))
    }
}

/// The user message for a fresh turn. Image attachments become typed blocks;
/// an image-only message still carries a non-empty block list.
fn build_user_message(request: &TurnRequest) -> Message {
    let images: Vec<ContentPart> = request
        .attachments
        .iter()
        .filter(|a| a.kind == AttachmentKind::Image)
        .filter_map(|a| a.data_url.as_ref())
        .map(ContentPart::image_url)
        .collect();

    if images.is_empty() {
        return Message::human(request.message.clone());
    }

    let mut parts = Vec::with_capacity(images.len() + 1);
    if !request.message.trim().is_empty() {
        parts.push(ContentPart::text(request.message.clone()));
    }
    parts.extend(images);
    Message::human(parts)
}
