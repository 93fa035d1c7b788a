//! Graph events → client event stream.
//!
//! Output is one JSON object per line, in the ordering clients rely on:
//! an opening status, interleaved text deltas and tool parts (each tool part
//! going `running`/`pending` → `completed`, with its legacy event right after
//! completion), then a clearing status. The vocabulary is frozen — the
//! frontend predates this engine and must keep working unchanged.

use crate::graph::{NODE_AGENT, NODE_FAST_CHAT, NODE_RUN_TOOL};
use futures::Stream;
use futures::StreamExt;
use notegraph_core::messages::Message;
use notegraph_core::stream::GraphEvent;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

const THINKING_STATUS: &str = "🧠 思考中...";

/// Flush the text buffer at this size even without sentence punctuation.
const TEXT_BUFFER_FLUSH: usize = 64;

const SENTENCE_TERMINATORS: &[char] = &['。', '！', '？', '.', '!', '?', '\n'];

const SESSION_INCONSISTENT_MESSAGE: &str =
    "Session state is inconsistent. Please start a new conversation or clear this session.";

/// Strip classifier control tokens the model occasionally leaks into prose.
///
/// Narrow by construction: only the `ALLOW_WRITE`/`DENY_WRITE` labels, their
/// stitched repetitions, and full-width-underscore variants match. Normal
/// prose passes through unchanged.
pub fn sanitize_control_tokens(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?:ALLOW|DENY)(?:[_＿]WRITE)+|[_＿]WRITE(?:[_＿]WRITE)+").expect("valid regex")
    });
    re.replace_all(text, "").into_owned()
}

fn note_id_from_text(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"ID:\s*([\w-]+)").expect("valid regex"));
    re.captures(text).map(|c| c[1].to_string())
}

/// Derive the legacy one-shot event for a completed tool, if any.
pub fn legacy_tool_event(
    tool_name: &str,
    result: &str,
    args: Option<&Map<String, Value>>,
) -> Option<Value> {
    let arg_note_id = args
        .and_then(|a| a.get("note_id"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let note_id = note_id_from_text(result).or(arg_note_id);

    let (tag, message) = match tool_name {
        "create_note" if result.starts_with("Successfully created") => {
            ("note_created", "New note created and synced.")
        }
        "update_note" if result.starts_with("Successfully updated") => {
            ("note_updated", "Note content updated.")
        }
        "patch_note" if result.starts_with("Successfully patched") => {
            ("note_updated", "Note content updated.")
        }
        "rename_note" if result.starts_with("Successfully renamed") => {
            ("note_renamed", "Note title updated.")
        }
        "delete_note" if result.starts_with("Successfully deleted") => {
            ("note_deleted", "Note deleted from library.")
        }
        "set_note_category"
            if result.starts_with("Successfully assigned")
                || result.starts_with("Successfully removed") =>
        {
            ("note_categorized", "Note category updated.")
        }
        _ => return None,
    };

    let mut event = json!({"tool_call": tag, "message": message});
    if let Some(id) = note_id {
        event["note_id"] = json!(id);
    }
    Some(event)
}

/// Split off buffer segments ready to emit: everything up to each sentence
/// terminator, plus an oversized remainder.
fn drain_ready(buffer: &mut String) -> Vec<String> {
    let mut ready = Vec::new();
    loop {
        let split_at = buffer
            .char_indices()
            .find(|(_, c)| SENTENCE_TERMINATORS.contains(c))
            .map(|(i, c)| i + c.len_utf8());
        match split_at {
            Some(end) => {
                let segment: String = buffer.drain(..end).collect();
                ready.push(segment);
            }
            None => break,
        }
    }
    if buffer.chars().count() >= TEXT_BUFFER_FLUSH {
        ready.push(std::mem::take(buffer));
    }
    ready
}

fn first_message(update: &Value) -> Option<Message> {
    update
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|m| m.first())
        .and_then(|m| serde_json::from_value(m.clone()).ok())
}

#[derive(Debug, Clone)]
struct PendingTool {
    id: String,
    name: String,
    args: Map<String, Value>,
}

pub struct StreamAdapter {
    is_resume: bool,
}

impl StreamAdapter {
    pub fn new(is_resume: bool) -> Self {
        Self { is_resume }
    }

    /// Transform the executor's event stream into client JSON lines.
    pub fn adapt(
        self,
        mut events: impl Stream<Item = GraphEvent> + Unpin + Send + 'static,
    ) -> impl Stream<Item = String> + Send + 'static {
        let is_resume = self.is_resume;

        async_stream::stream! {
            let mut status_sent = false;
            let mut text_buffer = String::new();
            let mut pending_tool: Option<PendingTool> = None;

            macro_rules! line {
                ($value:expr) => {
                    $value.to_string()
                };
            }

            while let Some(event) = events.next().await {
                if !status_sent {
                    status_sent = true;
                    yield line!(json!({"type": "status", "text": THINKING_STATUS}));
                }

                match event {
                    GraphEvent::Token { node, delta } => {
                        if node != NODE_AGENT && node != NODE_FAST_CHAT {
                            continue;
                        }
                        text_buffer.push_str(&delta);
                        for segment in drain_ready(&mut text_buffer) {
                            let clean = sanitize_control_tokens(&segment);
                            if !clean.is_empty() {
                                yield line!(json!({"part_type": "text", "delta": clean}));
                            }
                        }
                    }

                    GraphEvent::Updates { node, update } if node == NODE_AGENT => {
                        if let Some(msg) = first_message(&update) {
                            if let Some(call) = msg.tool_calls.as_ref().and_then(|c| c.first()) {
                                pending_tool = Some(PendingTool {
                                    id: call.id.clone(),
                                    name: call.name.clone(),
                                    args: call.args.clone(),
                                });
                                yield line!(json!({
                                    "part_type": "tool",
                                    "tool_id": call.id,
                                    "tool_name": call.name,
                                    "status": "running",
                                }));
                            }
                        }
                    }

                    GraphEvent::Updates { node, update } if node == NODE_RUN_TOOL => {
                        let Some(msg) = first_message(&update) else { continue };
                        if !msg.is_tool() {
                            continue;
                        }
                        let result = msg.text();
                        let tool_name = update
                            .get("last_tool_name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let tool_id = msg.tool_call_id.clone().unwrap_or_default();
                        let preview: String = result.chars().take(100).collect();
                        yield line!(json!({
                            "part_type": "tool",
                            "tool_id": tool_id,
                            "tool_name": tool_name,
                            "status": "completed",
                            "output": preview,
                        }));

                        let args = pending_tool
                            .take()
                            .filter(|p| p.id == tool_id)
                            .map(|p| p.args);
                        if let Some(event) = legacy_tool_event(&tool_name, &result, args.as_ref()) {
                            yield line!(event);
                        }
                    }

                    GraphEvent::Updates { .. } => {}

                    GraphEvent::Interrupt { value, .. } => {
                        if let Some(pending) = pending_tool.take() {
                            yield line!(json!({
                                "part_type": "tool",
                                "tool_id": pending.id,
                                "tool_name": pending.name,
                                "status": "pending",
                            }));
                        }
                        yield line!(json!({"type": "approval_required", "approval": value}));
                        return;
                    }

                    GraphEvent::Done { .. } => {
                        if !text_buffer.is_empty() {
                            let clean = sanitize_control_tokens(&std::mem::take(&mut text_buffer));
                            if !clean.is_empty() {
                                yield line!(json!({"part_type": "text", "delta": clean}));
                            }
                        }
                        yield line!(json!({"type": "status", "text": ""}));
                        return;
                    }

                    GraphEvent::Error { message } => {
                        let integrity = message.contains("tool_call") || message.contains("tool call");
                        let text = if integrity && !is_resume {
                            SESSION_INCONSISTENT_MESSAGE.to_string()
                        } else {
                            message
                        };
                        yield line!(json!({"error": text}));
                        return;
                    }
                }
            }
        }
    }
}
