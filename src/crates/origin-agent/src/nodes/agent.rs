//! The agent node: decide between one tool call and a final answer.

use super::{parse_state, AgentDeps};
use crate::classify::classify_write_authorization;
use crate::context::build_context_messages;
use crate::prompts;
use crate::sanitize::sanitize_for_llm;
use crate::state::{AgentMode, AgentState, Intent};
use notegraph_core::error::Result;
use notegraph_core::llm::{bind_tools, ChatRequest};
use notegraph_core::messages::{Message, ToolCall};
use notegraph_core::node::NodeContext;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub async fn agent_node(deps: Arc<AgentDeps>, value: Value, ctx: NodeContext) -> Result<Value> {
    let state = parse_state(&value)?;

    // Semantic write classification, cached for the rest of the turn. Ask
    // mode never authorizes writes so the classifier is skipped entirely.
    let write_authorized = match (state.agent_mode, state.write_authorized) {
        (AgentMode::Ask, _) => false,
        (AgentMode::Agent, Some(cached)) => cached,
        (AgentMode::Agent, None) => match state.last_user_text() {
            Some(text) => classify_write_authorization(&deps.model, &text).await,
            None => false,
        },
    };

    let messages = assemble_messages(&deps, &state);
    let limit_reached = state.tool_call_count >= deps.settings.max_tool_calls;

    let read_only = state.agent_mode == AgentMode::Ask || !write_authorized;
    let definitions = if limit_reached {
        Vec::new()
    } else {
        deps.registry.definitions(read_only)
    };
    debug!(
        read_only,
        write_authorized,
        limit_reached,
        tools = definitions.len(),
        "agent invocation"
    );
    let bound = bind_tools(deps.model.clone(), definitions);

    let mut response = bound.chat(ChatRequest::new(messages.clone())).await?;

    // One forced retry when a tool is clearly required but the model chatted.
    let requires_tool = state.use_knowledge || write_authorized;
    if state.intent == Intent::Task
        && state.tool_call_count == 0
        && !limit_reached
        && requires_tool
        && !response.message.has_tool_calls()
    {
        warn!("tool required but none called, retrying once");
        let mut retry = messages.clone();
        retry.push(Message::system(prompts::FORCE_TOOL_INSTRUCTION));
        response = bound.chat(ChatRequest::new(retry)).await?;
    }

    let ai = normalize_response(response.message);

    // Final answers are surfaced through the token stream.
    if !ai.has_tool_calls() {
        let text = ai.text();
        if !text.trim().is_empty() {
            ctx.emit_token(text);
        }
    }

    Ok(json!({
        "messages": [ai],
        "write_authorized": write_authorized,
    }))
}

fn assemble_messages(deps: &AgentDeps, state: &AgentState) -> Vec<Message> {
    let mut messages = build_context_messages(state, &deps.settings);

    let guardrail = match state.agent_mode {
        AgentMode::Ask => prompts::ASK_MODE_GUARDRAIL,
        AgentMode::Agent => prompts::AGENT_MODE_GUARDRAIL,
    };
    messages.push(Message::system(guardrail));
    messages.push(Message::system(prompts::language_instruction(
        &state.last_user_text().unwrap_or_default(),
    )));

    if state.tool_call_count >= deps.settings.max_tool_calls {
        messages.push(Message::system(prompts::STOP_TOOLS_INSTRUCTION));
    }

    messages.extend(sanitize_for_llm(&state.messages));
    messages
}

/// Enforce the one-tool discipline on a raw model response.
///
/// Keeps only the first tool call, assigns a missing call id, strips chatter
/// accompanying a call, and reconstructs a call from `invalid_tool_calls`
/// when that is all the provider could give us.
pub(crate) fn normalize_response(mut message: Message) -> Message {
    if let Some(calls) = message.tool_calls.take() {
        if let Some(mut first) = calls.into_iter().next() {
            if first.id.trim().is_empty() {
                first.id = ToolCall::generate_id();
            }
            message.tool_calls = Some(vec![first]);
            if !message.content.is_empty() {
                message.content = "".into();
            }
            message.invalid_tool_calls = None;
            return message;
        }
    }

    // Recovery: the provider failed to parse the call arguments.
    if let Some(invalid) = message.invalid_tool_calls.take() {
        for bad in invalid {
            let Some(name) = bad.name.clone().filter(|n| !n.is_empty()) else {
                continue;
            };
            let Ok(args) = serde_json::from_str(&bad.args) else {
                continue;
            };
            let id = bad
                .id
                .clone()
                .filter(|i| !i.trim().is_empty())
                .unwrap_or_else(ToolCall::generate_id);
            message.tool_calls = Some(vec![ToolCall::new(id, name, args)]);
            message.content = "".into();
            return message;
        }
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::messages::InvalidToolCall;
    use serde_json::Map;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall::new(id, name, Map::new())
    }

    #[test]
    fn test_only_first_tool_call_kept() {
        let msg = Message::assistant("let me do two things")
            .with_tool_calls(vec![call("c1", "search_knowledge"), call("c2", "delete_note")]);
        let normalized = normalize_response(msg);
        // Chatter next to a tool call is stripped.
        assert_eq!(normalized.text(), "");
        let calls = normalized.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search_knowledge");
    }

    #[test]
    fn test_missing_call_id_assigned() {
        let msg = Message::assistant("").with_tool_calls(vec![call("", "rename_note")]);
        let normalized = normalize_response(msg);
        assert!(!normalized.tool_calls.unwrap()[0].id.is_empty());
    }

    #[test]
    fn test_invalid_call_recovered() {
        let msg = Message::assistant("").with_invalid_tool_calls(vec![InvalidToolCall {
            id: None,
            name: Some("update_note".to_string()),
            args: r#"{"note_id": "n1", "instruction": "fix"}"#.to_string(),
            error: Some("parse error".to_string()),
        }]);
        let normalized = normalize_response(msg);
        let calls = normalized.tool_calls.unwrap();
        assert_eq!(calls[0].name, "update_note");
        assert_eq!(calls[0].args["instruction"], "fix");
        assert!(normalized.invalid_tool_calls.is_none());
    }

    #[test]
    fn test_unrecoverable_invalid_call_dropped() {
        let msg = Message::assistant("answer").with_invalid_tool_calls(vec![InvalidToolCall {
            id: None,
            name: Some("update_note".to_string()),
            args: "{not json".to_string(),
            error: None,
        }]);
        let normalized = normalize_response(msg);
        assert!(normalized.tool_calls.is_none());
        assert_eq!(normalized.text(), "answer");
    }

    #[test]
    fn test_plain_answer_untouched() {
        let msg = Message::assistant("just an answer");
        let normalized = normalize_response(msg);
        assert_eq!(normalized.text(), "just an answer");
        assert!(normalized.tool_calls.is_none());
    }
}
