use super::{parse_state, AgentDeps};
use crate::prompts;
use crate::sanitize::sanitize_for_llm;
use crate::state::AgentMode;
use notegraph_core::error::Result;
use notegraph_core::llm::ChatRequest;
use notegraph_core::messages::Message;
use notegraph_core::node::NodeContext;
use serde_json::{json, Value};
use std::sync::Arc;

use futures::StreamExt;

/// Single non-tool completion for conversational turns, streamed token by
/// token.
pub async fn fast_chat_node(deps: Arc<AgentDeps>, value: Value, ctx: NodeContext) -> Result<Value> {
    let state = parse_state(&value)?;

    let guardrail = match state.agent_mode {
        AgentMode::Ask => prompts::ASK_MODE_GUARDRAIL,
        AgentMode::Agent => prompts::AGENT_MODE_GUARDRAIL,
    };
    let language = prompts::language_instruction(&state.last_user_text().unwrap_or_default());

    let mut messages = vec![
        Message::system(prompts::SYSTEM_POLICY),
        Message::system(guardrail),
        Message::system(language),
    ];
    messages.extend(sanitize_for_llm(&state.messages));

    let mut stream = deps.model.stream(ChatRequest::new(messages)).await?;
    let mut collected = String::new();
    let mut final_response = None;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.delta.is_empty() {
            collected.push_str(&chunk.delta);
            ctx.emit_token(chunk.delta);
        }
        if let Some(response) = chunk.response {
            final_response = Some(response);
        }
    }

    let reply = match final_response {
        Some(response) if !response.message.content.is_empty() => response.message.text(),
        _ => collected,
    };

    Ok(json!({ "messages": [Message::assistant(reply)] }))
}
