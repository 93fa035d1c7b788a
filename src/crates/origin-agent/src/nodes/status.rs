use super::{parse_state, AgentDeps};
use notegraph_core::error::Result;
use notegraph_core::messages::Message;
use notegraph_core::node::NodeContext;
use serde_json::{json, Value};
use std::sync::Arc;

/// Append a status-kind marker recording the completed tool. The sanitizer
/// filters these before any model call; they exist for the client log.
pub async fn status_node(deps: Arc<AgentDeps>, value: Value, _ctx: NodeContext) -> Result<Value> {
    let state = parse_state(&value)?;
    let label = state
        .last_tool_name
        .as_deref()
        .map(|tool| deps.settings.status_label(tool))
        .unwrap_or_default();
    Ok(json!({ "messages": [Message::status(label)] }))
}
