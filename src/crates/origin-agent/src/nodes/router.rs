use super::{parse_state, AgentDeps};
use crate::classify::classify_intent;
use crate::state::Intent;
use notegraph_core::error::Result;
use notegraph_core::node::NodeContext;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Decide CHAT vs. TASK for the turn. The knowledge flag short-circuits to
/// TASK without touching the model.
pub async fn router_node(deps: Arc<AgentDeps>, value: Value, _ctx: NodeContext) -> Result<Value> {
    let state = parse_state(&value)?;
    let intent = if state.use_knowledge {
        Intent::Task
    } else {
        classify_intent(&deps.model, &state).await
    };
    debug!(?intent, "router decision");
    Ok(json!({ "intent": intent }))
}
