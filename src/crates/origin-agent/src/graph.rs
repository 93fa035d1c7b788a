//! Graph assembly.
//!
//! ```text
//! START → router ─┬→ fast_chat → END
//!                 └→ agent ─┬→ pick_one_tool → run_one_tool → status → agent
//!                           └→ END   (no tool calls, or tool budget spent)
//! ```
//!
//! The compiled graph is built once per provider configuration and cached by
//! the service layer; a provider/model switch rebuilds it.

use crate::nodes::{
    agent::agent_node, fast_chat::fast_chat_node, pick_tool::pick_one_tool_node,
    router::router_node, run_tool::run_one_tool_node, status::status_node, AgentDeps,
};
use notegraph_checkpoint::CheckpointSaver;
use notegraph_core::error::Result;
use notegraph_core::executor::CompiledGraph;
use notegraph_core::graph::{StateGraph, END, START};
use notegraph_core::messages::Message;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const NODE_ROUTER: &str = "router";
pub const NODE_FAST_CHAT: &str = "fast_chat";
pub const NODE_AGENT: &str = "agent";
pub const NODE_PICK_TOOL: &str = "pick_one_tool";
pub const NODE_RUN_TOOL: &str = "run_one_tool";
pub const NODE_STATUS: &str = "status";

fn route_intent(state: &Value) -> String {
    match state.get("intent").and_then(Value::as_str) {
        Some("TASK") => NODE_AGENT.to_string(),
        _ => NODE_FAST_CHAT.to_string(),
    }
}

/// Continue the tool loop only while the last assistant asked for a tool and
/// the budget holds.
fn should_continue(state: &Value, max_tool_calls: u32) -> String {
    let count = state
        .get("tool_call_count")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    if count >= max_tool_calls {
        return END.to_string();
    }

    let has_calls = state
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|msgs| {
            msgs.iter()
                .rev()
                .find_map(|m| serde_json::from_value::<Message>(m.clone()).ok().filter(|m| m.is_assistant()))
        })
        .map(|m| m.has_tool_calls())
        .unwrap_or(false);

    if has_calls {
        NODE_PICK_TOOL.to_string()
    } else {
        END.to_string()
    }
}

fn has_next_tool(state: &Value) -> String {
    match state.get("next_tool_call") {
        Some(Value::Null) | None => END.to_string(),
        Some(_) => NODE_RUN_TOOL.to_string(),
    }
}

pub fn build_agent_graph(
    deps: Arc<AgentDeps>,
    saver: Arc<dyn CheckpointSaver>,
) -> Result<CompiledGraph> {
    let mut graph = StateGraph::new(crate::state::state_schema());

    let d = deps.clone();
    graph.add_node(NODE_ROUTER, move |state, ctx| {
        let d = d.clone();
        Box::pin(async move { router_node(d, state, ctx).await })
    });

    let d = deps.clone();
    graph.add_node(NODE_FAST_CHAT, move |state, ctx| {
        let d = d.clone();
        Box::pin(async move { fast_chat_node(d, state, ctx).await })
    });

    let d = deps.clone();
    graph.add_node(NODE_AGENT, move |state, ctx| {
        let d = d.clone();
        Box::pin(async move { agent_node(d, state, ctx).await })
    });

    graph.add_node(NODE_PICK_TOOL, move |state, ctx| {
        Box::pin(async move { pick_one_tool_node(state, ctx).await })
    });

    let d = deps.clone();
    graph.add_node(NODE_RUN_TOOL, move |state, ctx| {
        let d = d.clone();
        Box::pin(async move { run_one_tool_node(d, state, ctx).await })
    });

    let d = deps.clone();
    graph.add_node(NODE_STATUS, move |state, ctx| {
        let d = d.clone();
        Box::pin(async move { status_node(d, state, ctx).await })
    });

    graph.add_edge(START, NODE_ROUTER);

    let mut intent_branches = HashMap::new();
    intent_branches.insert(NODE_FAST_CHAT.to_string(), NODE_FAST_CHAT.to_string());
    intent_branches.insert(NODE_AGENT.to_string(), NODE_AGENT.to_string());
    graph.add_conditional_edge(NODE_ROUTER, route_intent, intent_branches);

    graph.add_edge(NODE_FAST_CHAT, END);

    let max_tool_calls = deps.settings.max_tool_calls;
    let mut continue_branches = HashMap::new();
    continue_branches.insert(NODE_PICK_TOOL.to_string(), NODE_PICK_TOOL.to_string());
    continue_branches.insert(END.to_string(), END.to_string());
    graph.add_conditional_edge(
        NODE_AGENT,
        move |state| should_continue(state, max_tool_calls),
        continue_branches,
    );

    let mut pick_branches = HashMap::new();
    pick_branches.insert(NODE_RUN_TOOL.to_string(), NODE_RUN_TOOL.to_string());
    pick_branches.insert(END.to_string(), END.to_string());
    graph.add_conditional_edge(NODE_PICK_TOOL, has_next_tool, pick_branches);

    graph.add_edge(NODE_RUN_TOOL, NODE_STATUS);
    graph.add_edge(NODE_STATUS, NODE_AGENT);

    Ok(graph.compile()?.with_checkpointer(saver))
}
