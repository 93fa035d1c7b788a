//! Graph nodes: router → fast_chat | agent ↔ (pick → run → status).

pub mod agent;
pub mod fast_chat;
pub mod pick_tool;
pub mod router;
pub mod run_tool;
pub mod status;

use crate::config::Settings;
use crate::state::AgentState;
use crate::tools::ToolRegistry;
use notegraph_core::error::{GraphError, Result};
use notegraph_core::llm::ChatModel;
use serde_json::Value;
use std::sync::Arc;

/// Shared handles every node closes over.
pub struct AgentDeps {
    pub model: Arc<dyn ChatModel>,

    pub registry: Arc<ToolRegistry>,

    pub settings: Arc<Settings>,
}

pub(crate) fn parse_state(value: &Value) -> Result<AgentState> {
    AgentState::from_value(value).map_err(|e| GraphError::Execution(e.to_string()))
}
