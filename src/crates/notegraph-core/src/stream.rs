//! Multi-mode event stream emitted by the executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event from a graph run.
///
/// The stream interleaves three modes: per-token deltas attributed to the
/// emitting node, per-node state updates, and interrupt payloads. `Done` and
/// `Error` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    /// Incremental LLM output from one node.
    Token { node: String, delta: String },

    /// Partial state update produced by a completed node step.
    Updates { node: String, update: Value },

    /// Execution suspended awaiting a resume decision.
    Interrupt { id: String, value: Value },

    /// Run finished cleanly with the final state.
    Done { state: Value },

    /// Run aborted with an error.
    Error { message: String },
}

impl GraphEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GraphEvent::Done { .. } | GraphEvent::Error { .. } | GraphEvent::Interrupt { .. }
        )
    }
}
