//! Node execution context and the interrupt primitive.

use crate::error::{GraphError, Result};
use crate::stream::GraphEvent;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub type NodeFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// A node: full state in, partial update out.
pub type NodeFn = Arc<dyn Fn(Value, NodeContext) -> NodeFuture + Send + Sync>;

/// Payload persisted when a node suspends.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InterruptRecord {
    pub id: String,

    /// Node that suspended; the resume run re-enters here.
    pub node: String,

    pub value: Value,
}

impl InterruptRecord {
    pub fn new(node: impl Into<String>, value: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node: node.into(),
            value,
        }
    }
}

/// Per-step context handed to a node.
///
/// Carries the thread id, a token emitter for incremental output, and the
/// resume slot: on a resume run the executor places the client's decision
/// here, and the first [`NodeContext::interrupt`] call consumes it.
pub struct NodeContext {
    pub thread_id: String,

    pub node: String,

    resume: Option<Value>,

    /// Payload of the interrupt being resumed, when this step re-enters a
    /// suspended node.
    pending_payload: Option<Value>,

    events: UnboundedSender<GraphEvent>,
}

impl NodeContext {
    pub fn new(
        thread_id: impl Into<String>,
        node: impl Into<String>,
        resume: Option<Value>,
        events: UnboundedSender<GraphEvent>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            node: node.into(),
            resume,
            pending_payload: None,
            events,
        }
    }

    pub fn with_pending_payload(mut self, payload: Option<Value>) -> Self {
        self.pending_payload = payload;
        self
    }

    /// The payload this node suspended with, available while resuming.
    pub fn pending_payload(&self) -> Option<&Value> {
        self.pending_payload.as_ref()
    }

    /// Suspend execution with `payload`, or consume a pending resume value.
    ///
    /// On the first run this returns `Err(GraphError::Suspended(..))` which
    /// the executor translates into an interrupt write plus a halted stream.
    /// When the turn is resumed the executor re-enters the node with the
    /// decision in the resume slot and this call yields it.
    pub fn interrupt(&mut self, payload: Value) -> Result<Value> {
        if let Some(decision) = self.resume.take() {
            return Ok(decision);
        }
        Err(GraphError::Suspended(InterruptRecord::new(
            self.node.clone(),
            payload,
        )))
    }

    /// True while a consumed-nothing resume decision is still pending.
    pub fn is_resuming(&self) -> bool {
        self.resume.is_some()
    }

    /// Emit an incremental token attributed to this node.
    ///
    /// Sending into a dropped stream is not an error; the executor detects
    /// client disconnects between steps.
    pub fn emit_token(&self, delta: impl Into<String>) {
        let _ = self.events.send(GraphEvent::Token {
            node: self.node.clone(),
            delta: delta.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(resume: Option<Value>) -> NodeContext {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        NodeContext::new("t1", "run_one_tool", resume, tx)
    }

    #[test]
    fn test_interrupt_suspends_without_resume() {
        let mut c = ctx(None);
        let err = c.interrupt(json!({"tool": "delete_note"})).unwrap_err();
        match err {
            GraphError::Suspended(rec) => {
                assert_eq!(rec.node, "run_one_tool");
                assert_eq!(rec.value["tool"], "delete_note");
            }
            other => panic!("expected Suspended, got {other:?}"),
        }
    }

    #[test]
    fn test_interrupt_consumes_resume_once() {
        let mut c = ctx(Some(json!("approve")));
        assert_eq!(c.interrupt(json!({})).unwrap(), json!("approve"));
        // Second call suspends again.
        assert!(c.interrupt(json!({})).is_err());
    }
}
