use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Monotone per-thread checkpoint identifier.
pub type CheckpointId = u64;

/// Channel name used by the modern interrupt-write schema.
pub const INTERRUPT_CHANNEL: &str = "__interrupt__";

/// An immutable snapshot of a thread's channel state after one graph step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub v: i32,

    pub id: CheckpointId,

    pub ts: DateTime<Utc>,

    /// The full channel map at this point in time.
    pub channel_values: Value,
}

impl Checkpoint {
    pub const CURRENT_VERSION: i32 = 1;

    pub fn new(id: CheckpointId, channel_values: Value) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id,
            ts: Utc::now(),
            channel_values,
        }
    }
}

/// A pending write attached to a checkpoint.
///
/// Interrupt writes exist in two schemas in the wild: a modern one where the
/// write is tagged with an explicit `channel` of `__interrupt__`, and a
/// legacy one where only the task path carries the marker. Both must be
/// recognized when checking for a pending approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptWrite {
    /// Task path the write originated from, e.g. `"run_one_tool:__interrupt__"`.
    pub task_path: String,

    /// Explicit channel tag (modern schema only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    pub value: Value,
}

impl InterruptWrite {
    /// Create an interrupt write in the modern schema.
    pub fn interrupt(node: impl Into<String>, value: Value) -> Self {
        Self {
            task_path: node.into(),
            channel: Some(INTERRUPT_CHANNEL.to_string()),
            value,
        }
    }

    /// Create an interrupt write in the legacy path-tagged schema.
    pub fn legacy_interrupt(node: &str, value: Value) -> Self {
        Self {
            task_path: format!("{}:{}", node, INTERRUPT_CHANNEL),
            channel: None,
            value,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        self.channel.as_deref() == Some(INTERRUPT_CHANNEL)
            || self.task_path.contains(INTERRUPT_CHANNEL)
    }
}

/// A checkpoint together with its thread and any pending writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointTuple {
    pub thread_id: String,

    pub checkpoint: Checkpoint,

    pub pending_writes: Vec<InterruptWrite>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_modern_interrupt_detected() {
        let w = InterruptWrite::interrupt("run_one_tool", json!({"tool": "rename_note"}));
        assert!(w.is_interrupt());
        assert_eq!(w.channel.as_deref(), Some(INTERRUPT_CHANNEL));
    }

    #[test]
    fn test_legacy_interrupt_detected() {
        let w = InterruptWrite::legacy_interrupt("run_one_tool", json!({}));
        assert!(w.channel.is_none());
        assert!(w.is_interrupt());
    }

    #[test]
    fn test_plain_write_not_interrupt() {
        let w = InterruptWrite {
            task_path: "agent".to_string(),
            channel: Some("messages".to_string()),
            value: json!([]),
        };
        assert!(!w.is_interrupt());
    }
}
