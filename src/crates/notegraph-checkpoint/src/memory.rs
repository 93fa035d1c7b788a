use crate::checkpoint::{Checkpoint, CheckpointId, CheckpointTuple, InterruptWrite};
use crate::error::{CheckpointError, Result};
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CheckpointEntry {
    checkpoint: Checkpoint,
    writes: Vec<InterruptWrite>,
}

type Storage = Arc<RwLock<HashMap<String, Vec<CheckpointEntry>>>>;

/// In-memory checkpoint saver keeping full per-thread history.
///
/// The reference backend for tests and ephemeral deployments; state is lost
/// when the process exits.
#[derive(Debug, Clone, Default)]
pub struct InMemorySaver {
    storage: Storage,
}

impl InMemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn checkpoint_count(&self, thread_id: &str) -> usize {
        self.storage
            .read()
            .await
            .get(thread_id)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CheckpointSaver for InMemorySaver {
    async fn put(&self, thread_id: &str, channel_values: Value) -> Result<CheckpointId> {
        let mut storage = self.storage.write().await;
        let entries = storage.entry(thread_id.to_string()).or_default();
        let id = entries.last().map(|e| e.checkpoint.id + 1).unwrap_or(1);
        entries.push(CheckpointEntry {
            checkpoint: Checkpoint::new(id, channel_values),
            writes: Vec::new(),
        });
        Ok(id)
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.last())
            .map(|e| e.checkpoint.clone()))
    }

    async fn get_latest_tuple(&self, thread_id: &str) -> Result<Option<CheckpointTuple>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.last())
            .map(|e| CheckpointTuple {
                thread_id: thread_id.to_string(),
                checkpoint: e.checkpoint.clone(),
                pending_writes: e.writes.clone(),
            }))
    }

    async fn put_writes(
        &self,
        thread_id: &str,
        checkpoint_id: CheckpointId,
        writes: Vec<InterruptWrite>,
    ) -> Result<()> {
        let mut storage = self.storage.write().await;
        let entries = storage
            .get_mut(thread_id)
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;
        let entry = entries
            .iter_mut()
            .find(|e| e.checkpoint.id == checkpoint_id)
            .ok_or_else(|| {
                CheckpointError::Invalid(format!(
                    "checkpoint {} does not exist for thread '{}'",
                    checkpoint_id, thread_id
                ))
            })?;
        entry.writes.extend(writes);
        Ok(())
    }

    async fn clear(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_checkpoint_ids_are_monotone() {
        let saver = InMemorySaver::new();
        let a = saver.put("t1", json!({"n": 1})).await.unwrap();
        let b = saver.put("t1", json!({"n": 2})).await.unwrap();
        let c = saver.put("t1", json!({"n": 3})).await.unwrap();
        assert!(a < b && b < c);

        let latest = saver.get_latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.id, c);
        assert_eq!(latest.channel_values["n"], 3);
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let saver = InMemorySaver::new();
        saver.put("t1", json!({"x": 1})).await.unwrap();
        saver.put("t2", json!({"x": 2})).await.unwrap();

        assert_eq!(
            saver.get_latest("t1").await.unwrap().unwrap().channel_values["x"],
            1
        );
        saver.clear("t1").await.unwrap();
        assert!(saver.get_latest("t1").await.unwrap().is_none());
        assert!(saver.get_latest("t2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pending_interrupts_bound_to_latest() {
        let saver = InMemorySaver::new();
        let id = saver.put("t1", json!({})).await.unwrap();
        saver
            .put_writes(
                "t1",
                id,
                vec![InterruptWrite::interrupt("run_one_tool", json!({"tool": "x"}))],
            )
            .await
            .unwrap();
        assert_eq!(saver.pending_interrupts("t1").await.unwrap().len(), 1);

        // A newer checkpoint supersedes the pending write.
        saver.put("t1", json!({})).await.unwrap();
        assert!(saver.pending_interrupts("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_writes_to_missing_checkpoint_fails() {
        let saver = InMemorySaver::new();
        saver.put("t1", json!({})).await.unwrap();
        let err = saver
            .put_writes("t1", 99, vec![InterruptWrite::interrupt("n", json!({}))])
            .await;
        assert!(err.is_err());
    }
}
