use crate::checkpoint::{Checkpoint, CheckpointId, CheckpointTuple, InterruptWrite};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Storage backend for per-thread checkpoints.
///
/// Implementations must serialize writes to the same `thread_id`: the
/// executor takes a per-thread lock around a whole run, but the store itself
/// must still be safe against concurrent `put` calls for distinct threads.
///
/// Checkpoint ids are monotone within a thread; the latest checkpoint is the
/// resumable state. Pending interrupt writes are bound to the checkpoint that
/// produced them — writing a newer checkpoint supersedes them.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Persist a new snapshot for the thread and return its id.
    async fn put(&self, thread_id: &str, channel_values: Value) -> Result<CheckpointId>;

    /// Fetch the latest checkpoint for a thread, if any.
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Fetch the latest checkpoint together with its pending writes.
    async fn get_latest_tuple(&self, thread_id: &str) -> Result<Option<CheckpointTuple>>;

    /// Attach pending writes to an existing checkpoint.
    async fn put_writes(
        &self,
        thread_id: &str,
        checkpoint_id: CheckpointId,
        writes: Vec<InterruptWrite>,
    ) -> Result<()>;

    /// Unresolved interrupt writes bound to the thread's latest checkpoint.
    ///
    /// Handles both the modern explicit-channel schema and the legacy
    /// path-tagged schema (see [`InterruptWrite::is_interrupt`]).
    async fn pending_interrupts(&self, thread_id: &str) -> Result<Vec<InterruptWrite>> {
        match self.get_latest_tuple(thread_id).await? {
            Some(tuple) => Ok(tuple
                .pending_writes
                .into_iter()
                .filter(|w| w.is_interrupt())
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Remove all state for a thread.
    async fn clear(&self, thread_id: &str) -> Result<()>;
}
