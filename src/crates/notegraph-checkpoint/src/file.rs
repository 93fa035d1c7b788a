use crate::checkpoint::{Checkpoint, CheckpointId, CheckpointTuple, InterruptWrite};
use crate::error::{CheckpointError, Result};
use crate::serializer::Serializer;
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// On-disk record for one thread: the latest checkpoint plus the id counter.
///
/// Channel values and write payloads are stored as JSON text so the record
/// itself stays encodable by every [`Serializer`] (bincode cannot decode
/// free-form JSON values).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ThreadRecord {
    next_id: CheckpointId,
    latest: Option<StoredCheckpoint>,
    pending_writes: Vec<StoredWrite>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCheckpoint {
    v: i32,
    id: CheckpointId,
    ts: DateTime<Utc>,
    channel_values: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredWrite {
    task_path: String,
    channel: Option<String>,
    value: String,
}

impl StoredCheckpoint {
    fn into_checkpoint(self) -> Result<Checkpoint> {
        let channel_values: Value = serde_json::from_str(&self.channel_values)?;
        Ok(Checkpoint {
            v: self.v,
            id: self.id,
            ts: self.ts,
            channel_values,
        })
    }
}

impl StoredWrite {
    fn into_write(self) -> Result<InterruptWrite> {
        Ok(InterruptWrite {
            task_path: self.task_path,
            channel: self.channel,
            value: serde_json::from_str(&self.value)?,
        })
    }

    fn from_write(write: &InterruptWrite) -> Result<Self> {
        Ok(Self {
            task_path: write.task_path.clone(),
            channel: write.channel.clone(),
            value: serde_json::to_string(&write.value)?,
        })
    }
}

/// File-backed checkpoint saver, one record file per thread.
///
/// Writes go through a temp file followed by a rename so an interrupted
/// process never leaves a half-written record behind.
pub struct FileSaver {
    dir: PathBuf,
    serializer: Serializer,
    // Serializes record read-modify-write cycles across tasks.
    io_lock: Mutex<()>,
}

impl FileSaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            serializer: Serializer::Json,
            io_lock: Mutex::new(()),
        }
    }

    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    fn thread_path(&self, thread_id: &str) -> PathBuf {
        // Thread ids are client-supplied; keep only filename-safe characters.
        let safe: String = thread_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir
            .join(format!("{}.{}", safe, self.serializer.extension()))
    }

    async fn load_record(&self, path: &Path) -> Result<Option<ThreadRecord>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(self.serializer.from_bytes(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store_record(&self, path: &Path, record: &ThreadRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = self.serializer.to_bytes(record)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointSaver for FileSaver {
    async fn put(&self, thread_id: &str, channel_values: Value) -> Result<CheckpointId> {
        let _guard = self.io_lock.lock().await;
        let path = self.thread_path(thread_id);
        let mut record = self.load_record(&path).await?.unwrap_or(ThreadRecord {
            next_id: 1,
            latest: None,
            pending_writes: Vec::new(),
        });

        let id = record.next_id;
        record.next_id += 1;
        record.latest = Some(StoredCheckpoint {
            v: Checkpoint::CURRENT_VERSION,
            id,
            ts: Utc::now(),
            channel_values: serde_json::to_string(&channel_values)?,
        });
        // A new checkpoint supersedes writes bound to the previous one.
        record.pending_writes.clear();

        self.store_record(&path, &record).await?;
        Ok(id)
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let _guard = self.io_lock.lock().await;
        let record = self.load_record(&self.thread_path(thread_id)).await?;
        match record.and_then(|r| r.latest) {
            Some(stored) => Ok(Some(stored.into_checkpoint()?)),
            None => Ok(None),
        }
    }

    async fn get_latest_tuple(&self, thread_id: &str) -> Result<Option<CheckpointTuple>> {
        let _guard = self.io_lock.lock().await;
        let record = match self.load_record(&self.thread_path(thread_id)).await? {
            Some(r) => r,
            None => return Ok(None),
        };
        let checkpoint = match record.latest {
            Some(stored) => stored.into_checkpoint()?,
            None => return Ok(None),
        };
        let pending_writes = record
            .pending_writes
            .into_iter()
            .map(StoredWrite::into_write)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(CheckpointTuple {
            thread_id: thread_id.to_string(),
            checkpoint,
            pending_writes,
        }))
    }

    async fn put_writes(
        &self,
        thread_id: &str,
        checkpoint_id: CheckpointId,
        writes: Vec<InterruptWrite>,
    ) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let path = self.thread_path(thread_id);
        let mut record = self
            .load_record(&path)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;

        let latest_id = record.latest.as_ref().map(|c| c.id);
        if latest_id != Some(checkpoint_id) {
            return Err(CheckpointError::Invalid(format!(
                "writes target checkpoint {} but latest is {:?}",
                checkpoint_id, latest_id
            )));
        }

        for write in &writes {
            record.pending_writes.push(StoredWrite::from_write(write)?);
        }
        self.store_record(&path, &record).await?;
        Ok(())
    }

    async fn clear(&self, thread_id: &str) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let path = self.thread_path(thread_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let saver = FileSaver::new(dir.path());
            saver.put("t1", json!({"messages": [], "intent": "CHAT"})).await.unwrap()
        };

        // A fresh saver over the same directory sees the same state.
        let saver = FileSaver::new(dir.path());
        let latest = saver.get_latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(latest.channel_values["intent"], "CHAT");
    }

    #[tokio::test]
    async fn test_interrupt_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileSaver::new(dir.path());
        let id = saver.put("t1", json!({})).await.unwrap();
        saver
            .put_writes(
                "t1",
                id,
                vec![InterruptWrite::interrupt(
                    "run_one_tool",
                    json!({"approval_id": "a1", "tool": "delete_note"}),
                )],
            )
            .await
            .unwrap();

        let pending = saver.pending_interrupts("t1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].value["tool"], "delete_note");

        // Superseded by the next checkpoint.
        saver.put("t1", json!({})).await.unwrap();
        assert!(saver.pending_interrupts("t1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_checkpoint_write_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileSaver::new(dir.path());
        let first = saver.put("t1", json!({})).await.unwrap();
        saver.put("t1", json!({})).await.unwrap();
        let result = saver
            .put_writes("t1", first, vec![InterruptWrite::interrupt("n", json!({}))])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_bincode_backend() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FileSaver::new(dir.path()).with_serializer(Serializer::Bincode);
        saver.put("t1", json!({"x": [1, 2, 3]})).await.unwrap();
        let latest = saver.get_latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.channel_values["x"][2], 3);
    }
}
