//! Checkpoint persistence for notegraph threads.
//!
//! A thread is a durable conversation identifier. After every graph step the
//! executor snapshots the full channel state and hands it to a
//! [`CheckpointSaver`]; checkpoint ids are monotone per thread and the latest
//! checkpoint is the resumable state. A checkpoint may carry pending
//! interrupt writes (unresolved human-approval requests) which the saver
//! exposes through [`CheckpointSaver::pending_interrupts`].
//!
//! Two reference backends are provided:
//! - [`InMemorySaver`] — keeps full per-thread history; used in tests.
//! - [`FileSaver`] — one serialized record per thread on disk; survives
//!   process restarts.

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod serializer;
pub mod traits;

pub use checkpoint::{Checkpoint, CheckpointId, CheckpointTuple, InterruptWrite, INTERRUPT_CHANNEL};
pub use error::{CheckpointError, Result};
pub use file::FileSaver;
pub use memory::InMemorySaver;
pub use serializer::Serializer;
pub use traits::CheckpointSaver;
