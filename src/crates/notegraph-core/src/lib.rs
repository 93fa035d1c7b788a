//! notegraph-core — a checkpointed, interruptible state-machine executor.
//!
//! The engine runs an explicit graph of named nodes over a JSON channel map.
//! Each node receives the full state and returns a *partial update* (a map of
//! changed channels) which a per-channel reducer merges back: the `messages`
//! channel appends with id-based deduplication, every other channel replaces.
//! After every node step the executor persists a checkpoint, so a thread can
//! resume after a crash or a human-in-the-loop interrupt.
//!
//! Suspension uses the inline-interrupt pattern: a node calls
//! [`node::NodeContext::interrupt`] with a payload; on first execution this
//! surfaces as [`error::GraphError::Suspended`], the executor records an
//! interrupt write and halts. When the client resumes, the same node runs
//! again and `interrupt` returns the resume decision instead.

pub mod channels;
pub mod error;
pub mod executor;
pub mod graph;
pub mod llm;
pub mod messages;
pub mod node;
pub mod stream;

pub use channels::{ChannelReducer, StateSchema};
pub use error::{GraphError, Result};
pub use executor::{CompiledGraph, GraphInput};
pub use graph::{StateGraph, END, START};
pub use messages::{add_messages, ContentPart, InvalidToolCall, Message, MessageContent, MessageRole, ToolCall};
pub use node::{InterruptRecord, NodeContext};
pub use stream::GraphEvent;
