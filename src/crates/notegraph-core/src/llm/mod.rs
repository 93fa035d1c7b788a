//! Provider-facing chat model contract.
//!
//! Providers implement [`ChatModel`]; the agent layer binds a tool subset per
//! turn with [`bind_tools`] and relies on three capabilities: non-streaming
//! `chat` (router and classifiers), token streaming with an assembled final
//! response, and tool-call extraction including calls the provider failed to
//! parse (`invalid_tool_calls`).

pub mod config;
pub mod response;
pub mod tools;
pub mod traits;

pub use config::{ChatConfig, ChatRequest, ToolChoice};
pub use response::{ChatResponse, ChatStreamChunk, ChatTokenStream, UsageMetadata};
pub use tools::ToolDefinition;
pub use traits::{bind_tools, BoundChatModel, ChatModel};
