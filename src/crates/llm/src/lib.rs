//! LLM provider implementations.
//!
//! A single OpenAI-protocol client covers every gateway the app talks to
//! (OpenAI, GLM, DashScope, local servers exposing the same API). Provider
//! records live in a JSON config file managed by [`ProviderManager`]; the
//! active provider and model can be switched at runtime and per request.

pub mod config;
pub mod error;
pub mod manager;
pub mod openai;

pub use config::RemoteLlmConfig;
pub use error::{LlmError, Result};
pub use manager::{ProviderManager, ProviderRecord};
pub use openai::OpenAiCompatClient;

pub use notegraph_core::llm::{
    bind_tools, BoundChatModel, ChatConfig, ChatModel, ChatRequest, ChatResponse,
    ChatStreamChunk, ChatTokenStream, ToolChoice, ToolDefinition, UsageMetadata,
};
