use crate::error::GraphError;
use crate::messages::Message;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl UsageMetadata {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// A complete (non-streaming) chat result.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,

    pub usage: Option<UsageMetadata>,

    pub metadata: HashMap<String, serde_json::Value>,
}

impl ChatResponse {
    pub fn from_message(message: Message) -> Self {
        Self {
            message,
            usage: None,
            metadata: HashMap::new(),
        }
    }
}

/// One streamed chunk. Text arrives in `delta`; the final chunk carries the
/// fully assembled response (including any accumulated tool calls).
#[derive(Debug, Clone)]
pub struct ChatStreamChunk {
    pub delta: String,

    pub response: Option<ChatResponse>,
}

impl ChatStreamChunk {
    pub fn delta(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            response: None,
        }
    }

    pub fn finished(response: ChatResponse) -> Self {
        Self {
            delta: String::new(),
            response: Some(response),
        }
    }
}

pub type ChatTokenStream =
    Pin<Box<dyn Stream<Item = Result<ChatStreamChunk, GraphError>> + Send>>;
