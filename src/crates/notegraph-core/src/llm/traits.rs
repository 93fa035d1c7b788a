use crate::error::Result;
use crate::llm::config::{ChatRequest, ToolChoice};
use crate::llm::response::{ChatResponse, ChatTokenStream};
use crate::llm::tools::ToolDefinition;
use async_trait::async_trait;
use std::sync::Arc;

/// The provider contract.
///
/// `chat` serves the router and classifiers; `stream` serves user-visible
/// answers. Implementations must surface unparseable tool calls via
/// `Message::invalid_tool_calls` rather than failing the request.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    async fn stream(&self, request: ChatRequest) -> Result<ChatTokenStream>;
}

/// A model handle with a fixed tool surface.
///
/// Requests made through the bound handle carry the tool definitions and
/// force `parallel_tool_calls` off: the agent executes one tool per step.
#[derive(Clone)]
pub struct BoundChatModel {
    model: Arc<dyn ChatModel>,
    tools: Vec<ToolDefinition>,
}

impl BoundChatModel {
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    fn prepare(&self, mut request: ChatRequest) -> ChatRequest {
        request.config.tools = self.tools.clone();
        request.config.parallel_tool_calls = false;
        request
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.model.chat(self.prepare(request)).await
    }

    pub async fn chat_forced(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut request = self.prepare(request);
        request.config.tool_choice = ToolChoice::Required;
        self.model.chat(request).await
    }

    pub async fn stream(&self, request: ChatRequest) -> Result<ChatTokenStream> {
        self.model.stream(self.prepare(request)).await
    }
}

/// Bind a tool subset to a model; one tool call per step.
pub fn bind_tools(model: Arc<dyn ChatModel>, tools: Vec<ToolDefinition>) -> BoundChatModel {
    BoundChatModel { model, tools }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::response::ChatStreamChunk;
    use crate::messages::Message;
    use futures::StreamExt;

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
            assert!(!request.config.parallel_tool_calls);
            let names: Vec<&str> = request.config.tools.iter().map(|t| t.name.as_str()).collect();
            Ok(ChatResponse::from_message(Message::assistant(names.join(","))))
        }

        async fn stream(&self, request: ChatRequest) -> Result<ChatTokenStream> {
            let response = self.chat(request).await?;
            let chunks = vec![
                Ok(ChatStreamChunk::delta("ok")),
                Ok(ChatStreamChunk::finished(response)),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[tokio::test]
    async fn test_bound_model_injects_tools() {
        let bound = bind_tools(
            Arc::new(EchoModel),
            vec![
                ToolDefinition::new("search_knowledge", "search"),
                ToolDefinition::new("read_note_content", "read"),
            ],
        );
        let response = bound.chat(ChatRequest::new(vec![Message::human("hi")])).await.unwrap();
        assert_eq!(response.message.text(), "search_knowledge,read_note_content");
    }

    #[tokio::test]
    async fn test_bound_model_stream_finishes() {
        let bound = bind_tools(Arc::new(EchoModel), vec![]);
        let mut stream = bound
            .stream(ChatRequest::new(vec![Message::human("hi")]))
            .await
            .unwrap();
        let mut last = None;
        while let Some(chunk) = stream.next().await {
            last = Some(chunk.unwrap());
        }
        assert!(last.unwrap().response.is_some());
    }
}
