//! OpenAI-protocol chat client.
//!
//! One client serves every compatible gateway. Tool calls arrive with their
//! arguments as a JSON string; arguments that fail to parse are preserved on
//! the message as `invalid_tool_calls` so the agent layer can attempt
//! recovery instead of dropping the call.

use crate::config::RemoteLlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use futures::StreamExt;
use notegraph_core::error::Result as GraphResult;
use notegraph_core::llm::{
    ChatModel, ChatRequest, ChatResponse, ChatStreamChunk, ChatTokenStream, ToolChoice,
    ToolDefinition, UsageMetadata,
};
use notegraph_core::messages::{
    ContentPart, InvalidToolCall, Message, MessageContent, MessageRole, ToolCall,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Clone)]
pub struct OpenAiCompatClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl OpenAiCompatClient {
    pub fn new(config: RemoteLlmConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(LlmError::Http)?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn convert_message(msg: &Message) -> WireMessage {
        let role = match msg.role {
            MessageRole::System => "system",
            MessageRole::Human => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };

        let content = match &msg.content {
            MessageContent::Text(s) => Value::String(s.clone()),
            MessageContent::Parts(parts) => Value::Array(
                parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::Text { text } => json!({"type": "text", "text": text}),
                        ContentPart::Image { url } => {
                            json!({"type": "image_url", "image_url": {"url": url}})
                        }
                    })
                    .collect(),
            ),
        };

        let tool_calls = msg.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunction {
                        name: c.name.clone(),
                        arguments: serde_json::to_string(&c.args).unwrap_or_else(|_| "{}".into()),
                    },
                })
                .collect()
        });

        WireMessage {
            role: role.to_string(),
            content: Some(content),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<WireMessage> = request.messages.iter().map(Self::convert_message).collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": stream,
        });

        if let Some(t) = request.config.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = request.config.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if !request.config.stop_sequences.is_empty() {
            body["stop"] = json!(request.config.stop_sequences);
        }
        if !request.config.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .config
                    .tools
                    .iter()
                    .map(tool_to_wire)
                    .collect(),
            );
            body["parallel_tool_calls"] = json!(request.config.parallel_tool_calls);
            match request.config.tool_choice {
                ToolChoice::Auto => {}
                ToolChoice::Required => body["tool_choice"] = json!("required"),
                ToolChoice::None => body["tool_choice"] = json!("none"),
            }
        }
        body
    }

    async fn post(&self, body: &Value) -> crate::Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Authentication(text),
                429 => LlmError::RateLimit(text),
                _ => LlmError::Provider(format!("API error {}: {}", status, text)),
            });
        }
        Ok(response)
    }
}

/// Parse one wire tool call; unparseable arguments become an invalid call.
fn parse_tool_call(wire: WireToolCall) -> std::result::Result<ToolCall, InvalidToolCall> {
    match serde_json::from_str::<Map<String, Value>>(&wire.function.arguments) {
        Ok(args) => Ok(ToolCall::new(wire.id, wire.function.name, args)),
        Err(e) => Err(InvalidToolCall {
            id: Some(wire.id),
            name: Some(wire.function.name),
            args: wire.function.arguments,
            error: Some(e.to_string()),
        }),
    }
}

fn assemble_message(content: Option<String>, wire_calls: Vec<WireToolCall>) -> Message {
    let mut tool_calls = Vec::new();
    let mut invalid = Vec::new();
    for wire in wire_calls {
        match parse_tool_call(wire) {
            Ok(call) => tool_calls.push(call),
            Err(bad) => invalid.push(bad),
        }
    }

    let mut message = Message::assistant(content.unwrap_or_default());
    if !tool_calls.is_empty() {
        message = message.with_tool_calls(tool_calls);
    }
    if !invalid.is_empty() {
        message = message.with_invalid_tool_calls(invalid);
    }
    message
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters.clone().unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        }
    })
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    async fn chat(&self, request: ChatRequest) -> GraphResult<ChatResponse> {
        let body = self.build_body(&request, false);
        let response = self.post(&body).await?;
        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response carried no choices".to_string()))?;

        let message = assemble_message(
            choice.message.content.and_then(|c| c.as_str().map(String::from)),
            choice.message.tool_calls.unwrap_or_default(),
        );

        let usage = wire
            .usage
            .map(|u| UsageMetadata::new(u.prompt_tokens, u.completion_tokens));

        Ok(ChatResponse {
            message,
            usage,
            metadata: Default::default(),
        })
    }

    async fn stream(&self, request: ChatRequest) -> GraphResult<ChatTokenStream> {
        let body = self.build_body(&request, true);
        let response = self.post(&body).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            let mut content = String::new();
            // Tool-call deltas arrive indexed; arguments accumulate as text.
            let mut calls: BTreeMap<u64, PartialToolCall> = BTreeMap::new();
            let mut finished = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(LlmError::Http(e).into());
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(data) = line.strip_prefix("data:") else { continue };
                    let data = data.trim();
                    if data == "[DONE]" {
                        finished = true;
                        break;
                    }

                    let event: WireStreamEvent = match serde_json::from_str(data) {
                        Ok(e) => e,
                        Err(e) => {
                            debug!(error = %e, "skipping malformed stream line");
                            continue;
                        }
                    };

                    for choice in event.choices {
                        if let Some(delta_content) = choice.delta.content {
                            if !delta_content.is_empty() {
                                content.push_str(&delta_content);
                                yield Ok(ChatStreamChunk::delta(delta_content));
                            }
                        }
                        for delta_call in choice.delta.tool_calls.unwrap_or_default() {
                            let slot = calls.entry(delta_call.index).or_default();
                            if let Some(id) = delta_call.id {
                                slot.id = id;
                            }
                            if let Some(f) = delta_call.function {
                                if let Some(name) = f.name {
                                    slot.name.push_str(&name);
                                }
                                if let Some(args) = f.arguments {
                                    slot.arguments.push_str(&args);
                                }
                            }
                        }
                    }
                }

                if finished {
                    break;
                }
            }

            let wire_calls: Vec<WireToolCall> = calls
                .into_values()
                .map(|p| WireToolCall {
                    id: if p.id.is_empty() { ToolCall::generate_id() } else { p.id },
                    kind: "function".to_string(),
                    function: WireFunction {
                        name: p.name,
                        arguments: if p.arguments.is_empty() { "{}".to_string() } else { p.arguments },
                    },
                })
                .collect();

            let message = assemble_message(Some(content), wire_calls);
            yield Ok(ChatStreamChunk::finished(ChatResponse::from_message(message)));
        };

        Ok(Box::pin(stream))
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    content: Option<Value>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct WireStreamEvent {
    choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
}

#[derive(Debug, Deserialize, Default)]
struct WireDelta {
    content: Option<String>,
    tool_calls: Option<Vec<WireDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireDeltaToolCall {
    #[serde(default)]
    index: u64,
    id: Option<String>,
    function: Option<WireDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct WireDeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_call_valid_args() {
        let wire = WireToolCall {
            id: "call_1".to_string(),
            kind: "function".to_string(),
            function: WireFunction {
                name: "rename_note".to_string(),
                arguments: r#"{"note_id": "n1", "new_title": "Weekly Plan"}"#.to_string(),
            },
        };
        let call = parse_tool_call(wire).unwrap();
        assert_eq!(call.name, "rename_note");
        assert_eq!(call.args["new_title"], "Weekly Plan");
    }

    #[test]
    fn test_parse_tool_call_bad_args_preserved() {
        let wire = WireToolCall {
            id: "call_2".to_string(),
            kind: "function".to_string(),
            function: WireFunction {
                name: "update_note".to_string(),
                arguments: r#"{"note_id": "n1", "instruction": "#.to_string(),
            },
        };
        let invalid = parse_tool_call(wire).unwrap_err();
        assert_eq!(invalid.name.as_deref(), Some("update_note"));
        assert!(invalid.args.contains("instruction"));
    }

    #[test]
    fn test_assemble_message_strips_nothing_without_calls() {
        let message = assemble_message(Some("plain answer".to_string()), vec![]);
        assert_eq!(message.text(), "plain answer");
        assert!(message.tool_calls.is_none());
        assert!(message.invalid_tool_calls.is_none());
    }

    #[test]
    fn test_tool_wire_format() {
        let wire = tool_to_wire(&ToolDefinition::new("search_knowledge", "Semantic search"));
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "search_knowledge");
        assert!(wire["function"]["parameters"].is_object());
    }
}
