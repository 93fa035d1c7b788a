use crate::llm::tools::ToolDefinition;
use crate::messages::Message;

/// How the model is steered toward tool use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// Model decides freely.
    #[default]
    Auto,
    /// Model must emit at least one tool call.
    Required,
    /// Tool calls disabled for this request.
    None,
}

#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    pub temperature: Option<f32>,

    pub max_tokens: Option<usize>,

    pub tools: Vec<ToolDefinition>,

    /// Kept `false` for the agent loop: one tool per step.
    pub parallel_tool_calls: bool,

    pub tool_choice: ToolChoice,

    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,

    pub config: ChatConfig,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            config: ChatConfig::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.config.parallel_tool_calls = parallel;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.config.tool_choice = choice;
        self
    }
}
