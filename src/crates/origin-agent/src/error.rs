use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Graph error: {0}")]
    Graph(#[from] notegraph_core::GraphError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] notegraph_checkpoint::CheckpointError),

    #[error("LLM error: {0}")]
    Llm(#[from] llm::LlmError),

    #[error("Note store error: {0}")]
    Store(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
