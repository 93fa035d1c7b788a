use crate::node::InterruptRecord;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Graph validation failed: {0}")]
    Validation(String),

    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution { node: String, error: String },

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Graph suspended in node '{}'", .0.node)]
    Suspended(InterruptRecord),

    #[error("No pending interrupt for thread '{0}'")]
    NoPendingInterrupt(String),

    #[error("Recursion limit of {0} steps reached")]
    RecursionLimit(usize),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] notegraph_checkpoint::CheckpointError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("{0}")]
    Custom(String),
}

impl GraphError {
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }
}
