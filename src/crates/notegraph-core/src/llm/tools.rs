use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool surface exposed to the model: name, description, JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let tool = ToolDefinition::new("read_note_content", "Read a note by id")
            .with_parameters(json!({"type": "object", "properties": {"note_id": {"type": "string"}}}));
        assert_eq!(tool.name, "read_note_content");
        assert!(tool.parameters.is_some());
    }
}
