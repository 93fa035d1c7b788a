//! Tool registry.
//!
//! Tools are named async callables returning plain strings; a failure is a
//! string starting with `Error:` rather than a Rust error, so the result can
//! always be appended to the log as a tool message. Write capability is
//! declared per tool and cross-checked against [`WRITE_TOOLS`].

pub mod notes;

use async_trait::async_trait;
use notegraph_core::llm::ToolDefinition;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// The finite set of tool names recognized as write-capable.
pub const WRITE_TOOLS: &[&str] = &[
    "create_note",
    "update_note",
    "patch_note",
    "rename_note",
    "delete_note",
    "set_note_category",
];

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    fn is_write(&self) -> bool {
        false
    }

    /// Execute; errors are returned as strings prefixed with `Error:`.
    async fn invoke(&self, args: &Map<String, Value>) -> String;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        let name = tool.name().to_string();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_write_tool(&self, name: &str) -> bool {
        WRITE_TOOLS.contains(&name)
            || self.tools.get(name).map(|t| t.is_write()).unwrap_or(false)
    }

    /// Definitions for binding; `read_only` filters out write tools.
    pub fn definitions(&self, read_only: bool) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .filter(|tool| !read_only || !self.is_write_tool(tool.name()))
            .map(|tool| {
                ToolDefinition::new(tool.name(), tool.description())
                    .with_parameters(tool.parameters())
            })
            .collect()
    }

    pub async fn invoke(&self, name: &str, args: &Map<String, Value>) -> String {
        match self.tools.get(name) {
            Some(tool) => tool.invoke(args).await,
            None => format!("Error: Tool {} not found.", name),
        }
    }
}

/// A tool result is a failure when its stripped content starts with `Error:`.
pub fn result_is_error(result: &str) -> bool {
    result.trim_start().starts_with("Error:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FakeTool {
        name: &'static str,
        write: bool,
    }

    #[async_trait]
    impl AgentTool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fake"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        fn is_write(&self) -> bool {
            self.write
        }

        async fn invoke(&self, _args: &Map<String, Value>) -> String {
            format!("ran {}", self.name)
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FakeTool { name: "search_knowledge", write: false }));
        registry.register(Arc::new(FakeTool { name: "update_note", write: true }));
        registry
    }

    #[test]
    fn test_read_only_binding_excludes_writes() {
        let registry = registry();
        let all: Vec<String> = registry.definitions(false).iter().map(|d| d.name.clone()).collect();
        let read_only: Vec<String> = registry.definitions(true).iter().map(|d| d.name.clone()).collect();
        assert_eq!(all, vec!["search_knowledge", "update_note"]);
        assert_eq!(read_only, vec!["search_knowledge"]);
    }

    #[test]
    fn test_write_tool_lookup_covers_both_sources() {
        let registry = registry();
        assert!(registry.is_write_tool("update_note"));
        // In the static set even if not registered.
        assert!(registry.is_write_tool("delete_note"));
        assert!(!registry.is_write_tool("search_knowledge"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_string() {
        let registry = registry();
        let result = registry.invoke("bogus", &Map::new()).await;
        assert!(result_is_error(&result));
    }

    #[test]
    fn test_error_prefix_detection() {
        assert!(result_is_error("Error: Note n1 not found."));
        assert!(result_is_error("  Error: nope"));
        assert!(!result_is_error("Successfully updated note"));
    }
}
