//! Channel semantics for the graph state.
//!
//! State is a flat JSON object of named channels. Nodes emit partial updates
//! (only the channels they changed); the schema decides how each update
//! merges into the state: `messages` appends through the id-deduplicating
//! reducer, everything else replaces wholesale.

use crate::error::{GraphError, Result};
use crate::messages::{add_messages, Message};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelReducer {
    /// Last writer wins.
    #[default]
    Replace,
    /// Merge via [`add_messages`].
    AppendMessages,
}

/// Per-channel reducer table. Channels without an entry replace.
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    reducers: HashMap<String, ChannelReducer>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_channel(mut self, name: impl Into<String>) -> Self {
        self.reducers
            .insert(name.into(), ChannelReducer::AppendMessages);
        self
    }

    pub fn reducer_for(&self, channel: &str) -> ChannelReducer {
        self.reducers.get(channel).copied().unwrap_or_default()
    }

    /// Merge a partial update into `state`, returning the changed channel names.
    pub fn apply(&self, state: &mut Value, update: &Value) -> Result<Vec<String>> {
        let update_map = match update.as_object() {
            Some(map) => map,
            None if update.is_null() => return Ok(Vec::new()),
            None => {
                return Err(GraphError::Execution(
                    "node update must be a JSON object".to_string(),
                ))
            }
        };

        if !state.is_object() {
            *state = Value::Object(serde_json::Map::new());
        }
        let state_map = state.as_object_mut().expect("state coerced to object");

        let mut changed = Vec::with_capacity(update_map.len());
        for (key, value) in update_map {
            match self.reducer_for(key) {
                ChannelReducer::Replace => {
                    state_map.insert(key.clone(), value.clone());
                }
                ChannelReducer::AppendMessages => {
                    let left: Vec<Message> = match state_map.get(key) {
                        Some(v) => serde_json::from_value(v.clone())?,
                        None => Vec::new(),
                    };
                    let right: Vec<Message> = serde_json::from_value(value.clone())?;
                    let merged = add_messages(left, right);
                    state_map.insert(key.clone(), serde_json::to_value(merged)?);
                }
            }
            changed.push(key.clone());
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> StateSchema {
        StateSchema::new().with_message_channel("messages")
    }

    #[test]
    fn test_replace_channel() {
        let mut state = json!({"intent": "CHAT", "tool_call_count": 0});
        schema()
            .apply(&mut state, &json!({"intent": "TASK"}))
            .unwrap();
        assert_eq!(state["intent"], "TASK");
        assert_eq!(state["tool_call_count"], 0);
    }

    #[test]
    fn test_messages_append() {
        let mut state = json!({});
        let m1 = serde_json::to_value(vec![Message::human("q").with_id("1")]).unwrap();
        let m2 = serde_json::to_value(vec![Message::assistant("a").with_id("2")]).unwrap();
        let schema = schema();
        schema.apply(&mut state, &json!({ "messages": m1 })).unwrap();
        schema.apply(&mut state, &json!({ "messages": m2 })).unwrap();

        let messages: Vec<Message> = serde_json::from_value(state["messages"].clone()).unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_null_update_is_noop() {
        let mut state = json!({"x": 1});
        let changed = schema().apply(&mut state, &Value::Null).unwrap();
        assert!(changed.is_empty());
        assert_eq!(state["x"], 1);
    }

    #[test]
    fn test_non_object_update_rejected() {
        let mut state = json!({});
        assert!(schema().apply(&mut state, &json!(42)).is_err());
    }
}
