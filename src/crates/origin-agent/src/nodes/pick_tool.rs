use super::parse_state;
use notegraph_core::error::Result;
use notegraph_core::node::NodeContext;
use serde_json::{json, Value};

/// Select the single tool for the next execution step: the first call on the
/// last assistant message. Absent calls write null and the loop ends.
pub async fn pick_one_tool_node(value: Value, _ctx: NodeContext) -> Result<Value> {
    let state = parse_state(&value)?;
    let next = state
        .last_assistant()
        .and_then(|m| m.tool_calls.as_ref())
        .and_then(|calls| calls.first())
        .cloned();
    Ok(json!({ "next_tool_call": next }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::messages::{Message, ToolCall};
    use serde_json::Map;
    use tokio::sync::mpsc;

    fn ctx() -> NodeContext {
        let (tx, _rx) = mpsc::unbounded_channel();
        NodeContext::new("t1", "pick_one_tool", None, tx)
    }

    #[tokio::test]
    async fn test_picks_first_call() {
        let mut args = Map::new();
        args.insert("query".into(), "rust".into());
        let state = json!({
            "messages": [
                Message::human("find my rust notes"),
                Message::assistant("").with_tool_calls(vec![
                    ToolCall::new("c1", "search_knowledge", args),
                ]),
            ]
        });
        let update = pick_one_tool_node(state, ctx()).await.unwrap();
        assert_eq!(update["next_tool_call"]["id"], "c1");
    }

    #[tokio::test]
    async fn test_no_calls_writes_null() {
        let state = json!({
            "messages": [Message::assistant("done")]
        });
        let update = pick_one_tool_node(state, ctx()).await.unwrap();
        assert!(update["next_tool_call"].is_null());
    }
}
