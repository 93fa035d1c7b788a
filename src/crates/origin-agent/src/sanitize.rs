//! History sanitation before any model invocation.
//!
//! Three passes, all idempotent:
//! - orphan repair: an assistant message whose tool calls are not all
//!   answered by following tool results is demoted to plain text;
//! - invalid strip: `invalid_tool_calls` never reach a provider;
//! - status filter: internal status markers are never re-fed.

use notegraph_core::messages::Message;
use std::collections::HashSet;

const INTERRUPTED_PLACEHOLDER: &str = "[Previous action was interrupted]";

/// True when some assistant tool call lacks a following tool result.
pub fn has_orphan_tool_calls(messages: &[Message]) -> bool {
    for (idx, msg) in messages.iter().enumerate() {
        if !msg.is_assistant() || !msg.has_tool_calls() {
            continue;
        }
        let answered: HashSet<&str> = messages[idx + 1..]
            .iter()
            .filter(|m| m.is_tool())
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        let calls = msg.tool_calls.as_deref().unwrap_or_default();
        if calls.iter().any(|c| !answered.contains(c.id.as_str())) {
            return true;
        }
    }
    false
}

/// Demote assistants with unanswered tool calls to plain-text messages.
pub fn repair_orphans(messages: Vec<Message>) -> Vec<Message> {
    let snapshot = messages.clone();
    messages
        .into_iter()
        .enumerate()
        .map(|(idx, mut msg)| {
            if !msg.is_assistant() || !msg.has_tool_calls() {
                return msg;
            }
            let answered: HashSet<&str> = snapshot[idx + 1..]
                .iter()
                .filter(|m| m.is_tool())
                .filter_map(|m| m.tool_call_id.as_deref())
                .collect();
            let calls = msg.tool_calls.as_deref().unwrap_or_default();
            let orphaned = calls.iter().any(|c| !answered.contains(c.id.as_str()));
            if orphaned {
                let text = msg.text();
                msg.content = if text.trim().is_empty() {
                    INTERRUPTED_PLACEHOLDER.into()
                } else {
                    text.into()
                };
                msg.tool_calls = None;
                msg.invalid_tool_calls = None;
            }
            msg
        })
        .collect()
}

pub fn strip_invalid_tool_calls(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .map(|mut m| {
            m.invalid_tool_calls = None;
            m
        })
        .collect()
}

pub fn filter_status(messages: Vec<Message>) -> Vec<Message> {
    messages.into_iter().filter(|m| !m.is_status()).collect()
}

/// The full pipeline applied before every LLM call.
pub fn sanitize_for_llm(messages: &[Message]) -> Vec<Message> {
    strip_invalid_tool_calls(repair_orphans(filter_status(messages.to_vec())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::messages::ToolCall;
    use proptest::prelude::*;
    use serde_json::Map;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "read_note_content", Map::new())
    }

    fn paired_history() -> Vec<Message> {
        vec![
            Message::human("read my note").with_id("u1"),
            Message::assistant("")
                .with_id("a1")
                .with_tool_calls(vec![call("c1")]),
            Message::tool("Title: Plan\nContent: ...", "c1").with_id("t1"),
            Message::assistant("Here it is").with_id("a2"),
        ]
    }

    #[test]
    fn test_paired_history_untouched() {
        let history = paired_history();
        assert!(!has_orphan_tool_calls(&history));
        let repaired = repair_orphans(history.clone());
        assert_eq!(repaired, history);
    }

    #[test]
    fn test_orphan_demoted_to_text() {
        let history = vec![
            Message::human("rename it").with_id("u1"),
            Message::assistant("Renaming now")
                .with_id("a1")
                .with_tool_calls(vec![call("c1")]),
        ];
        assert!(has_orphan_tool_calls(&history));

        let repaired = repair_orphans(history);
        assert!(!has_orphan_tool_calls(&repaired));
        assert!(repaired[1].tool_calls.is_none());
        assert_eq!(repaired[1].text(), "Renaming now");
    }

    #[test]
    fn test_orphan_with_empty_text_gets_placeholder() {
        let history = vec![Message::assistant("")
            .with_id("a1")
            .with_tool_calls(vec![call("c1")])];
        let repaired = repair_orphans(history);
        assert_eq!(repaired[0].text(), "[Previous action was interrupted]");
    }

    #[test]
    fn test_partial_pairing_counts_as_orphan() {
        let history = vec![
            Message::assistant("")
                .with_id("a1")
                .with_tool_calls(vec![call("c1"), call("c2")]),
            Message::tool("ok", "c1").with_id("t1"),
        ];
        assert!(has_orphan_tool_calls(&history));
    }

    #[test]
    fn test_status_filtered_and_invalid_stripped() {
        let mut with_invalid = Message::assistant("answer").with_id("a1");
        with_invalid.invalid_tool_calls = Some(vec![]);
        let history = vec![
            Message::status("⚙️ tool finished").with_id("s1"),
            with_invalid,
        ];
        let clean = sanitize_for_llm(&history);
        assert_eq!(clean.len(), 1);
        assert!(clean[0].invalid_tool_calls.is_none());
    }

    proptest! {
        // Sanitizing a sanitized history is a no-op.
        #[test]
        fn prop_sanitize_idempotent(seed in proptest::collection::vec(0u8..6, 0..12)) {
            let mut history = Vec::new();
            for (i, kind) in seed.iter().enumerate() {
                let msg = match kind {
                    0 => Message::human(format!("q{i}")),
                    1 => Message::assistant(format!("a{i}")),
                    2 => Message::assistant("").with_tool_calls(vec![call(&format!("c{i}"))]),
                    3 => Message::tool("result", format!("c{}", i.saturating_sub(1))),
                    4 => Message::status("status"),
                    _ => Message::system("sys"),
                };
                history.push(msg.with_id(format!("m{i}")));
            }
            let once = sanitize_for_llm(&history);
            let twice = sanitize_for_llm(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
