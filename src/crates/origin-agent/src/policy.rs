//! Write-policy engine.
//!
//! A stateless decision over the candidate tool call: allow or deny plus a
//! stable code. Rules fire in a fixed order; the first match wins. The
//! engine never talks to the model — the semantic classification it consumes
//! was computed (and cached) earlier in the turn.

use crate::state::AgentMode;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDecision {
    pub action: PolicyAction,

    /// Stable machine-readable tag.
    pub code: &'static str,

    pub reason: String,
}

impl PolicyDecision {
    fn allow(code: &'static str, reason: impl Into<String>) -> Self {
        Self {
            action: PolicyAction::Allow,
            code,
            reason: reason.into(),
        }
    }

    fn deny(code: &'static str, reason: impl Into<String>) -> Self {
        Self {
            action: PolicyAction::Deny,
            code,
            reason: reason.into(),
        }
    }

    pub fn is_allow(&self) -> bool {
        self.action == PolicyAction::Allow
    }
}

#[derive(Debug, Clone)]
pub struct PolicyInput<'a> {
    pub tool_name: &'a str,
    pub is_write_tool: bool,
    pub agent_mode: AgentMode,
    pub auto_accept_writes: bool,
    pub last_user_text: Option<&'a str>,
    pub write_authorized: bool,
}

/// Phrases signalling feedback about a previous categorization action.
const CATEGORY_FEEDBACK_CUES: &[&str] = &[
    "category",
    "categorize",
    "categorized",
    "categorization",
    "分类",
    "归类",
];

/// Phrases that explicitly request a brand-new note.
const CREATE_NOTE_CUES: &[&str] = &[
    "create a note",
    "create a new note",
    "new note",
    "make a note",
    "写一篇",
    "新建笔记",
    "创建笔记",
    "创建一篇",
];

fn is_category_feedback_without_create(text: &str) -> bool {
    let lower = text.to_lowercase();
    let mentions_category = CATEGORY_FEEDBACK_CUES.iter().any(|c| lower.contains(c));
    let asks_create = CREATE_NOTE_CUES.iter().any(|c| lower.contains(c));
    mentions_category && !asks_create
}

pub fn evaluate(input: &PolicyInput<'_>) -> PolicyDecision {
    if !input.is_write_tool {
        return PolicyDecision::allow("non_write_tool", "tool does not modify notes");
    }

    if input.agent_mode == AgentMode::Ask {
        return PolicyDecision::deny(
            "ask_mode_read_only",
            "ask mode is read-only; switch to agent mode to modify notes",
        );
    }

    let last_user_text = match input.last_user_text.map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => {
            return PolicyDecision::deny(
                "missing_user_intent",
                "no user request found to justify a write",
            )
        }
    };

    if !input.auto_accept_writes {
        return PolicyDecision::allow(
            "manual_review_required",
            "write allowed pending human approval",
        );
    }

    if input.write_authorized {
        return PolicyDecision::allow(
            "semantic_allow_write",
            "user request asks to modify persisted notes",
        );
    }

    if input.tool_name == "create_note" && is_category_feedback_without_create(last_user_text) {
        return PolicyDecision::deny(
            "duplicate_create_blocked_for_category_feedback",
            "message reads as feedback about categorization, not a request for a new note",
        );
    }

    PolicyDecision::deny(
        "semantic_deny_write",
        "user request does not ask to modify persisted notes",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn base<'a>() -> PolicyInput<'a> {
        PolicyInput {
            tool_name: "update_note",
            is_write_tool: true,
            agent_mode: AgentMode::Agent,
            auto_accept_writes: true,
            last_user_text: Some("please fix the typos in this note"),
            write_authorized: true,
        }
    }

    #[test]
    fn test_non_write_tool_always_allowed() {
        let input = PolicyInput {
            tool_name: "search_knowledge",
            is_write_tool: false,
            agent_mode: AgentMode::Ask,
            last_user_text: None,
            ..base()
        };
        let decision = evaluate(&input);
        assert!(decision.is_allow());
        assert_eq!(decision.code, "non_write_tool");
    }

    #[test]
    fn test_ask_mode_blocks_writes() {
        let input = PolicyInput {
            agent_mode: AgentMode::Ask,
            ..base()
        };
        let decision = evaluate(&input);
        assert_eq!(decision.code, "ask_mode_read_only");
        assert!(!decision.is_allow());
    }

    #[test]
    fn test_missing_user_intent_denied() {
        let input = PolicyInput {
            last_user_text: Some("   "),
            ..base()
        };
        assert_eq!(evaluate(&input).code, "missing_user_intent");
    }

    #[test]
    fn test_manual_review_allows_before_classifier() {
        let input = PolicyInput {
            auto_accept_writes: false,
            write_authorized: false,
            ..base()
        };
        let decision = evaluate(&input);
        assert!(decision.is_allow());
        assert_eq!(decision.code, "manual_review_required");
    }

    #[test]
    fn test_semantic_allow_and_deny() {
        assert_eq!(evaluate(&base()).code, "semantic_allow_write");

        let denied = PolicyInput {
            write_authorized: false,
            last_user_text: Some("summarize this note for me"),
            ..base()
        };
        assert_eq!(evaluate(&denied).code, "semantic_deny_write");
    }

    #[test]
    fn test_duplicate_create_blocked_for_category_feedback() {
        let input = PolicyInput {
            tool_name: "create_note",
            write_authorized: false,
            last_user_text: Some("the category you assigned looks wrong"),
            ..base()
        };
        let decision = evaluate(&input);
        assert_eq!(decision.code, "duplicate_create_blocked_for_category_feedback");

        // An explicit create request is not blocked by the heuristic.
        let explicit = PolicyInput {
            last_user_text: Some("create a new note about category theory"),
            ..input
        };
        assert_eq!(evaluate(&explicit).code, "semantic_deny_write");
    }

    proptest! {
        // Identical inputs always produce identical decisions.
        #[test]
        fn prop_decision_deterministic(
            is_write in any::<bool>(),
            ask_mode in any::<bool>(),
            auto_accept in any::<bool>(),
            authorized in any::<bool>(),
            text in proptest::option::of("[a-z 分类]{0,40}"),
        ) {
            let input = PolicyInput {
                tool_name: "create_note",
                is_write_tool: is_write,
                agent_mode: if ask_mode { AgentMode::Ask } else { AgentMode::Agent },
                auto_accept_writes: auto_accept,
                last_user_text: text.as_deref(),
                write_authorized: authorized,
            };
            let first = evaluate(&input);
            let second = evaluate(&input);
            prop_assert_eq!(first, second);
        }
    }
}
