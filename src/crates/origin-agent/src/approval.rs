//! Human approval gate for write tools.
//!
//! When auto-accept is off, a permitted write tool suspends the graph with an
//! [`ApprovalRequest`] payload. The client answers with a resume decision in
//! one of three shapes: a bare bool, an approve/reject token string, or a
//! structured object carrying the `approval_id` and optional argument
//! overrides. A decision naming the wrong `approval_id` is a reject.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const APPROVAL_KIND: &str = "write_tool_approval";

/// Tokens accepted as an approval, in any casing.
pub const APPROVE_TOKENS: &[&str] = &[
    "approve", "accept", "yes", "y", "ok", "okay", "true", "continue",
    "继续", "同意", "是", "好", "好的", "确认", "批准",
];

/// Tokens accepted as a rejection.
pub const REJECT_TOKENS: &[&str] = &[
    "reject", "cancel", "no", "n", "false", "stop",
    "拒绝", "取消", "否", "不要", "不",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub kind: String,

    pub approval_id: String,

    pub tool: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_title: Option<String>,

    pub args: Map<String, Value>,

    /// What the write touches: a single note or the whole workspace.
    pub scope: String,
}

impl ApprovalRequest {
    pub fn new(
        tool: impl Into<String>,
        args: Map<String, Value>,
        note_title: Option<String>,
    ) -> Self {
        let note_id = args
            .get("note_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let scope = if note_id.is_some() { "note" } else { "workspace" };
        Self {
            kind: APPROVAL_KIND.to_string(),
            approval_id: Uuid::new_v4().to_string(),
            tool: tool.into(),
            note_id,
            note_title,
            args,
            scope: scope.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeDecision {
    Approved {
        /// Caller-supplied argument overrides; keys win over the original.
        args_override: Option<Map<String, Value>>,
    },
    Rejected,
}

impl ResumeDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, ResumeDecision::Approved { .. })
    }
}

fn token_decision(token: &str) -> Option<bool> {
    let normalized = token.trim().to_lowercase();
    if APPROVE_TOKENS.iter().any(|t| *t == normalized) {
        Some(true)
    } else if REJECT_TOKENS.iter().any(|t| *t == normalized) {
        Some(false)
    } else {
        None
    }
}

/// Is this user text an inline approve/reject answer?
pub fn parse_inline_token(text: &str) -> Option<bool> {
    token_decision(text)
}

/// Interpret a resume payload against the expected `approval_id`.
///
/// Anything unrecognized is a reject; a write must never run on an
/// ambiguous answer.
pub fn parse_decision(payload: &Value, expected_approval_id: &str) -> ResumeDecision {
    match payload {
        Value::Bool(true) => ResumeDecision::Approved {
            args_override: None,
        },
        Value::Bool(false) => ResumeDecision::Rejected,
        Value::String(s) => match token_decision(s) {
            Some(true) => ResumeDecision::Approved {
                args_override: None,
            },
            _ => ResumeDecision::Rejected,
        },
        Value::Object(obj) => {
            if let Some(id) = obj.get("approval_id").and_then(Value::as_str) {
                if id != expected_approval_id {
                    return ResumeDecision::Rejected;
                }
            }
            let approved = match obj.get("action") {
                Some(Value::String(action)) => token_decision(action).unwrap_or(false),
                Some(Value::Bool(b)) => *b,
                _ => false,
            };
            if !approved {
                return ResumeDecision::Rejected;
            }
            let args_override = obj
                .get("args")
                .and_then(Value::as_object)
                .cloned();
            ResumeDecision::Approved { args_override }
        }
        _ => ResumeDecision::Rejected,
    }
}

/// Merge approved argument overrides; caller-provided keys win.
pub fn merge_args(
    mut original: Map<String, Value>,
    overrides: Option<Map<String, Value>>,
) -> Map<String, Value> {
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            original.insert(key, value);
        }
    }
    original
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bool_forms() {
        assert!(parse_decision(&json!(true), "a1").is_approved());
        assert_eq!(parse_decision(&json!(false), "a1"), ResumeDecision::Rejected);
    }

    #[test]
    fn test_string_forms() {
        assert!(parse_decision(&json!("approve"), "a1").is_approved());
        assert!(parse_decision(&json!("YES"), "a1").is_approved());
        assert!(parse_decision(&json!("继续"), "a1").is_approved());
        assert_eq!(parse_decision(&json!("reject"), "a1"), ResumeDecision::Rejected);
        assert_eq!(parse_decision(&json!("whatever"), "a1"), ResumeDecision::Rejected);
    }

    #[test]
    fn test_object_form_with_matching_id() {
        let decision = parse_decision(
            &json!({"action": "approve", "approval_id": "a1", "args": {"new_title": "Final"}}),
            "a1",
        );
        match decision {
            ResumeDecision::Approved { args_override } => {
                assert_eq!(args_override.unwrap()["new_title"], "Final");
            }
            _ => panic!("expected approval"),
        }
    }

    #[test]
    fn test_mismatched_approval_id_is_reject() {
        let decision = parse_decision(&json!({"action": "approve", "approval_id": "other"}), "a1");
        assert_eq!(decision, ResumeDecision::Rejected);
    }

    #[test]
    fn test_object_without_action_is_reject() {
        assert_eq!(
            parse_decision(&json!({"approval_id": "a1"}), "a1"),
            ResumeDecision::Rejected
        );
    }

    #[test]
    fn test_merge_args_overrides_win() {
        let original = json!({"note_id": "n1", "new_title": "Draft"})
            .as_object()
            .unwrap()
            .clone();
        let overrides = json!({"new_title": "Weekly Plan"}).as_object().unwrap().clone();
        let merged = merge_args(original, Some(overrides));
        assert_eq!(merged["note_id"], "n1");
        assert_eq!(merged["new_title"], "Weekly Plan");
    }

    #[test]
    fn test_request_scope() {
        let with_note = ApprovalRequest::new(
            "rename_note",
            json!({"note_id": "1700000000000-abcdef012"}).as_object().unwrap().clone(),
            Some("Plan".into()),
        );
        assert_eq!(with_note.scope, "note");
        assert_eq!(with_note.kind, APPROVAL_KIND);

        let without = ApprovalRequest::new("create_note", Map::new(), None);
        assert_eq!(without.scope, "workspace");
    }

    #[test]
    fn test_inline_tokens() {
        assert_eq!(parse_inline_token("yes"), Some(true));
        assert_eq!(parse_inline_token(" 继续 "), Some(true));
        assert_eq!(parse_inline_token("取消"), Some(false));
        assert_eq!(parse_inline_token("please rename it"), None);
    }
}
