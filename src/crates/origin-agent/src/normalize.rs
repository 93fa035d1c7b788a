//! Tool-argument normalization.
//!
//! The model frequently omits `note_id` or hands back a mangled one. The
//! normalizer substitutes the state's preferred id: the active note for
//! write tools, the referenced (`@`-mentioned) note for read-content tools
//! when the user's wording points at it. The wording cues are configuration,
//! not code — they are natural-language heuristics and deployments tune
//! them.

use crate::state::AgentState;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Lexicon for the referenced-note heuristic.
#[derive(Debug, Clone)]
pub struct NormalizeConfig {
    /// Phrases indicating the user means the referenced/attached note.
    pub referenced_cues: Vec<String>,

    /// Phrases explicitly pinning the current note; these win.
    pub current_cues: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            referenced_cues: [
                "attached",
                "referenced note",
                "the note i mentioned",
                "that note",
                "not the current",
                "引用的笔记",
                "提到的笔记",
                "那篇笔记",
                "不是当前",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            current_cues: [
                "current note",
                "this note",
                "this page",
                "当前笔记",
                "这篇笔记",
                "本页",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

fn timestamp_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{13}-[0-9a-f]{9}$").expect("valid regex"))
}

fn uuid_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F-]{32,36}$").expect("valid regex"))
}

/// A plausible persisted note id: timestamped or UUID-like.
pub fn note_id_valid(id: &str) -> bool {
    timestamp_id_re().is_match(id) || uuid_like_re().is_match(id)
}

/// Does the user's wording point at the referenced note rather than the
/// current one?
pub fn refers_to_context_note(text: &str, config: &NormalizeConfig) -> bool {
    let lower = text.to_lowercase();
    let referenced = config.referenced_cues.iter().any(|c| lower.contains(c.as_str()));
    let current = config.current_cues.iter().any(|c| lower.contains(c.as_str()));
    referenced && !current
}

/// Tools whose `note_id` may be steered at the referenced note.
const READ_CONTENT_TOOLS: &[&str] = &["read_note_content"];

/// Replace a missing or implausible `note_id` with the state's preferred id.
///
/// Scoped to tools that take a `note_id`: write tools and the read-content
/// tools. Everything else passes through untouched.
pub fn normalize_note_id(
    tool_name: &str,
    is_write_tool: bool,
    args: &mut Map<String, Value>,
    state: &AgentState,
    config: &NormalizeConfig,
) {
    if !is_write_tool && !READ_CONTENT_TOOLS.contains(&tool_name) {
        return;
    }

    let supplied_valid = args
        .get("note_id")
        .and_then(Value::as_str)
        .map(note_id_valid)
        .unwrap_or(false);
    if supplied_valid {
        return;
    }

    let prefer_context = !is_write_tool
        && READ_CONTENT_TOOLS.contains(&tool_name)
        && state
            .last_user_text()
            .map(|t| refers_to_context_note(&t, config))
            .unwrap_or(false);

    let preferred = if prefer_context {
        state.context_note_id.as_ref().or(state.active_note_id.as_ref())
    } else {
        state.active_note_id.as_ref()
    };

    if let Some(id) = preferred {
        args.insert("note_id".to_string(), Value::String(id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_with_notes() -> AgentState {
        AgentState {
            active_note_id: Some("1700000000000-abcdef012".to_string()),
            context_note_id: Some("1700000000001-fedcba987".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_id_patterns() {
        assert!(note_id_valid("1700000000000-abcdef012"));
        assert!(note_id_valid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(note_id_valid("550e8400e29b41d4a716446655440000"));
        assert!(!note_id_valid("note-42"));
        assert!(!note_id_valid(""));
        assert!(!note_id_valid("1700000000000-ABCDEF012"));
    }

    #[test]
    fn test_missing_note_id_substituted_for_write() {
        let mut args = json!({"instruction": "fix typos"}).as_object().unwrap().clone();
        let state = state_with_notes();
        normalize_note_id("update_note", true, &mut args, &state, &NormalizeConfig::default());
        assert_eq!(args["note_id"], "1700000000000-abcdef012");
    }

    #[test]
    fn test_invalid_note_id_replaced() {
        let mut args = json!({"note_id": "the-current-note"}).as_object().unwrap().clone();
        let state = state_with_notes();
        normalize_note_id("rename_note", true, &mut args, &state, &NormalizeConfig::default());
        assert_eq!(args["note_id"], "1700000000000-abcdef012");
    }

    #[test]
    fn test_valid_note_id_kept() {
        let mut args = json!({"note_id": "1700000000009-aaaaaaaaa"}).as_object().unwrap().clone();
        let state = state_with_notes();
        normalize_note_id("delete_note", true, &mut args, &state, &NormalizeConfig::default());
        assert_eq!(args["note_id"], "1700000000009-aaaaaaaaa");
    }

    #[test]
    fn test_read_prefers_context_note_when_referenced() {
        let mut state = state_with_notes();
        state.messages = vec![notegraph_core::messages::Message::human(
            "summarize the referenced note, not the current one",
        )];
        let mut args = Map::new();
        normalize_note_id(
            "read_note_content",
            false,
            &mut args,
            &state,
            &NormalizeConfig::default(),
        );
        assert_eq!(args["note_id"], "1700000000001-fedcba987");
    }

    #[test]
    fn test_current_cue_overrides_referenced_cue() {
        let config = NormalizeConfig::default();
        assert!(refers_to_context_note("use the referenced note please", &config));
        assert!(!refers_to_context_note(
            "use the referenced note, I mean this note (current note)",
            &config
        ));
    }

    #[test]
    fn test_no_preferred_id_leaves_args_untouched() {
        let mut args = Map::new();
        let state = AgentState::default();
        normalize_note_id("update_note", true, &mut args, &state, &NormalizeConfig::default());
        assert!(args.get("note_id").is_none());
    }
}
