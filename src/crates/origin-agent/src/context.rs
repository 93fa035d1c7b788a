//! Context assembly for the agent node.

use crate::config::Settings;
use crate::prompts;
use crate::state::AgentState;
use notegraph_core::messages::Message;

fn cap(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(limit).collect();
        format!("{}\n…[truncated]", truncated)
    }
}

/// Build the structured context block injected ahead of the history.
///
/// Names the active and referenced notes, includes the capped note body,
/// any selection and attachment text, the knowledge-flag instruction, and
/// the title/content structure reminder.
pub fn build_context_messages(state: &AgentState, settings: &Settings) -> Vec<Message> {
    let mut sections: Vec<String> = Vec::new();

    match (&state.active_note_id, &state.active_note_title) {
        (Some(id), title) => {
            let mut line = format!(
                "Active note: \"{}\" (ID: {})",
                title.as_deref().unwrap_or("Untitled"),
                id
            );
            if let Some(category) = &state.active_note_category {
                line.push_str(&format!(", category: {}", category));
            }
            sections.push(line);
        }
        (None, _) => sections.push("No note is currently open.".to_string()),
    }

    if let (Some(id), title) = (&state.context_note_id, &state.context_note_title) {
        sections.push(format!(
            "Referenced note (@): \"{}\" (ID: {})",
            title.as_deref().unwrap_or("Untitled"),
            id
        ));
    }

    if let Some(content) = state.note_content.as_deref().filter(|c| !c.is_empty()) {
        sections.push(format!(
            "Current note content:\n---\n{}\n---",
            cap(content, settings.note_body_cap)
        ));
    }

    if let Some(selected) = state.selected_text.as_deref().filter(|s| !s.is_empty()) {
        sections.push(format!("User-selected text:\n---\n{}\n---", selected));
    }

    if let Some(attachments) = state
        .attachment_context
        .as_deref()
        .filter(|a| !a.is_empty())
    {
        sections.push(format!("Attached file content:\n---\n{}\n---", attachments));
    }

    if state.use_knowledge {
        sections.push(prompts::USE_KNOWLEDGE_INSTRUCTION.to_string());
    }

    sections.push(prompts::NOTE_STRUCTURE_REMINDER.to_string());

    vec![
        Message::system(prompts::SYSTEM_POLICY),
        Message::system(format!("[Context]\n{}", sections.join("\n\n"))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_body_capped() {
        let mut state = AgentState::default();
        state.active_note_id = Some("1700000000000-abcdef012".into());
        state.active_note_title = Some("Plan".into());
        state.note_content = Some("x".repeat(10_000));

        let messages = build_context_messages(&state, &Settings::default());
        assert_eq!(messages.len(), 2);
        let context = messages[1].text();
        assert!(context.contains("…[truncated]"));
        assert!(context.chars().count() < 9500);
    }

    #[test]
    fn test_knowledge_flag_adds_instruction() {
        let mut state = AgentState::default();
        state.use_knowledge = true;
        let context = build_context_messages(&state, &Settings::default())[1].text();
        assert!(context.contains("search_knowledge"));
    }

    #[test]
    fn test_referenced_note_named() {
        let mut state = AgentState::default();
        state.context_note_id = Some("1700000000001-fedcba987".into());
        state.context_note_title = Some("Meeting notes".into());
        let context = build_context_messages(&state, &Settings::default())[1].text();
        assert!(context.contains("Referenced note (@): \"Meeting notes\""));
    }
}
