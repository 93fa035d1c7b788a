//! The note toolset.
//!
//! Result strings follow a fixed vocabulary (`Successfully created note with
//! ID: …`, `Error: Note … not found.`): the stream adapter derives legacy
//! client events from them and the run node classifies success by the
//! `Error:` prefix. Change the wording and the frontend stops reacting.

use super::AgentTool;
use crate::store::{NotePatch, NoteStore, SearchIndex};
use async_trait::async_trait;
use notegraph_core::llm::{ChatModel, ChatRequest};
use notegraph_core::messages::Message;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{debug, warn};

fn arg_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn arg_bool(args: &Map<String, Value>, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn arg_usize(args: &Map<String, Value>, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

fn collapse_blank_lines(text: &str) -> String {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| regex::Regex::new(r"\n{3,}").expect("valid regex"));
    re.replace_all(text, "\n\n").into_owned()
}

/// Strip a wrapping markdown code fence the model sometimes adds.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    for prefix in ["```markdown", "```md", "```"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            if let Some(end) = rest.rfind("```") {
                return rest[..end].trim().to_string();
            }
        }
    }
    trimmed.to_string()
}

#[derive(Debug, Default, PartialEq)]
struct MarkdownShape {
    headings: usize,
    lists: usize,
    table_rows: usize,
    code_fences: usize,
}

fn markdown_shape(text: &str) -> MarkdownShape {
    let mut shape = MarkdownShape::default();
    for line in text.lines() {
        let t = line.trim_start();
        if t.starts_with('#') {
            shape.headings += 1;
        } else if t.starts_with("- ") || t.starts_with("* ") || t.starts_with("+ ")
            || t.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) && t.contains(". ")
        {
            shape.lists += 1;
        } else if t.starts_with('|') && t.ends_with('|') {
            shape.table_rows += 1;
        } else if t.starts_with("```") {
            shape.code_fences += 1;
        }
    }
    shape
}

/// Did an edit flatten a clearly structured note into plain prose?
fn structure_regressed(original: &str, edited: &str) -> bool {
    if original.is_empty() || edited.is_empty() || original.len() < 160 {
        return false;
    }
    let before = markdown_shape(original);
    let after = markdown_shape(edited);

    let had_structure = before.headings >= 1
        || before.lists >= 3
        || before.table_rows >= 2
        || before.code_fences >= 2;
    let collapsed = after.headings == 0
        && after.lists <= 1
        && after.table_rows == 0
        && after.code_fences == 0;
    had_structure && collapsed
}

// ---------------------------------------------------------------------------

pub struct SearchKnowledgeTool {
    index: Arc<dyn SearchIndex>,
}

#[async_trait]
impl AgentTool for SearchKnowledgeTool {
    fn name(&self) -> &str {
        "search_knowledge"
    }

    fn description(&self) -> &str {
        "Search across all user notes. Use when the user asks about their knowledge base or needs related information. Returns previews; only call read_note_content if you need the complete text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: &Map<String, Value>) -> String {
        let Some(query) = arg_str(args, "query").filter(|q| !q.trim().is_empty()) else {
            return "Error: search_knowledge requires a 'query' argument.".to_string();
        };
        debug!(query, "tool: search_knowledge");

        let hits = match self.index.search(query, 5).await {
            Ok(hits) => hits,
            Err(e) => return format!("Error: search failed: {}", e),
        };
        if hits.is_empty() {
            return "No relevant notes found for this query.".to_string();
        }

        let formatted: Vec<String> = hits
            .iter()
            .map(|hit| {
                let preview: String = hit.content.chars().take(1500).collect();
                let ellipsis = if hit.content.chars().count() > 1500 { "..." } else { "" };
                format!(
                    "Title: {}\nID: {}\nContent: {}{}",
                    hit.title, hit.note_id, preview, ellipsis
                )
            })
            .collect();
        format!(
            "{}\n\n[NOTE: If content is truncated (...), use read_note_content(note_id) for full text.]",
            formatted.join("\n\n---\n\n")
        )
    }
}

pub struct ReadNoteContentTool {
    store: Arc<dyn NoteStore>,
}

#[async_trait]
impl AgentTool for ReadNoteContentTool {
    fn name(&self) -> &str {
        "read_note_content"
    }

    fn description(&self) -> &str {
        "Read the full content of a specific note by its ID. Use for the exact text of the current note or one found via search."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "note_id": {"type": "string", "description": "ID of the note to read"}
            },
            "required": ["note_id"]
        })
    }

    async fn invoke(&self, args: &Map<String, Value>) -> String {
        let Some(note_id) = arg_str(args, "note_id") else {
            return "Error: read_note_content requires a 'note_id' argument.".to_string();
        };
        debug!(note_id, "tool: read_note_content");

        match self.store.get_note(note_id).await {
            Ok(Some(note)) => format!(
                "Title: {}\nContent:\n{}\n\n[SYSTEM: Content retrieved successfully. DO NOT repeat this content in your response.]",
                note.title,
                note.readable_body()
            ),
            Ok(None) => format!("Error: Note with ID {} not found.", note_id),
            Err(e) => format!("Error: failed to read note: {}", e),
        }
    }
}

pub struct RenameNoteTool {
    store: Arc<dyn NoteStore>,
}

#[async_trait]
impl AgentTool for RenameNoteTool {
    fn name(&self) -> &str {
        "rename_note"
    }

    fn description(&self) -> &str {
        "Rename a note's title (NOT the content). To modify content, use update_note instead."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "note_id": {"type": "string", "description": "ID of the note to rename"},
                "new_title": {"type": "string", "description": "The new title"}
            },
            "required": ["note_id", "new_title"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &Map<String, Value>) -> String {
        let (Some(note_id), Some(new_title)) =
            (arg_str(args, "note_id"), arg_str(args, "new_title"))
        else {
            return "Error: rename_note requires 'note_id' and 'new_title'.".to_string();
        };
        debug!(note_id, new_title, "tool: rename_note");

        let old_title = match self.store.get_note(note_id).await {
            Ok(Some(note)) => note.title,
            Ok(None) => return format!("Error: Note {} not found.", note_id),
            Err(e) => return format!("Error: failed to load note: {}", e),
        };

        let patch = NotePatch {
            title: Some(new_title.to_string()),
            markdown_source: None,
        };
        match self.store.update_note(note_id, patch).await {
            Ok(true) => format!(
                "Successfully renamed note from '{}' to '{}'",
                old_title, new_title
            ),
            Ok(false) => format!("Error: Note {} not found.", note_id),
            Err(e) => format!("Error: failed to rename note: {}", e),
        }
    }
}

pub struct ListRecentNotesTool {
    store: Arc<dyn NoteStore>,
}

#[async_trait]
impl AgentTool for ListRecentNotesTool {
    fn name(&self) -> &str {
        "list_recent_notes"
    }

    fn description(&self) -> &str {
        "List the most recently updated notes. Use when the user asks what they wrote recently or wants an overview."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "description": "Maximum notes to list", "default": 8}
            }
        })
    }

    async fn invoke(&self, args: &Map<String, Value>) -> String {
        let limit = arg_usize(args, "limit", 8);
        match self.store.list_recent(limit).await {
            Ok(notes) if notes.is_empty() => {
                "There are no notes in the database yet.".to_string()
            }
            Ok(notes) => {
                let lines: Vec<String> = notes
                    .iter()
                    .map(|n| format!("- {} (ID: {})", n.title, n.id))
                    .collect();
                format!("Recent Notes:\n{}", lines.join("\n"))
            }
            Err(e) => format!("Error: failed to list notes: {}", e),
        }
    }
}

const DESTRUCTIVE_CUES: &[&str] = &["clear all", "empty content", "清空", "删除所有内容"];

const EDIT_SYSTEM_PROMPT: &str = r#"You are a precise text editing assistant.

RULES:
1. Output ONLY the final edited Markdown content.
2. NO explanations, greetings, or summaries.
3. If asked to clear/delete, output an empty string.
4. Preserve Markdown formatting.

SPECIAL RULE FOR FORMAT/ORGANIZE REQUESTS:
If the user asks to "format", "organize", "tidy up", "整理格式", "排版", or similar:
- DO NOT change any text content (no adding, removing, or rephrasing words)
- ONLY adjust structure: headings, lists, code blocks, emphasis, spacing
- Keep table row/column mappings exactly as in the source"#;

const REWRITE_SYSTEM_PROMPT: &str =
    "You are a creative writing assistant. Output only Markdown content, no explanations.";

const STRICT_GATE: &str = r#"

STRICT OUTPUT QUALITY GATE:
- Preserve headings, lists, and tables when they exist in the source.
- Never flatten the whole note into one plain paragraph.
- Return ONLY Markdown content, no commentary."#;

pub struct UpdateNoteTool {
    store: Arc<dyn NoteStore>,
    model: Arc<dyn ChatModel>,
}

impl UpdateNoteTool {
    async fn run_edit(&self, system: &str, user: &str) -> Result<String, String> {
        let request = ChatRequest::new(vec![Message::system(system), Message::human(user)]);
        match self.model.chat(request).await {
            Ok(response) => Ok(response.message.text()),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[async_trait]
impl AgentTool for UpdateNoteTool {
    fn name(&self) -> &str {
        "update_note"
    }

    fn description(&self) -> &str {
        "Update an existing note's content based on an instruction (e.g. 'add a paragraph', 'fix the typo', 'tidy up the formatting'). Set force_rewrite only to start over with new content."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "note_id": {"type": "string", "description": "ID of the note to update"},
                "instruction": {"type": "string", "description": "Precise editing instruction"},
                "force_rewrite": {"type": "boolean", "description": "Replace the content entirely", "default": false}
            },
            "required": ["note_id", "instruction"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &Map<String, Value>) -> String {
        let (Some(note_id), Some(instruction)) =
            (arg_str(args, "note_id"), arg_str(args, "instruction"))
        else {
            return "Error: update_note requires 'note_id' and 'instruction'.".to_string();
        };
        let force_rewrite = arg_bool(args, "force_rewrite");
        debug!(note_id, instruction, "tool: update_note");

        let note = match self.store.get_note(note_id).await {
            Ok(Some(note)) => note,
            Ok(None) => return format!("Error: Note {} not found.", note_id),
            Err(e) => return format!("Error: failed to load note: {}", e),
        };
        let current = note.readable_body().to_string();

        // "Clear the note" is handled without an LLM round-trip.
        let lower = instruction.to_lowercase();
        if DESTRUCTIVE_CUES.iter().any(|c| lower.contains(c)) && !force_rewrite {
            let patch = NotePatch {
                title: None,
                markdown_source: Some(String::new()),
            };
            return match self.store.update_note(note_id, patch).await {
                Ok(true) => format!("Successfully updated note (ID: {}). (Content cleared)", note_id),
                Ok(false) => format!("Error: Note {} not found.", note_id),
                Err(e) => format!("Error: failed to update note: {}", e),
            };
        }

        let (system, user) = if force_rewrite {
            (
                REWRITE_SYSTEM_PROMPT.to_string(),
                format!("Writing request: {}", instruction),
            )
        } else {
            (
                EDIT_SYSTEM_PROMPT.to_string(),
                format!(
                    "Original content:\n---\n{}\n---\nEdit instruction: {}\n\nOutput the edited content directly:",
                    current, instruction
                ),
            )
        };

        let mut edited = match self.run_edit(&system, &user).await {
            Ok(text) => text,
            Err(e) => return format!("Error: editing model failed: {}", e),
        };

        if !force_rewrite && structure_regressed(&current, &edited) {
            warn!(note_id, "edit flattened markdown structure, retrying with strict gate");
            let strict = format!("{}{}", system, STRICT_GATE);
            if let Ok(retry) = self.run_edit(&strict, &user).await {
                if !retry.trim().is_empty() {
                    edited = retry;
                }
            }
        }

        let cleaned = collapse_blank_lines(&strip_code_fence(&edited));
        let patch = NotePatch {
            title: None,
            markdown_source: Some(cleaned),
        };
        match self.store.update_note(note_id, patch).await {
            Ok(true) => format!(
                "Successfully updated note (ID: {}). [SYSTEM: DO NOT output the note content.]",
                note_id
            ),
            Ok(false) => format!("Error: Note {} not found.", note_id),
            Err(e) => format!("Error: failed to update note: {}", e),
        }
    }
}

pub struct PatchNoteTool {
    store: Arc<dyn NoteStore>,
}

#[async_trait]
impl AgentTool for PatchNoteTool {
    fn name(&self) -> &str {
        "patch_note"
    }

    fn description(&self) -> &str {
        "Replace specific text in a note (search & replace). More efficient than update_note for typos and small targeted edits; old_text must match exactly."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "note_id": {"type": "string", "description": "ID of the note to patch"},
                "old_text": {"type": "string", "description": "Exact text to find"},
                "new_text": {"type": "string", "description": "Replacement text"}
            },
            "required": ["note_id", "old_text", "new_text"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &Map<String, Value>) -> String {
        let (Some(note_id), Some(old_text), Some(new_text)) = (
            arg_str(args, "note_id"),
            arg_str(args, "old_text"),
            arg_str(args, "new_text"),
        ) else {
            return "Error: patch_note requires 'note_id', 'old_text' and 'new_text'.".to_string();
        };
        debug!(note_id, "tool: patch_note");

        let note = match self.store.get_note(note_id).await {
            Ok(Some(note)) => note,
            Ok(None) => return format!("Error: Note {} not found.", note_id),
            Err(e) => return format!("Error: failed to load note: {}", e),
        };

        let body = note.readable_body();
        if !body.contains(old_text) {
            let shown: String = old_text.chars().take(50).collect();
            return format!(
                "Error: Could not find the text '{}...' in the note. Make sure it matches exactly.",
                shown
            );
        }

        let updated = body.replacen(old_text, new_text, 1);
        let patch = NotePatch {
            title: None,
            markdown_source: Some(updated),
        };
        match self.store.update_note(note_id, patch).await {
            Ok(true) => {
                let old_short: String = old_text.chars().take(30).collect();
                let new_short: String = new_text.chars().take(30).collect();
                format!(
                    "Successfully patched note (ID: {}). Replaced '{}...' with '{}...'",
                    note_id, old_short, new_short
                )
            }
            Ok(false) => format!("Error: Note {} not found.", note_id),
            Err(e) => format!("Error: failed to patch note: {}", e),
        }
    }
}

pub struct CreateNoteTool {
    store: Arc<dyn NoteStore>,
}

#[async_trait]
impl AgentTool for CreateNoteTool {
    fn name(&self) -> &str {
        "create_note"
    }

    fn description(&self) -> &str {
        "Create a brand new note with a title and Markdown content. Use list_categories first when assigning a category."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Clear, concise title"},
                "content": {"type": "string", "description": "Note body in Markdown"},
                "category_id": {"type": "string", "description": "Optional category ID"}
            },
            "required": ["title"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &Map<String, Value>) -> String {
        let Some(title) = arg_str(args, "title").filter(|t| !t.trim().is_empty()) else {
            return "Error: create_note requires a 'title'.".to_string();
        };
        let content = arg_str(args, "content").unwrap_or("");
        let content = if content.trim().is_empty() {
            format!("# {}\n\n（待补充内容）", title)
        } else {
            collapse_blank_lines(content)
        };
        debug!(title, "tool: create_note");

        let category_id = arg_str(args, "category_id")
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let category_name = if let Some(cid) = category_id {
            let categories = match self.store.list_categories().await {
                Ok(c) => c,
                Err(e) => return format!("Error: failed to list categories: {}", e),
            };
            match categories.iter().find(|c| c.id == cid) {
                Some(category) => Some(category.name.clone()),
                None => {
                    let valid: Vec<String> =
                        categories.iter().map(|c| format!("\"{}\"", c.id)).collect();
                    return format!(
                        "Error: Category '{}' does not exist. Use a valid category_id from list_categories. Valid IDs: {}",
                        cid,
                        valid.join(", ")
                    );
                }
            }
        } else {
            None
        };

        match self.store.create_note(title, &content, category_id).await {
            Ok(note) => match category_name {
                Some(name) => format!(
                    "Successfully created note with ID: {} and assigned category: {}",
                    note.id, name
                ),
                None => format!("Successfully created note with ID: {}", note.id),
            },
            Err(e) => format!("Error: failed to create note: {}", e),
        }
    }
}

pub struct DeleteNoteTool {
    store: Arc<dyn NoteStore>,
}

#[async_trait]
impl AgentTool for DeleteNoteTool {
    fn name(&self) -> &str {
        "delete_note"
    }

    fn description(&self) -> &str {
        "Delete a specific note by its ID. Use ONLY when the user explicitly asks to delete, remove, or trash a note."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "note_id": {"type": "string", "description": "ID of the note to delete"}
            },
            "required": ["note_id"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &Map<String, Value>) -> String {
        let Some(note_id) = arg_str(args, "note_id") else {
            return "Error: delete_note requires a 'note_id'.".to_string();
        };
        debug!(note_id, "tool: delete_note");

        match self.store.delete_note(note_id).await {
            Ok(true) => format!("Successfully deleted note {}.", note_id),
            Ok(false) => format!(
                "Error: Failed to delete note {}. It might not exist.",
                note_id
            ),
            Err(e) => format!("Error: failed to delete note: {}", e),
        }
    }
}

pub struct ListCategoriesTool {
    store: Arc<dyn NoteStore>,
}

#[async_trait]
impl AgentTool for ListCategoriesTool {
    fn name(&self) -> &str {
        "list_categories"
    }

    fn description(&self) -> &str {
        "List all categories notes can be organized into. set_note_category requires an exact category_id returned here."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, _args: &Map<String, Value>) -> String {
        match self.store.list_categories().await {
            Ok(categories) if categories.is_empty() => {
                "No categories exist yet. The user can create categories in the sidebar.".to_string()
            }
            Ok(categories) => {
                let lines: Vec<String> = categories
                    .iter()
                    .map(|c| format!("- {} -> category_id: \"{}\"", c.name, c.id))
                    .collect();
                format!(
                    "Available Categories (use the category_id value for set_note_category):\n{}",
                    lines.join("\n")
                )
            }
            Err(e) => format!("Error: failed to list categories: {}", e),
        }
    }
}

pub struct SetNoteCategoryTool {
    store: Arc<dyn NoteStore>,
}

#[async_trait]
impl AgentTool for SetNoteCategoryTool {
    fn name(&self) -> &str {
        "set_note_category"
    }

    fn description(&self) -> &str {
        "Assign a category to a note. Use the exact category_id from list_categories; pass an empty string to remove the category."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "note_id": {"type": "string", "description": "ID of the note"},
                "category_id": {"type": "string", "description": "Category ID, or \"\" to remove"}
            },
            "required": ["note_id", "category_id"]
        })
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &Map<String, Value>) -> String {
        let Some(note_id) = arg_str(args, "note_id") else {
            return "Error: set_note_category requires a 'note_id'.".to_string();
        };
        let raw_category = arg_str(args, "category_id").unwrap_or("");
        debug!(note_id, category = raw_category, "tool: set_note_category");

        // Clear-category intent.
        if raw_category.is_empty()
            || ["none", "null", "undefined"].contains(&raw_category.to_lowercase().as_str())
        {
            return match self.store.set_category(note_id, None).await {
                Ok(true) => {
                    "Successfully removed category from note (it is now Uncategorized).".to_string()
                }
                Ok(false) => format!("Error: Failed to update note {}.", note_id),
                Err(e) => format!("Error: failed to update note: {}", e),
            };
        }

        let categories = match self.store.list_categories().await {
            Ok(c) => c,
            Err(e) => return format!("Error: failed to list categories: {}", e),
        };

        // Accept a category name where the model passed one instead of an id.
        let resolved = categories
            .iter()
            .find(|c| c.id == raw_category)
            .or_else(|| categories.iter().find(|c| c.name == raw_category));

        let Some(category) = resolved else {
            let suggestions: Vec<String> = categories
                .iter()
                .map(|c| format!("\"{}\" ({})", c.id, c.name))
                .collect();
            return format!(
                "Error: Category '{}' does not exist. Use a valid ID from list_categories or an empty string \"\" to remove. Valid IDs: {}",
                raw_category,
                suggestions.join(", ")
            );
        };

        match self.store.set_category(note_id, Some(&category.id)).await {
            Ok(true) => format!("Successfully assigned note to category: {}", category.name),
            Ok(false) => format!(
                "Error: Failed to update note {}. Note might not exist or is in trash.",
                note_id
            ),
            Err(e) => format!("Error: failed to update note: {}", e),
        }
    }
}

/// Build the full registry over the collaborator handles.
pub fn build_note_tools(
    store: Arc<dyn NoteStore>,
    index: Arc<dyn SearchIndex>,
    model: Arc<dyn ChatModel>,
) -> super::ToolRegistry {
    let mut registry = super::ToolRegistry::new();
    registry.register(Arc::new(SearchKnowledgeTool { index }));
    registry.register(Arc::new(ReadNoteContentTool { store: store.clone() }));
    registry.register(Arc::new(RenameNoteTool { store: store.clone() }));
    registry.register(Arc::new(ListRecentNotesTool { store: store.clone() }));
    registry.register(Arc::new(UpdateNoteTool { store: store.clone(), model }));
    registry.register(Arc::new(PatchNoteTool { store: store.clone() }));
    registry.register(Arc::new(CreateNoteTool { store: store.clone() }));
    registry.register(Arc::new(DeleteNoteTool { store: store.clone() }));
    registry.register(Arc::new(ListCategoriesTool { store: store.clone() }));
    registry.register(Arc::new(SetNoteCategoryTool { store }));
    registry
}
