//! Backend settings.
//!
//! Everything is env-overridable with sane defaults; the desktop shell sets
//! `ORIGIN_DATA_DIR` and the provider config path, the rest rarely changes.

use crate::normalize::NormalizeConfig;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_MAX_TOOL_CALLS: u32 = 25;
pub const DEFAULT_DOOM_LOOP_THRESHOLD: u32 = 3;

/// Cap on the note body injected into the agent's context block.
pub const NOTE_BODY_CAP: usize = 8000;

/// Cap on extracted text per attachment.
pub const ATTACHMENT_TEXT_CAP: usize = 12000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,

    pub port: u16,

    pub data_dir: PathBuf,

    pub providers_path: PathBuf,

    pub max_tool_calls: u32,

    pub doom_loop_threshold: u32,

    pub note_body_cap: usize,

    pub attachment_text_cap: usize,

    pub normalize: NormalizeConfig,

    /// Tool name → human-readable status label.
    pub status_labels: HashMap<String, String>,
}

fn default_status_labels() -> HashMap<String, String> {
    [
        ("search_knowledge", "📚 正在检索知识库..."),
        ("read_note_content", "📖 正在读取笔记全文..."),
        ("list_recent_notes", "📝 正在寻找笔记..."),
        ("update_note", "⚙️ 正在执行笔记更新..."),
        ("patch_note", "🩹 正在修改笔记片段..."),
        ("create_note", "🆕 正在创建新笔记..."),
        ("delete_note", "🗑️ 正在清理笔记..."),
        ("rename_note", "✏️ 正在重命名笔记..."),
        ("list_categories", "🏷️ 正在查看分类..."),
        ("set_note_category", "🏷️ 正在调整分类..."),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            providers_path: data_dir.join("providers.json"),
            data_dir,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            doom_loop_threshold: DEFAULT_DOOM_LOOP_THRESHOLD,
            note_body_cap: NOTE_BODY_CAP,
            attachment_text_cap: ATTACHMENT_TEXT_CAP,
            normalize: NormalizeConfig::default(),
            status_labels: default_status_labels(),
        }
    }
}

impl Settings {
    pub fn status_label(&self, tool: &str) -> String {
        self.status_labels
            .get(tool)
            .cloned()
            .unwrap_or_else(|| format!("🛠️ 调用 {}...", tool))
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }

    pub fn notes_path(&self) -> PathBuf {
        self.data_dir.join("notes.json")
    }
}
