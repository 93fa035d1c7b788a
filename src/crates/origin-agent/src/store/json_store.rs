//! Reference collaborator implementations.
//!
//! [`JsonNoteStore`] keeps the whole library in one JSON file — enough for
//! the desktop app's single-user workload and for the test suite.
//! [`KeywordSearchIndex`] scores notes by term overlap; the real semantic
//! index lives in a separate service and is out of scope here.

use super::{Category, NotePatch, NoteRecord, NoteStore, SearchHit, SearchIndex, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LibraryFile {
    notes: Vec<NoteRecord>,
    categories: Vec<Category>,
}

pub struct JsonNoteStore {
    path: PathBuf,
    library: RwLock<LibraryFile>,
}

impl JsonNoteStore {
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let library = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LibraryFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            library: RwLock::new(library),
        })
    }

    pub async fn add_category(&self, name: &str) -> StoreResult<Category> {
        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        let mut library = self.library.write().await;
        library.categories.push(category.clone());
        self.persist(&library).await?;
        Ok(category)
    }

    async fn persist(&self, library: &LibraryFile) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(library)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    /// Timestamped note id: epoch millis plus nine hex chars.
    fn generate_id() -> String {
        let millis = Utc::now().timestamp_millis();
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
        format!("{:013}-{}", millis, suffix)
    }

    fn to_plain_text(markdown: &str) -> String {
        let mut text = String::with_capacity(markdown.len());
        for line in markdown.lines() {
            let stripped = line
                .trim_start_matches(['#', '>', '-', '*', '+'])
                .trim();
            if !stripped.is_empty() && !stripped.starts_with("```") {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(stripped);
            }
        }
        text
    }
}

#[async_trait]
impl NoteStore for JsonNoteStore {
    async fn get_note(&self, id: &str) -> StoreResult<Option<NoteRecord>> {
        let library = self.library.read().await;
        Ok(library.notes.iter().find(|n| n.id == id).cloned())
    }

    async fn create_note(
        &self,
        title: &str,
        markdown_source: &str,
        category_id: Option<&str>,
    ) -> StoreResult<NoteRecord> {
        let now = Utc::now();
        let note = NoteRecord {
            id: Self::generate_id(),
            title: title.to_string(),
            markdown_source: markdown_source.to_string(),
            plain_text: Self::to_plain_text(markdown_source),
            category_id: category_id.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        let mut library = self.library.write().await;
        library.notes.push(note.clone());
        self.persist(&library).await?;
        Ok(note)
    }

    async fn update_note(&self, id: &str, patch: NotePatch) -> StoreResult<bool> {
        let mut library = self.library.write().await;
        let Some(note) = library.notes.iter_mut().find(|n| n.id == id) else {
            return Ok(false);
        };
        if let Some(title) = patch.title {
            note.title = title;
        }
        if let Some(markdown) = patch.markdown_source {
            note.plain_text = Self::to_plain_text(&markdown);
            note.markdown_source = markdown;
        }
        note.updated_at = Utc::now();
        self.persist(&library).await?;
        Ok(true)
    }

    async fn delete_note(&self, id: &str) -> StoreResult<bool> {
        let mut library = self.library.write().await;
        let before = library.notes.len();
        library.notes.retain(|n| n.id != id);
        let removed = library.notes.len() != before;
        if removed {
            self.persist(&library).await?;
        }
        Ok(removed)
    }

    async fn set_category(&self, id: &str, category_id: Option<&str>) -> StoreResult<bool> {
        let mut library = self.library.write().await;
        let Some(note) = library.notes.iter_mut().find(|n| n.id == id) else {
            return Ok(false);
        };
        note.category_id = category_id.map(str::to_string);
        note.updated_at = Utc::now();
        self.persist(&library).await?;
        Ok(true)
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self.library.read().await.categories.clone())
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<NoteRecord>> {
        let library = self.library.read().await;
        let mut notes = library.notes.clone();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notes.truncate(limit);
        Ok(notes)
    }
}

/// Term-overlap search over a [`NoteStore`].
pub struct KeywordSearchIndex {
    store: Arc<dyn NoteStore>,
}

impl KeywordSearchIndex {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchIndex for KeywordSearchIndex {
    async fn search(&self, query: &str, top_k: usize) -> StoreResult<Vec<SearchHit>> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let notes = self.store.list_recent(usize::MAX).await?;
        let mut hits: Vec<SearchHit> = notes
            .into_iter()
            .filter_map(|note| {
                let haystack = format!("{}\n{}", note.title, note.readable_body()).to_lowercase();
                let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                if matched == 0 {
                    return None;
                }
                Some(SearchHit {
                    score: matched as f32 / terms.len() as f32,
                    content: note.readable_body().to_string(),
                    title: note.title,
                    note_id: note.id,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}
