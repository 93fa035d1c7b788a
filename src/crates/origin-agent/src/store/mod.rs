//! External collaborator interfaces: the note store and the search index.
//!
//! The agent core only ever talks to these traits. Rendering (markdown →
//! HTML), database schema, and semantic indexing live behind them and are
//! not this crate's concern. [`json_store`] ships small reference
//! implementations used by the server binary and the test suite.

pub mod json_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use json_store::{JsonNoteStore, KeywordSearchIndex};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: String,

    pub title: String,

    /// Markdown source of the body; the canonical editing baseline.
    #[serde(default)]
    pub markdown_source: String,

    /// Whitespace-collapsed text used for search and previews.
    #[serde(default)]
    pub plain_text: String,

    #[serde(default)]
    pub category_id: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl NoteRecord {
    /// Body text preferred for reading: real structure over collapsed text.
    pub fn readable_body(&self) -> &str {
        if !self.markdown_source.is_empty() {
            &self.markdown_source
        } else {
            &self.plain_text
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct NotePatch {
    pub title: Option<String>,

    pub markdown_source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub note_id: String,
    pub title: String,
    pub content: String,
    pub score: f32,
}

/// Note CRUD as seen from the agent core.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn get_note(&self, id: &str) -> StoreResult<Option<NoteRecord>>;

    async fn create_note(
        &self,
        title: &str,
        markdown_source: &str,
        category_id: Option<&str>,
    ) -> StoreResult<NoteRecord>;

    /// Returns `false` when the note does not exist.
    async fn update_note(&self, id: &str, patch: NotePatch) -> StoreResult<bool>;

    async fn delete_note(&self, id: &str) -> StoreResult<bool>;

    async fn set_category(&self, id: &str, category_id: Option<&str>) -> StoreResult<bool>;

    async fn list_categories(&self) -> StoreResult<Vec<Category>>;

    /// Most recently updated notes first.
    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<NoteRecord>>;
}

/// Search over the note corpus.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> StoreResult<Vec<SearchHit>>;
}
