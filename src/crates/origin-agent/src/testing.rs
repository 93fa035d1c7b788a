//! Test doubles: a scripted chat model and in-memory collaborators.

use crate::prompts;
use crate::store::{Category, NotePatch, NoteRecord, NoteStore, SearchHit, SearchIndex, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use notegraph_core::error::Result as GraphResult;
use notegraph_core::llm::{ChatModel, ChatRequest, ChatResponse, ChatStreamChunk, ChatTokenStream};
use notegraph_core::messages::Message;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::RwLock;

/// A chat model with canned answers.
///
/// Classifier calls are answered from fixed strings (recognized by their
/// prompts); everything else pops the scripted queue in order. When the
/// queue runs dry the model answers with plain text, which ends the agent
/// loop.
pub struct ScriptedChatModel {
    intent: Mutex<String>,
    write_authorization: Mutex<String>,
    responses: Mutex<VecDeque<Message>>,
}

impl ScriptedChatModel {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            intent: Mutex::new("TASK".to_string()),
            write_authorization: Mutex::new("ALLOW_WRITE".to_string()),
            responses: Mutex::new(responses.into()),
        }
    }

    pub fn with_intent(self, intent: &str) -> Self {
        *self.intent.lock().unwrap() = intent.to_string();
        self
    }

    pub fn with_write_authorization(self, answer: &str) -> Self {
        *self.write_authorization.lock().unwrap() = answer.to_string();
        self
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    fn answer(&self, request: &ChatRequest) -> Message {
        let system_text = request
            .messages
            .first()
            .map(|m| m.text())
            .unwrap_or_default();
        if system_text.contains(prompts::ROUTER_PROMPT) || system_text == prompts::ROUTER_PROMPT {
            return Message::assistant(self.intent.lock().unwrap().clone());
        }
        if system_text.contains("MODIFY persisted notes") {
            return Message::assistant(self.write_authorization.lock().unwrap().clone());
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Message::assistant("(scripted model has no further responses)"))
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn chat(&self, request: ChatRequest) -> GraphResult<ChatResponse> {
        Ok(ChatResponse::from_message(self.answer(&request)))
    }

    async fn stream(&self, request: ChatRequest) -> GraphResult<ChatTokenStream> {
        let message = self.answer(&request);
        let text = message.text();
        let chunks = vec![
            Ok(ChatStreamChunk::delta(text)),
            Ok(ChatStreamChunk::finished(ChatResponse::from_message(message))),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// A note store living entirely in memory.
#[derive(Default)]
pub struct InMemoryNoteStore {
    notes: RwLock<Vec<NoteRecord>>,
    categories: RwLock<Vec<Category>>,
    next_id: Mutex<u32>,
}

impl InMemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_note(&self, id: &str, title: &str, body: &str) {
        let now = Utc::now();
        self.notes.write().await.push(NoteRecord {
            id: id.to_string(),
            title: title.to_string(),
            markdown_source: body.to_string(),
            plain_text: body.to_string(),
            category_id: None,
            created_at: now,
            updated_at: now,
        });
    }

    pub async fn seed_category(&self, id: &str, name: &str) {
        self.categories.write().await.push(Category {
            id: id.to_string(),
            name: name.to_string(),
        });
    }
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    async fn get_note(&self, id: &str) -> StoreResult<Option<NoteRecord>> {
        Ok(self.notes.read().await.iter().find(|n| n.id == id).cloned())
    }

    async fn create_note(
        &self,
        title: &str,
        markdown_source: &str,
        category_id: Option<&str>,
    ) -> StoreResult<NoteRecord> {
        let serial = {
            let mut guard = self.next_id.lock().unwrap();
            *guard += 1;
            *guard
        };
        let now = Utc::now();
        let note = NoteRecord {
            id: format!("{:013}-{:09x}", 1_700_000_000_000u64 + serial as u64, serial),
            title: title.to_string(),
            markdown_source: markdown_source.to_string(),
            plain_text: markdown_source.to_string(),
            category_id: category_id.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        self.notes.write().await.push(note.clone());
        Ok(note)
    }

    async fn update_note(&self, id: &str, patch: NotePatch) -> StoreResult<bool> {
        let mut notes = self.notes.write().await;
        let Some(note) = notes.iter_mut().find(|n| n.id == id) else {
            return Ok(false);
        };
        if let Some(title) = patch.title {
            note.title = title;
        }
        if let Some(markdown) = patch.markdown_source {
            note.plain_text = markdown.clone();
            note.markdown_source = markdown;
        }
        note.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_note(&self, id: &str) -> StoreResult<bool> {
        let mut notes = self.notes.write().await;
        let before = notes.len();
        notes.retain(|n| n.id != id);
        Ok(notes.len() != before)
    }

    async fn set_category(&self, id: &str, category_id: Option<&str>) -> StoreResult<bool> {
        let mut notes = self.notes.write().await;
        let Some(note) = notes.iter_mut().find(|n| n.id == id) else {
            return Ok(false);
        };
        note.category_id = category_id.map(str::to_string);
        Ok(true)
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self.categories.read().await.clone())
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<NoteRecord>> {
        let mut notes = self.notes.read().await.clone();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notes.truncate(limit);
        Ok(notes)
    }
}

/// A search index returning fixed hits.
#[derive(Default)]
pub struct StaticSearchIndex {
    hits: Vec<SearchHit>,
}

impl StaticSearchIndex {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl SearchIndex for StaticSearchIndex {
    async fn search(&self, _query: &str, top_k: usize) -> StoreResult<Vec<SearchHit>> {
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}
