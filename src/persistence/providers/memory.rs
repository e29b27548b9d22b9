//! Process-local store. Contents are lost on restart.

use crate::context::types::{ConversationEntry, Document};
use crate::persistence::{ContextStore, ConversationFilter};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: RwLock<Vec<ConversationEntry>>,
    documents: RwLock<Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first; among equal timestamps the later insert comes first.
fn newest_first<'a, T, I, F>(items: I, created_at: F, limit: usize) -> Vec<T>
where
    T: Clone + 'a,
    I: DoubleEndedIterator<Item = &'a T>,
    F: Fn(&T) -> chrono::DateTime<chrono::Utc>,
{
    let mut out: Vec<T> = items.rev().cloned().collect();
    out.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    out.truncate(limit);
    out
}

#[async_trait]
impl ContextStore for MemoryStore {
    async fn insert_conversation(&self, entry: ConversationEntry) -> Result<ConversationEntry> {
        self.conversations.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn recent_conversations(
        &self,
        filter: &ConversationFilter,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>> {
        let conversations = self.conversations.read().await;
        Ok(newest_first(
            conversations.iter().filter(|e| filter.matches(e)),
            |e| e.created_at,
            limit,
        ))
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let mut conversations = self.conversations.write().await;
        let before = conversations.len();
        conversations.retain(|e| e.id != id);
        Ok(conversations.len() != before)
    }

    async fn insert_document(&self, document: Document) -> Result<Document> {
        self.documents.write().await.push(document.clone());
        Ok(document)
    }

    async fn search_documents(&self, query: Option<&str>, limit: usize) -> Result<Vec<Document>> {
        let needle = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);
        let documents = self.documents.read().await;
        Ok(newest_first(
            documents.iter().filter(|d| match &needle {
                Some(n) => d.title.to_lowercase().contains(n) || d.content.to_lowercase().contains(n),
                None => true,
            }),
            |d| d.created_at,
            limit,
        ))
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| d.id != id);
        Ok(documents.len() != before)
    }
}
