use crate::context::types::{ConversationEntry, Document};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub mod providers;

/// Filter for conversation lookups. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationFilter {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
}

impl ConversationFilter {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            agent_id: None,
        }
    }

    #[must_use]
    pub fn with_agent(mut self, agent_id: Option<&str>) -> Self {
        self.agent_id = agent_id.map(ToString::to_string);
        self
    }

    pub fn matches(&self, entry: &ConversationEntry) -> bool {
        self.session_id
            .as_deref()
            .is_none_or(|s| s == entry.session_id)
            && self
                .agent_id
                .as_deref()
                .is_none_or(|a| entry.agent_id.as_deref() == Some(a))
    }
}

/// Storage for conversations and documents.
///
/// Result ordering is always `created_at` descending.
#[async_trait]
pub trait ContextStore: Send + Sync + std::fmt::Debug {
    // =========================================================================
    // Conversations
    // =========================================================================

    async fn insert_conversation(&self, entry: ConversationEntry) -> Result<ConversationEntry>;

    async fn recent_conversations(
        &self,
        filter: &ConversationFilter,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>>;

    /// Returns whether an entry was removed.
    async fn delete_conversation(&self, id: Uuid) -> Result<bool>;

    // =========================================================================
    // Documents
    // =========================================================================

    async fn insert_document(&self, document: Document) -> Result<Document>;

    /// Case-insensitive substring match over title or content. With no
    /// query, returns the newest documents.
    async fn search_documents(&self, query: Option<&str>, limit: usize) -> Result<Vec<Document>>;

    async fn delete_document(&self, id: Uuid) -> Result<bool>;
}
