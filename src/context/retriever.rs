//! Best-effort context retrieval for a turn.

use std::sync::Arc;

use chrono::Utc;

use super::types::{ContextBundle, ConversationEntry, Document, EntryRole, tag_metadata};
use crate::persistence::{ContextStore, ConversationFilter};

/// Default number of history entries per bundle.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
/// Default number of documents per bundle.
pub const DEFAULT_DOCUMENT_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct ContextRetriever {
    store: Arc<dyn ContextStore>,
    history_limit: usize,
    document_limit: usize,
}

impl ContextRetriever {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self {
            store,
            history_limit: DEFAULT_HISTORY_LIMIT,
            document_limit: DEFAULT_DOCUMENT_LIMIT,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, history_limit: usize, document_limit: usize) -> Self {
        self.history_limit = history_limit;
        self.document_limit = document_limit;
        self
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    pub async fn store_conversation(&self, entry: ConversationEntry) -> anyhow::Result<ConversationEntry> {
        self.store.insert_conversation(entry).await
    }

    /// Store a user message, tagged `message_type = "user_input"`.
    pub async fn store_user_message(
        &self,
        session_id: &str,
        agent_id: Option<&str>,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> anyhow::Result<ConversationEntry> {
        let mut entry = ConversationEntry::new(session_id, EntryRole::User, content)
            .with_metadata(tag_metadata(metadata, "message_type", "user_input"));
        entry.agent_id = agent_id.map(ToString::to_string);
        self.store.insert_conversation(entry).await
    }

    /// Store a response produced by a sub-agent, tagged `agent_type = "sub_agent"`.
    pub async fn store_agent_response(
        &self,
        session_id: &str,
        agent_id: &str,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> anyhow::Result<ConversationEntry> {
        let entry = ConversationEntry::new(session_id, EntryRole::Assistant, content)
            .with_agent(agent_id)
            .with_metadata(tag_metadata(metadata, "agent_type", "sub_agent"));
        self.store.insert_conversation(entry).await
    }

    /// Newest-first history for a session, optionally limited to one agent.
    pub async fn get_recent_context(
        &self,
        session_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<ConversationEntry>> {
        let filter = ConversationFilter::session(session_id).with_agent(agent_id);
        self.store.recent_conversations(&filter, limit).await
    }

    pub async fn get_relevant_documents(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<Document>> {
        self.store.search_documents(query, limit).await
    }

    /// Run both lookups concurrently. A failing lookup contributes an empty
    /// list; the other one's result is kept.
    pub async fn build_context(
        &self,
        session_id: &str,
        agent_id: Option<&str>,
        user_query: Option<&str>,
    ) -> ContextBundle {
        let (history, documents) = tokio::join!(
            self.get_recent_context(session_id, agent_id, self.history_limit),
            self.get_relevant_documents(user_query, self.document_limit),
        );

        let recent_conversations = history.unwrap_or_else(|e| {
            tracing::warn!(
                name: "context.history.failed",
                session_id = %session_id,
                error = %e,
                "Conversation lookup failed; continuing without history"
            );
            Vec::new()
        });

        let relevant_documents = documents.unwrap_or_else(|e| {
            tracing::warn!(
                name: "context.documents.failed",
                session_id = %session_id,
                error = %e,
                "Document search failed; continuing without documents"
            );
            Vec::new()
        });

        tracing::debug!(
            session_id = %session_id,
            history = recent_conversations.len(),
            documents = relevant_documents.len(),
            "Context bundle built"
        );

        ContextBundle {
            session_id: session_id.to_string(),
            agent_id: agent_id.map(ToString::to_string),
            recent_conversations,
            relevant_documents,
            timestamp: Utc::now(),
        }
    }
}
