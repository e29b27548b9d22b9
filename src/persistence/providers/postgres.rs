use crate::context::types::{ConversationEntry, Document};
use crate::persistence::{ContextStore, ConversationFilter};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn conversation_from_row(row: &PgRow) -> Result<ConversationEntry> {
    let role: String = row.try_get("role")?;
    Ok(ConversationEntry {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        agent_id: row.try_get("agent_id")?,
        role: role.parse()?,
        content: row.try_get("content")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn document_from_row(row: &PgRow) -> Result<Document> {
    Ok(Document {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ContextStore for PostgresStore {
    async fn insert_conversation(&self, entry: ConversationEntry) -> Result<ConversationEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO conversations (id, session_id, agent_id, role, content, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, session_id, agent_id, role, content, metadata, created_at
            "#,
        )
        .bind(entry.id)
        .bind(&entry.session_id)
        .bind(&entry.agent_id)
        .bind(entry.role.as_str())
        .bind(&entry.content)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await?;

        conversation_from_row(&row)
    }

    async fn recent_conversations(
        &self,
        filter: &ConversationFilter,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, agent_id, role, content, metadata, created_at
            FROM conversations
            WHERE ($1::text IS NULL OR session_id = $1)
              AND ($2::text IS NULL OR agent_id = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(&filter.session_id)
        .bind(&filter.agent_id)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(conversation_from_row).collect()
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_document(&self, document: Document) -> Result<Document> {
        let row = sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, content, metadata, created_at
            "#,
        )
        .bind(document.id)
        .bind(&document.title)
        .bind(&document.content)
        .bind(&document.metadata)
        .bind(document.created_at)
        .fetch_one(&self.pool)
        .await?;

        document_from_row(&row)
    }

    async fn search_documents(&self, query: Option<&str>, limit: usize) -> Result<Vec<Document>> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(like_pattern);

        let rows = sqlx::query(
            r#"
            SELECT id, title, content, metadata, created_at
            FROM documents
            WHERE ($1::text IS NULL OR title ILIKE $1 OR content ILIKE $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
