use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::AppState;
use crate::context::Document;

const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct SearchDocumentsQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextQuery {
    pub agent_id: Option<String>,
    pub q: Option<String>,
}

fn store_error(action: &str, e: &anyhow::Error) -> Response {
    tracing::error!(name: "store.request.failed", action = action, error = %e, "Store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("Failed to {action}"), "details": format!("{e:#}") })),
    )
        .into_response()
}

/// POST /api/documents
pub async fn api_create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateDocumentRequest>,
) -> Response {
    if req.title.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Title is required" }))).into_response();
    }

    let mut document = Document::new(req.title, req.content);
    if let Some(metadata) = req.metadata {
        document = document.with_metadata(metadata);
    }

    match state.retriever.store().insert_document(document).await {
        Ok(stored) => (StatusCode::CREATED, Json(stored)).into_response(),
        Err(e) => store_error("store document", &e),
    }
}

/// GET /api/documents?q=&limit=
pub async fn api_search_documents(
    State(state): State<AppState>,
    Query(query): Query<SearchDocumentsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    match state
        .retriever
        .get_relevant_documents(query.q.as_deref(), limit)
        .await
    {
        Ok(docs) => Json(docs).into_response(),
        Err(e) => store_error("search documents", &e),
    }
}

/// DELETE /api/documents/{id}
pub async fn api_delete_document(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.retriever.store().delete_document(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error("delete document", &e),
    }
}

/// GET /api/sessions/{id}/context - The bundle a turn would see right now.
pub async fn api_session_context(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ContextQuery>,
) -> Response {
    let bundle = state
        .retriever
        .build_context(&session_id, query.agent_id.as_deref(), query.q.as_deref())
        .await;
    Json(bundle).into_response()
}

/// DELETE /api/conversations/{id}
pub async fn api_delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.retriever.store().delete_conversation(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error("delete conversation", &e),
    }
}
