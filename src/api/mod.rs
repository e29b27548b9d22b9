//! HTTP surface consumed by the browser UI.
//!
//! - `POST /api/chat`: one streamed turn (SSE)
//! - `POST /api/enhance-prompt`: single-shot prompt rewrite
//! - `/api/documents`, `/api/sessions/{id}/context`, `/api/conversations/{id}`:
//!   context store management
//! - `/api/mcp/*`: registry inspection and server probing
//! - `GET /api/models`, `GET /health`

pub mod chat;
pub mod documents;
pub mod enhance;
pub mod mcp;
pub mod sse;

use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post},
};
use serde_json::json;

use crate::AppState;
use crate::config::ModelInfo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat", post(chat::api_chat))
        .route("/api/enhance-prompt", post(enhance::api_enhance_prompt))
        .route(
            "/api/documents",
            post(documents::api_create_document).get(documents::api_search_documents),
        )
        .route("/api/documents/{id}", delete(documents::api_delete_document))
        .route("/api/sessions/{id}/context", get(documents::api_session_context))
        .route("/api/conversations/{id}", delete(documents::api_delete_conversation))
        .route("/api/mcp/servers", get(mcp::api_list_servers))
        .route("/api/mcp/probe", post(mcp::api_probe_server))
        .route("/api/models", get(api_models))
        .route("/health", get(health))
}

/// GET /api/models - Models offered to the UI.
async fn api_models(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
    Json(state.config.llm.models.clone())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
