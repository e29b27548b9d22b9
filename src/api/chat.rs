use axum::{Json, extract::State, response::Response};

use super::sse::build_sse_response;
use crate::AppState;
use crate::turn::{TurnError, TurnRequest};

/// POST /api/chat - Run one turn and stream it as SSE.
pub async fn api_chat(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> Result<Response, TurnError> {
    tracing::info!(
        name: "chat.request",
        messages = req.messages.len(),
        servers = req.mcp_servers.as_ref().map_or(state.turns.default_servers().len(), Vec::len),
        images = req.images.len(),
        model = ?req.model,
        selected_server = ?req.selected_mcp_server,
        session_id = ?req.session_id,
        "Starting chat turn"
    );

    let stream = state.turns.run(req).await.inspect_err(|e| {
        tracing::error!(name: "chat.failed", error = %e, "Chat turn failed");
    })?;

    Ok(build_sse_response(stream))
}
