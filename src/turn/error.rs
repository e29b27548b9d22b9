use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failures that end a turn. Server and retrieval problems never show up
/// here; they degrade the turn instead.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("model invocation failed: {0:#}")]
    ModelInvocationFailed(anyhow::Error),
}

impl TurnError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ModelInvocationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TurnError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::InvalidRequest(message) => serde_json::json!({ "error": message }),
            Self::ModelInvocationFailed(e) => serde_json::json!({
                "error": "Internal server error",
                "details": format!("{e:#}"),
            }),
        };
        (self.status(), Json(body)).into_response()
    }
}
