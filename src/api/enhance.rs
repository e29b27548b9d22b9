use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;
use crate::llm::{Invocation, Message};

const DEFAULT_ENHANCEMENT_PROMPT: &str = "You are a prompt enhancement specialist. Your job is to take casual, natural language input and transform it into clear, effective prompts that will get better results from AI systems.

Guidelines:
- Make the intent crystal clear
- Add helpful context and structure
- Specify the desired output format when relevant
- Include any necessary constraints or requirements
- Keep the enhanced prompt concise but comprehensive
- Preserve the original meaning while making it more actionable

Transform this user input into an enhanced prompt:";

const ENHANCE_TEMPERATURE: f32 = 0.7;
const ENHANCE_MAX_TOKENS: u32 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceRequest {
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default, alias = "systemPrompt")]
    pub enhancement_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceResponse {
    pub original_input: String,
    pub enhanced_prompt: String,
    pub model: String,
}

/// POST /api/enhance-prompt - Rewrite casual input as a sharper prompt.
pub async fn api_enhance_prompt(
    State(state): State<AppState>,
    Json(req): Json<EnhanceRequest>,
) -> Response {
    let Some(user_input) = req.user_input.filter(|s| !s.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No input provided" }))).into_response();
    };

    let model = state.config.llm.enhance_model.clone();
    let system = req
        .enhancement_prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENHANCEMENT_PROMPT.to_string());

    tracing::info!(
        name: "enhance.request",
        model = %model,
        input_length = user_input.len(),
        "Enhancing prompt"
    );

    let invocation = Invocation::new(vec![Message::user(user_input.as_str())])
        .with_model(Some(model.clone()))
        .with_system_prompt(system)
        .with_sampling(Some(ENHANCE_TEMPERATURE), Some(ENHANCE_MAX_TOKENS));

    match state.orchestrator.complete(invocation).await {
        Ok(text) => Json(EnhanceResponse {
            original_input: user_input,
            enhanced_prompt: text.trim().to_string(),
            model,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(name: "enhance.failed", error = %e, "Prompt enhancement failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to enhance prompt",
                    "details": format!("{e:#}"),
                })),
            )
                .into_response()
        }
    }
}
