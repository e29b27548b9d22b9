//! Per-turn orchestration: persist, retrieve, aggregate, compose, invoke.

use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;

use super::error::TurnError;
use super::instructions::{InstructionInputs, compose_instructions};
use crate::context::{ContextBundle, ContextRetriever};
use crate::llm::{EventStream, Invocation, Message, MessageRole, Orchestrator};
use crate::mcp::{Aggregation, ServerConfig, ServerStatusReport, ToolAggregator, ToolCatalog};
use crate::normalized::NormalizedEvent;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub messages: Vec<Message>,
    /// `None` falls back to the configured default servers; an explicit
    /// empty list means no tools.
    #[serde(default)]
    pub mcp_servers: Option<Vec<ServerConfig>>,
    /// Image URLs (usually `data:` URLs) attached to the latest user message.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "selectedMCPServer")]
    pub selected_mcp_server: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Knobs for turn assembly, taken from the `context` config section.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    /// Agent id under which this gateway's own messages are stored.
    pub agent_id: String,
    pub recent_turns_in_prompt: usize,
    pub excerpt_chars: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            agent_id: "main".to_string(),
            recent_turns_in_prompt: 5,
            excerpt_chars: 100,
        }
    }
}

/// Everything handed to the model boundary for one turn.
#[derive(Debug)]
pub struct TurnPayload {
    /// History with the latest user message already transformed.
    pub messages: Vec<Message>,
    pub catalog: ToolCatalog,
    pub statuses: Vec<ServerStatusReport>,
    pub instructions: String,
    pub context: Option<ContextBundle>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub session_id: Option<String>,
    pub selected_server: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnAssembler {
    retriever: ContextRetriever,
    aggregator: ToolAggregator,
    orchestrator: Arc<Orchestrator>,
    default_servers: Arc<Vec<ServerConfig>>,
    settings: TurnSettings,
}

impl TurnAssembler {
    pub fn new(
        retriever: ContextRetriever,
        aggregator: ToolAggregator,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            retriever,
            aggregator,
            orchestrator,
            default_servers: Arc::new(Vec::new()),
            settings: TurnSettings::default(),
        }
    }

    #[must_use]
    pub fn with_default_servers(mut self, servers: Vec<ServerConfig>) -> Self {
        self.default_servers = Arc::new(servers);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: TurnSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn default_servers(&self) -> &[ServerConfig] {
        &self.default_servers
    }

    /// Build the turn payload. Only a malformed request fails here; store
    /// and server problems leave the payload with less context or fewer
    /// tools.
    ///
    /// # Errors
    ///
    /// [`TurnError::InvalidRequest`] when `messages` is empty.
    pub async fn assemble(&self, request: TurnRequest) -> Result<TurnPayload, TurnError> {
        let TurnRequest {
            mut messages,
            mcp_servers,
            images,
            api_key,
            model,
            selected_mcp_server,
            session_id,
        } = request;

        let Some(last) = messages.last_mut() else {
            return Err(TurnError::InvalidRequest("No messages provided".to_string()));
        };
        let last_is_user = last.role == MessageRole::User;
        let query = last_is_user
            .then(|| last.content.as_text().map(ToString::to_string))
            .flatten();

        let session_id = session_id.filter(|s| !s.trim().is_empty());
        let agent_id = self.settings.agent_id.as_str();

        if let (Some(session), Some(text)) = (session_id.as_deref(), query.as_deref()) {
            let metadata = serde_json::json!({
                "selectedMCPServer": selected_mcp_server,
                "hasImages": !images.is_empty(),
            });
            if let Err(e) = self
                .retriever
                .store_user_message(session, Some(agent_id), text, Some(metadata))
                .await
            {
                tracing::warn!(
                    name: "turn.user_message.store_failed",
                    session_id = %session,
                    error = %e,
                    "Failed to persist user message; continuing"
                );
            }
        }

        let servers: &[ServerConfig] = mcp_servers.as_deref().unwrap_or(self.default_servers.as_slice());

        let context_lookup = async {
            match session_id.as_deref() {
                Some(session) => Some(
                    self.retriever
                        .build_context(session, Some(agent_id), query.as_deref())
                        .await,
                ),
                None => None,
            }
        };
        let (context, Aggregation { catalog, statuses }) =
            tokio::join!(context_lookup, self.aggregator.aggregate(servers));

        if last_is_user && !images.is_empty() {
            let content = std::mem::take(&mut last.content);
            last.content = content.with_images(images);
        }

        let instructions = compose_instructions(&InstructionInputs {
            context: context.as_ref(),
            statuses: &statuses,
            catalog: &catalog,
            preferred_server: selected_mcp_server.as_deref(),
            recent_turns: self.settings.recent_turns_in_prompt,
            excerpt_chars: self.settings.excerpt_chars,
        });

        tracing::info!(
            name: "turn.assembled",
            session_id = ?session_id,
            servers = statuses.len(),
            connected = statuses.iter().filter(|s| s.is_connected()).count(),
            tools = catalog.len(),
            history = context.as_ref().map_or(0, |c| c.recent_conversations.len()),
            "Turn assembled"
        );

        Ok(TurnPayload {
            messages,
            catalog,
            statuses,
            instructions,
            context,
            model,
            api_key,
            session_id,
            selected_server: selected_mcp_server,
        })
    }

    /// Assemble and invoke the model. The returned stream emits
    /// `mcp.status` right after `stream.start`, before any model output.
    ///
    /// # Errors
    ///
    /// [`TurnError::InvalidRequest`] for malformed requests,
    /// [`TurnError::ModelInvocationFailed`] when the model boundary cannot
    /// be started.
    pub async fn run(&self, request: TurnRequest) -> Result<EventStream, TurnError> {
        let payload = self.assemble(request).await?;
        let statuses = payload.statuses;

        let mut invocation = Invocation::new(payload.messages)
            .with_model(payload.model)
            .with_api_key(payload.api_key)
            .with_system_prompt(payload.instructions)
            .with_tools(payload.catalog);

        if let Some(session) = payload.session_id {
            let retriever = self.retriever.clone();
            let agent_id = self.settings.agent_id.clone();
            let selected = payload.selected_server;
            invocation = invocation.on_complete(move |completion| {
                Box::pin(async move {
                    if completion.text.is_empty() {
                        return;
                    }
                    let metadata = serde_json::json!({
                        "model": completion.model,
                        "toolsUsed": completion.tool_calls,
                        "selectedMCPServer": selected,
                    });
                    let entry = crate::context::ConversationEntry::new(
                        session.as_str(),
                        crate::context::EntryRole::Assistant,
                        completion.text,
                    )
                    .with_agent(agent_id)
                    .with_metadata(metadata);
                    if let Err(e) = retriever.store_conversation(entry).await {
                        tracing::warn!(
                            name: "turn.assistant_message.store_failed",
                            session_id = %session,
                            error = %e,
                            "Failed to persist assistant message"
                        );
                    }
                })
            });
        }

        let inner = self
            .orchestrator
            .stream(invocation)
            .await
            .map_err(TurnError::ModelInvocationFailed)?;

        let stream = async_stream::stream! {
            let mut status = Some(NormalizedEvent::McpStatus { servers: statuses });
            futures::pin_mut!(inner);
            while let Some(event) = inner.next().await {
                let started = matches!(event, NormalizedEvent::StreamStart { .. });
                if !started && let Some(s) = status.take() {
                    yield s;
                }
                yield event;
                if started && let Some(s) = status.take() {
                    yield s;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
