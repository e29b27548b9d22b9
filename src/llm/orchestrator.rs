//! LLM orchestrator with tool loop execution.
//!
//! The orchestrator manages the complete lifecycle of one model invocation:
//! 1. Send the conversation (system instructions first) to the driver
//! 2. Stream the response, detecting tool calls
//! 3. Execute tool calls against the turn's [`ToolCatalog`]
//! 4. Feed tool results back to the model
//! 5. Repeat until the model produces a final response
//!
//! # Example
//!
//! ```rust,ignore
//! use agentic_chat_gateway::llm::{Invocation, Message, Orchestrator};
//!
//! let orchestrator = Orchestrator::new(settings);
//! let invocation = Invocation::new(vec![Message::user("What time is it?")])
//!     .with_tools(aggregation.catalog);
//! let stream = orchestrator.stream(invocation).await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::mcp::ToolCatalog;
use crate::normalized::NormalizedEvent;

use super::{
    ChatCompletionsDriver, DriverStream, LlmDriver, LlmRequest, LlmSettings, Message, ToolCall,
    ToolCallFunction,
};

/// Default bound on tool loop iterations.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;

/// Accumulated state for a streaming tool call.
#[derive(Debug, Default, Clone)]
struct ToolCallAccumulator {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Final outcome of a streamed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub model: String,
    /// Assistant text across all loop iterations.
    pub text: String,
    /// Number of tool invocations executed.
    pub tool_calls: usize,
}

/// Boxed stream of turn events.
pub type EventStream = std::pin::Pin<Box<dyn Stream<Item = NormalizedEvent> + Send>>;

/// Called once when a streamed invocation finishes without error.
pub type CompletionCallback = Box<dyn FnOnce(Completion) -> BoxFuture<'static, ()> + Send>;

/// One model invocation.
pub struct Invocation {
    /// Model identifier; the configured default when `None`.
    pub model: Option<String>,
    /// Per-request key, overrides the configured one.
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    /// Tools offered to the model. An empty catalog leaves `tools` out of
    /// the request.
    pub tools: ToolCatalog,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub on_complete: Option<CompletionCallback>,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("system_prompt", &self.system_prompt.as_ref().map(String::len))
            .field("messages", &self.messages.len())
            .field("tools", &self.tools.names())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

impl Invocation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            api_key: None,
            system_prompt: None,
            messages,
            tools: ToolCatalog::default(),
            temperature: None,
            max_tokens: None,
            on_complete: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: ToolCatalog) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Completion) -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    fn message_json(&self) -> Vec<serde_json::Value> {
        let system = self
            .system_prompt
            .as_ref()
            .map(|p| serde_json::json!({ "role": "system", "content": p }));

        system
            .into_iter()
            .chain(
                self.messages
                    .iter()
                    .map(|m| serde_json::to_value(m).unwrap_or_default()),
            )
            .collect()
    }

    fn tools_json(&self) -> Option<Vec<serde_json::Value>> {
        if self.tools.is_empty() {
            None
        } else {
            Some(self.tools.openai_tools_json())
        }
    }
}

/// LLM orchestrator with tool loop execution.
///
/// The orchestrator wraps an [`LlmDriver`] and adds:
/// - Tool call detection and accumulation
/// - Tool execution via the turn's catalog
/// - Automatic tool result feeding
/// - Request ID tracking
#[derive(Clone)]
pub struct Orchestrator {
    settings: LlmSettings,
    driver: Arc<dyn LlmDriver>,
    max_iterations: usize,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator backed by the Chat Completions driver.
    pub fn new(settings: LlmSettings) -> Self {
        let driver: Arc<dyn LlmDriver> = Arc::new(ChatCompletionsDriver::new(settings.clone()));
        Self::with_driver(settings, driver)
    }

    pub fn with_driver(settings: LlmSettings, driver: Arc<dyn LlmDriver>) -> Self {
        Self {
            settings,
            driver,
            max_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Get the LLM settings.
    #[must_use]
    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn resolve_model(&self, model: Option<&str>) -> String {
        model.map_or_else(|| self.settings.default_model.clone(), ToString::to_string)
    }

    /// Stream one invocation, running the tool loop.
    ///
    /// The first driver call happens before this returns, so a model that
    /// cannot be reached is reported as an `Err` rather than as an in-stream
    /// error event. The stream yields:
    /// - `StreamStart` with a unique request ID
    /// - `MessageDelta` for assistant text
    /// - `ToolCallDelta` and `ToolCallComplete` for tool calls
    /// - `ToolResult` after tool execution
    /// - `Done` when complete
    ///
    /// # Errors
    ///
    /// Returns the driver's error when the first request cannot be started.
    #[allow(clippy::too_many_lines)]
    pub async fn stream(
        &self,
        mut invocation: Invocation,
    ) -> anyhow::Result<EventStream> {
        let request_id = Uuid::new_v4().to_string();
        let model = self.resolve_model(invocation.model.as_deref());
        let tools = invocation.tools_json();
        let mut message_json = invocation.message_json();

        tracing::info!(
            request_id = %request_id,
            model = %model,
            message_count = message_json.len(),
            tool_count = tools.as_ref().map_or(0, Vec::len),
            "Starting orchestrator stream"
        );

        let base_request = LlmRequest {
            model: model.clone(),
            api_key: invocation.api_key.take(),
            messages: Vec::new(),
            tools,
            temperature: invocation.temperature,
            max_tokens: invocation.max_tokens,
        };

        let first = self
            .driver
            .stream(LlmRequest {
                messages: message_json.clone(),
                ..base_request.clone()
            })
            .await
            .inspect_err(|e| {
                tracing::error!(
                    request_id = %request_id,
                    model = %model,
                    error = %e,
                    "Failed to create driver stream"
                );
            })?;

        let driver = Arc::clone(&self.driver);
        let max_iterations = self.max_iterations;
        let catalog = std::mem::take(&mut invocation.tools);
        let on_complete = invocation.on_complete.take();

        let stream = async_stream::stream! {
            yield NormalizedEvent::StreamStart {
                request_id: request_id.clone(),
            };

            let mut pending: Option<DriverStream> = Some(first);
            let mut full_text = String::new();
            let mut executed = 0usize;
            let mut iteration = 0;

            loop {
                if iteration >= max_iterations {
                    tracing::error!(
                        request_id = %request_id,
                        iteration = iteration,
                        max_iterations = max_iterations,
                        "Maximum tool loop iterations exceeded"
                    );
                    yield NormalizedEvent::Error {
                        message: "Maximum tool loop iterations exceeded".to_string(),
                        code: Some("MAX_ITERATIONS".to_string()),
                    };
                    return;
                }
                iteration += 1;

                let driver_stream = match pending.take() {
                    Some(s) => s,
                    None => {
                        tracing::debug!(
                            request_id = %request_id,
                            iteration = iteration,
                            message_count = message_json.len(),
                            "Sending follow-up request to LLM driver"
                        );
                        let req = LlmRequest {
                            messages: message_json.clone(),
                            ..base_request.clone()
                        };
                        match driver.stream(req).await {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::error!(
                                    request_id = %request_id,
                                    iteration = iteration,
                                    error = %e,
                                    "Failed to create driver stream"
                                );
                                yield NormalizedEvent::Error {
                                    message: e.to_string(),
                                    code: None,
                                };
                                return;
                            }
                        }
                    }
                };

                let mut tool_accumulators: BTreeMap<usize, ToolCallAccumulator> = BTreeMap::new();
                let mut assistant_text = String::new();
                let mut saw_tool_complete = false;

                futures::pin_mut!(driver_stream);

                while let Some(result) = driver_stream.next().await {
                    match result {
                        Ok(event) => {
                            match &event {
                                NormalizedEvent::MessageDelta { text } => {
                                    assistant_text.push_str(text);
                                }
                                NormalizedEvent::ToolCallDelta {
                                    call_index,
                                    id,
                                    name,
                                    arguments_delta,
                                } => {
                                    let acc = tool_accumulators.entry(*call_index).or_default();
                                    if acc.id.is_none() {
                                        acc.id.clone_from(id);
                                    }
                                    if acc.name.is_none() {
                                        acc.name.clone_from(name);
                                    }
                                    if let Some(delta) = arguments_delta {
                                        acc.arguments.push_str(delta);
                                    }
                                }
                                NormalizedEvent::ToolCallComplete { .. } => {
                                    saw_tool_complete = true;
                                }
                                // Done is emitted once, after the final iteration.
                                NormalizedEvent::Done => continue,
                                NormalizedEvent::Error { .. } => {
                                    yield event;
                                    return;
                                }
                                _ => {}
                            }
                            yield event;
                        }
                        Err(e) => {
                            yield NormalizedEvent::Error {
                                message: e.to_string(),
                                code: None,
                            };
                            return;
                        }
                    }
                }

                full_text.push_str(&assistant_text);

                let tool_calls: Vec<ToolCall> = if saw_tool_complete {
                    tool_accumulators
                        .values()
                        .filter_map(|acc| {
                            Some(ToolCall {
                                id: acc.id.clone()?,
                                call_type: "function".to_string(),
                                function: ToolCallFunction {
                                    name: acc.name.clone()?,
                                    arguments: acc.arguments.clone(),
                                },
                            })
                        })
                        .collect()
                } else {
                    Vec::new()
                };

                if tool_calls.is_empty() {
                    tracing::info!(
                        request_id = %request_id,
                        iteration = iteration,
                        tool_calls = executed,
                        text_length = full_text.len(),
                        "Orchestrator stream complete"
                    );
                    if let Some(callback) = on_complete {
                        callback(Completion {
                            model: model.clone(),
                            text: full_text,
                            tool_calls: executed,
                        })
                        .await;
                    }
                    yield NormalizedEvent::Done;
                    return;
                }

                message_json.push(serde_json::json!({
                    "role": "assistant",
                    "content": if assistant_text.is_empty() { serde_json::Value::Null } else { serde_json::Value::String(assistant_text.clone()) },
                    "tool_calls": tool_calls,
                }));

                for tool_call in &tool_calls {
                    let tool_name = &tool_call.function.name;
                    let arguments: serde_json::Value = serde_json::from_str(&tool_call.function.arguments)
                        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));

                    tracing::info!(
                        request_id = %request_id,
                        iteration = iteration,
                        tool_id = %tool_call.id,
                        tool_name = %tool_name,
                        "Executing tool call"
                    );

                    let (content, success) = match catalog.call(tool_name, arguments).await {
                        Ok(result) => {
                            let content = serde_json::to_string(&result).unwrap_or_default();
                            tracing::debug!(
                                request_id = %request_id,
                                tool_id = %tool_call.id,
                                result_length = content.len(),
                                "Tool call succeeded"
                            );
                            (content, true)
                        }
                        Err(e) => {
                            tracing::warn!(
                                request_id = %request_id,
                                tool_id = %tool_call.id,
                                tool_name = %tool_name,
                                error = %e,
                                "Tool call failed"
                            );
                            (format!("Error: {e}"), false)
                        }
                    };
                    executed += 1;

                    yield NormalizedEvent::ToolResult {
                        id: tool_call.id.clone(),
                        name: tool_name.clone(),
                        content: content.clone(),
                        success,
                    };

                    message_json.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": tool_call.id,
                        "content": content
                    }));
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Non-streaming invocation without tools, e.g. prompt enhancement.
    ///
    /// Collects all message deltas into a single string.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails or reports an in-stream error.
    pub async fn complete(&self, invocation: Invocation) -> anyhow::Result<String> {
        let request_id = Uuid::new_v4().to_string();
        let model = self.resolve_model(invocation.model.as_deref());

        tracing::debug!(
            request_id = %request_id,
            model = %model,
            message_count = invocation.messages.len(),
            "Starting non-streaming completion"
        );

        let req = LlmRequest {
            model,
            messages: invocation.message_json(),
            api_key: invocation.api_key,
            tools: None,
            temperature: invocation.temperature,
            max_tokens: invocation.max_tokens,
        };

        let mut stream = self.driver.stream(req).await?;
        let mut content = String::new();

        while let Some(event_result) = stream.next().await {
            match event_result? {
                NormalizedEvent::MessageDelta { text } => content.push_str(&text),
                NormalizedEvent::Error { message, .. } => anyhow::bail!(message),
                _ => {}
            }
        }

        tracing::debug!(
            request_id = %request_id,
            content_length = content.len(),
            "Non-streaming completion finished"
        );

        Ok(content)
    }
}
