//! Model-invocation boundary.
//!
//! The [`LlmDriver`] trait is the streaming interface to a hosted model. The
//! [`Orchestrator`] builds on a driver to run the tool loop against a turn's
//! [`ToolCatalog`](crate::mcp::ToolCatalog).
//!
//! # Drivers
//!
//! - [`ChatCompletionsDriver`]: OpenAI-compatible Chat Completions API, used
//!   for `OpenRouter` and any other compatible router.
//!
//! # Example
//!
//! ```rust,ignore
//! use agentic_chat_gateway::llm::{LlmSettings, Orchestrator, Provider};
//!
//! let settings = LlmSettings {
//!     base_url: "https://openrouter.ai/api".to_string(),
//!     api_key: Some("sk-or-...".to_string()),
//!     default_model: "google/gemini-2.5-pro-preview".to_string(),
//!     provider: Provider::OpenRouter,
//!     parallel_tool_calls: None,
//! };
//! let orchestrator = Orchestrator::new(settings);
//! ```

pub mod chat_completions;
pub mod orchestrator;
pub mod provider;

pub use chat_completions::ChatCompletionsDriver;
pub use orchestrator::{Completion, EventStream, Invocation, Orchestrator};
pub use provider::Provider;

use crate::config::LlmConfig;
use crate::normalized::NormalizedEvent;
use futures::Stream;

/// Connection settings for the model router.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the API (e.g., `https://openrouter.ai/api`).
    pub base_url: String,
    /// Server-side API key. A per-request key takes precedence.
    pub api_key: Option<String>,
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
    /// Whether to enable parallel tool calls (provider-dependent).
    pub parallel_tool_calls: Option<bool>,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("default_model", &self.default_model)
            .field("provider", &self.provider)
            .field("parallel_tool_calls", &self.parallel_tool_calls)
            .finish()
    }
}

impl LlmSettings {
    pub fn from_config(cfg: &LlmConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            default_model: cfg.default_model.clone(),
            provider: Provider::detect_from_url(&cfg.base_url),
            parallel_tool_calls: cfg.parallel_tool_calls,
        }
    }
}

/// A message in a conversation.
///
/// Messages can contain either simple text content or multimodal content
/// with images and text parts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Content of the message (text or multimodal parts).
    #[serde(flatten)]
    pub content: MessageContent,
    /// Optional tool call ID (for tool responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Optional tool calls made by the assistant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    /// A plain-text message.
    pub fn new(role: MessageRole, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Message content - either simple text or multimodal parts.
///
/// This enum allows backward compatibility with text-only messages
/// while supporting the new multimodal content format.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content (backward compatible).
    Text { content: String },
    /// Multimodal content with text and image parts.
    Parts { content: Vec<ContentPart> },
}

impl MessageContent {
    /// Create simple text content.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { content: s.into() }
    }

    /// Create multimodal content from parts.
    #[must_use]
    pub fn parts(parts: Vec<ContentPart>) -> Self {
        Self::Parts { content: parts }
    }

    /// Get the text content (first text part or entire string).
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            Self::Parts { content } => content.iter().find_map(|p| {
                if let ContentPart::Text { text } = p {
                    Some(text.as_str())
                } else {
                    None
                }
            }),
        }
    }

    /// Attach images as extra parts after the text.
    ///
    /// Existing parts are kept; plain text becomes the leading text part.
    #[must_use]
    pub fn with_images<I, S>(self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = match self {
            Self::Text { content } => vec![ContentPart::text(content)],
            Self::Parts { content } => content,
        };
        parts.extend(images.into_iter().map(ContentPart::image_url));
        Self::parts(parts)
    }

    /// Check if this content contains any images.
    #[must_use]
    pub fn has_images(&self) -> bool {
        matches!(self, Self::Parts { content } if content.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }

    /// Check if the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text { content } => content.is_empty(),
            Self::Parts { content } => content.is_empty(),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::text("")
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl std::fmt::Display for MessageContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "{text}"),
            None => write!(f, "[multimodal content]"),
        }
    }
}

/// A content part for multimodal messages.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Image content (URL or base64 data URL).
    ImageUrl {
        /// Image URL configuration.
        image_url: ImageUrl,
    },
}

impl ContentPart {
    /// Create a text content part.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }

    /// Create an image URL content part.
    #[must_use]
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: None,
            },
        }
    }
}

/// Image URL configuration for multimodal content.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImageUrl {
    /// Image URL (can be HTTP URL or base64 data URL).
    pub url: String,
    /// Detail level for image processing: "auto", "low", or "high".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
    /// Tool response.
    Tool,
}

/// A tool call made by the assistant.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// Type of tool (always "function" for now).
    #[serde(rename = "type")]
    pub call_type: String,
    /// Function details.
    pub function: ToolCallFunction,
}

/// Function details in a tool call.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallFunction {
    /// Function name.
    pub name: String,
    /// Arguments as JSON string.
    pub arguments: String,
}

/// Request to an LLM driver.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    /// Model identifier, e.g. `anthropic/claude-sonnet-4`.
    pub model: String,
    /// Overrides the driver's configured key for this request.
    pub api_key: Option<String>,
    /// Conversation messages, system prompt first when present.
    pub messages: Vec<serde_json::Value>,
    /// Tools in `OpenAI` function schema format. `None` leaves the `tools`
    /// field out of the request entirely.
    pub tools: Option<Vec<serde_json::Value>>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Boxed stream of driver events.
pub type DriverStream =
    std::pin::Pin<Box<dyn Stream<Item = anyhow::Result<NormalizedEvent>> + Send>>;

/// Trait for LLM streaming drivers.
///
/// Implementations of this trait provide streaming access to LLM responses,
/// emitting [`NormalizedEvent`]s as the model generates output.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync + std::fmt::Debug {
    /// Stream a response from the LLM.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started (connection
    /// failure, non-success status).
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<DriverStream>;
}
