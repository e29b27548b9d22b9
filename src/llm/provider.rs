//! Provider-specific configuration and detection.
//!
//! Every supported provider speaks the OpenAI-compatible Chat Completions
//! dialect; they differ in URL layout, optional headers and feature support.

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// `OpenRouter` (openrouter.ai), the default router.
    OpenRouter,
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// Together AI (together.ai, together.xyz)
    TogetherAI,
    /// Groq (groq.com)
    Groq,
    /// Generic OpenAI-compatible provider
    Generic,
}

impl Provider {
    /// Detect provider from base URL.
    ///
    /// # Example
    ///
    /// ```rust
    /// use agentic_chat_gateway::llm::Provider;
    ///
    /// let provider = Provider::detect_from_url("https://openrouter.ai/api");
    /// assert_eq!(provider, Provider::OpenRouter);
    /// ```
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("openrouter.ai") {
            Self::OpenRouter
        } else if lower.contains("together.ai") || lower.contains("together.xyz") {
            Self::TogetherAI
        } else if lower.contains("groq.com") {
            Self::Groq
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Whether the `parallel_tool_calls` request flag may be sent.
    #[must_use]
    pub fn supports_parallel_tools(self) -> bool {
        matches!(self, Self::OpenAI | Self::Groq | Self::OpenRouter)
    }

    /// Build the chat completions URL for this provider.
    ///
    /// Groq serves its compatible API under `/openai`.
    #[must_use]
    pub fn build_chat_url(self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::Groq if !base.ends_with("/openai") => format!("{base}/openai/v1/chat/completions"),
            _ => format!("{base}/v1/chat/completions"),
        }
    }

    /// Extra headers the provider uses for app attribution.
    #[must_use]
    pub fn attribution_headers(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::OpenRouter => &[("X-Title", "agentic-chat-gateway")],
            _ => &[],
        }
    }
}
