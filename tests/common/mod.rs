//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentic_chat_gateway::config::{
    AppConfig, ContextConfig, LlmConfig, McpSettings, ModelInfo, PersistenceConfig,
};
use agentic_chat_gateway::context::{ConversationEntry, Document};
use agentic_chat_gateway::llm::{DriverStream, LlmDriver, LlmRequest, LlmSettings, Provider};
use agentic_chat_gateway::mcp::{
    ConnectionRegistry, McpError, ServerConfig, SessionConnector, SessionFactory, ToolAggregator,
    ToolDescriptor, ToolSession, TransportKind,
};
use agentic_chat_gateway::normalized::NormalizedEvent;
use agentic_chat_gateway::persistence::providers::MemoryStore;
use agentic_chat_gateway::persistence::{ContextStore, ConversationFilter};
use async_trait::async_trait;
use uuid::Uuid;

// ============================================================================
// MCP fakes
// ============================================================================

/// Behaviour of one fake tool server, keyed by server name.
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    pub tools: Vec<ToolDescriptor>,
    /// Delay before `open` returns.
    pub delay: Option<Duration>,
    pub open_error: Option<McpError>,
    /// Number of successful listings before `list_tools` starts failing.
    pub list_ok_times: Option<usize>,
}

impl FakeServer {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names
                .iter()
                .map(|n| ToolDescriptor::new(*n, Some(format!("{n} tool").as_str())))
                .collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn listing_fails_after(mut self, ok_times: usize) -> Self {
        self.list_ok_times = Some(ok_times);
        self
    }

    pub fn failing(error: McpError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct FakeSession {
    name: String,
    transport: TransportKind,
    tools: Vec<ToolDescriptor>,
    list_ok_times: Option<usize>,
    lists: AtomicUsize,
}

#[async_trait]
impl ToolSession for FakeSession {
    fn server_name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> TransportKind {
        self.transport
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let seen = self.lists.fetch_add(1, Ordering::SeqCst);
        if self.list_ok_times.is_some_and(|ok| seen >= ok) {
            return Err(McpError::tool_fetch(&self.name, "session closed"));
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        Ok(serde_json::json!({
            "server": self.name,
            "tool": name,
            "arguments": arguments,
        }))
    }
}

/// Connector that hands out [`FakeSession`]s and counts attempts.
#[derive(Debug, Default)]
pub struct FakeConnector {
    servers: Mutex<HashMap<String, FakeServer>>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_server(self, name: &str, server: FakeServer) -> Self {
        self.servers.lock().unwrap().insert(name.to_string(), server);
        self
    }

    pub fn attempts(&self, name: &str) -> usize {
        self.attempts.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn open(&self, config: &ServerConfig) -> Result<Arc<dyn ToolSession>, McpError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(config.name.clone())
            .or_default() += 1;

        let server = self.servers.lock().unwrap().get(&config.name).cloned();
        let Some(server) = server else {
            return Err(McpError::Initialize {
                server: config.name.clone(),
                message: "no such fake server".to_string(),
            });
        };

        if let Some(delay) = server.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = server.open_error {
            return Err(error);
        }

        Ok(Arc::new(FakeSession {
            name: config.name.clone(),
            transport: config.transport,
            tools: server.tools,
            list_ok_times: server.list_ok_times,
            lists: AtomicUsize::new(0),
        }))
    }
}

/// A stdio config for a fake server. The command is never executed.
pub fn stdio(name: &str) -> ServerConfig {
    ServerConfig::stdio(name, "fake-mcp-server")
}

pub fn aggregator(connector: Arc<FakeConnector>) -> ToolAggregator {
    ToolAggregator::new(SessionFactory::new(
        connector,
        Arc::new(ConnectionRegistry::new()),
    ))
}

// ============================================================================
// LLM fakes
// ============================================================================

/// Driver that replays one scripted event list per request.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    scripts: Mutex<Vec<Vec<NormalizedEvent>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedDriver {
    pub fn new(scripts: Vec<Vec<NormalizedEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmDriver for ScriptedDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<DriverStream> {
        self.requests.lock().unwrap().push(req);
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            anyhow::bail!("401 Unauthorized: no script left");
        }
        let events = scripts.remove(0);
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }
}

pub fn llm_settings() -> LlmSettings {
    LlmSettings {
        base_url: "http://127.0.0.1:1".to_string(),
        api_key: None,
        default_model: "test/default".to_string(),
        provider: Provider::Generic,
        parallel_tool_calls: None,
    }
}

pub fn text_reply(text: &str) -> Vec<NormalizedEvent> {
    vec![
        NormalizedEvent::MessageDelta {
            text: text.to_string(),
        },
        NormalizedEvent::Done,
    ]
}

pub fn tool_call_reply(id: &str, name: &str, arguments: &str) -> Vec<NormalizedEvent> {
    vec![
        NormalizedEvent::ToolCallDelta {
            call_index: 0,
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            arguments_delta: Some(arguments.to_string()),
        },
        NormalizedEvent::ToolCallComplete {
            call_index: 0,
            id: id.to_string(),
            name: name.to_string(),
            arguments_json: arguments.to_string(),
        },
        NormalizedEvent::Done,
    ]
}

// ============================================================================
// Store fakes
// ============================================================================

/// Memory store whose lookups can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_history: bool,
    pub fail_documents: bool,
    pub fail_writes: bool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for FlakyStore {
    async fn insert_conversation(&self, entry: ConversationEntry) -> anyhow::Result<ConversationEntry> {
        if self.fail_writes {
            anyhow::bail!("store is read-only");
        }
        self.inner.insert_conversation(entry).await
    }

    async fn recent_conversations(
        &self,
        filter: &ConversationFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<ConversationEntry>> {
        if self.fail_history {
            anyhow::bail!("conversation table unavailable");
        }
        self.inner.recent_conversations(filter, limit).await
    }

    async fn delete_conversation(&self, id: Uuid) -> anyhow::Result<bool> {
        self.inner.delete_conversation(id).await
    }

    async fn insert_document(&self, document: Document) -> anyhow::Result<Document> {
        if self.fail_writes {
            anyhow::bail!("store is read-only");
        }
        self.inner.insert_document(document).await
    }

    async fn search_documents(&self, query: Option<&str>, limit: usize) -> anyhow::Result<Vec<Document>> {
        if self.fail_documents {
            anyhow::bail!("document index unavailable");
        }
        self.inner.search_documents(query, limit).await
    }

    async fn delete_document(&self, id: Uuid) -> anyhow::Result<bool> {
        self.inner.delete_document(id).await
    }
}

// ============================================================================
// App wiring
// ============================================================================

pub fn test_config() -> AppConfig {
    AppConfig {
        server: agentic_chat_gateway::config::ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            body_limit_bytes: 1024 * 1024,
        },
        llm: LlmConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: None,
            default_model: "test/default".to_string(),
            enhance_model: "test/enhance".to_string(),
            models: vec![ModelInfo {
                id: "test/default".to_string(),
                name: "Test Default".to_string(),
            }],
            max_tool_iterations: 4,
            parallel_tool_calls: None,
        },
        mcp: McpSettings {
            connect_timeout_secs: 5,
            servers_file: None,
        },
        context: ContextConfig {
            history_limit: 20,
            document_limit: 5,
            recent_turns_in_prompt: 5,
            excerpt_chars: 100,
            agent_id: "main".to_string(),
        },
        persistence: PersistenceConfig {
            provider: "memory".to_string(),
            database_url: None,
        },
    }
}
