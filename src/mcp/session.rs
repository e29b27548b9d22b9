//! Live sessions to tool servers.
//!
//! A [`ToolSession`] is the capability handed out by the registry: list the
//! server's tools, or invoke one. Both production transports wrap an rmcp
//! running client service.

use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use serde::{Deserialize, Serialize};

use super::config::TransportKind;
use super::error::McpError;

pub(crate) type DynClientService = rmcp::service::RunningService<
    rmcp::service::RoleClient,
    Box<dyn rmcp::service::DynService<rmcp::service::RoleClient>>,
>;

/// One tool as advertised by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments.
    pub input_schema: serde_json::Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            name: name.into(),
            description: description.map(ToString::to_string),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }
}

impl From<rmcp::model::Tool> for ToolDescriptor {
    fn from(tool: rmcp::model::Tool) -> Self {
        let input_schema = serde_json::to_value(&*tool.input_schema)
            .unwrap_or_else(|_| serde_json::json!({ "type": "object", "properties": {} }));
        Self {
            name: tool.name.to_string(),
            description: tool.description.map(|d| d.to_string()),
            input_schema,
        }
    }
}

#[async_trait]
pub trait ToolSession: Send + Sync + std::fmt::Debug {
    fn server_name(&self) -> &str;

    fn transport(&self) -> TransportKind;

    /// Ask the server for its current tool list. Never cached.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError>;
}

/// Session over a spawned subprocess.
pub struct StdioSession {
    server: String,
    service: DynClientService,
}

/// Session over HTTP.
pub struct SseSession {
    server: String,
    service: DynClientService,
}

impl StdioSession {
    pub(crate) fn new(server: String, service: DynClientService) -> Self {
        Self { server, service }
    }
}

impl SseSession {
    pub(crate) fn new(server: String, service: DynClientService) -> Self {
        Self { server, service }
    }
}

impl std::fmt::Debug for StdioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioSession")
            .field("server", &self.server)
            .finish()
    }
}

impl std::fmt::Debug for SseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseSession")
            .field("server", &self.server)
            .finish()
    }
}

async fn list_via(
    server: &str,
    service: &DynClientService,
) -> Result<Vec<ToolDescriptor>, McpError> {
    let tools = service
        .list_all_tools()
        .await
        .map_err(|e| McpError::tool_fetch(server, e.to_string()))?;
    Ok(tools.into_iter().map(ToolDescriptor::from).collect())
}

async fn call_via(
    server: &str,
    service: &DynClientService,
    name: &str,
    arguments: serde_json::Value,
) -> Result<serde_json::Value, McpError> {
    let to_error = |message: String| McpError::ToolCall {
        server: server.to_string(),
        tool: name.to_string(),
        message,
    };

    let res = service
        .call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments: arguments.as_object().cloned(),
        })
        .await
        .map_err(|e| to_error(e.to_string()))?;

    serde_json::to_value(res).map_err(|e| to_error(e.to_string()))
}

#[async_trait]
impl ToolSession for StdioSession {
    fn server_name(&self) -> &str {
        &self.server
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        list_via(&self.server, &self.service).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        call_via(&self.server, &self.service, name, arguments).await
    }
}

#[async_trait]
impl ToolSession for SseSession {
    fn server_name(&self) -> &str {
        &self.server
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        list_via(&self.server, &self.service).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        call_via(&self.server, &self.service, name, arguments).await
    }
}
