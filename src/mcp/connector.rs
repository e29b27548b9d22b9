//! Transport establishment.
//!
//! [`SessionConnector`] is the seam between the session factory and the
//! network: the factory owns timeouts, probing and caching, the connector
//! only brings a transport up and completes the MCP handshake.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::{
    service::ServiceExt,
    transport::{
        StreamableHttpClientTransport, TokioChildProcess,
        streamable_http_client::StreamableHttpClientTransportConfig,
    },
};
use tokio::process::Command;

use super::config::{ServerConfig, TransportKind, expand_env_map};
use super::error::McpError;
use super::session::{SseSession, StdioSession, ToolSession};

#[async_trait]
pub trait SessionConnector: Send + Sync + std::fmt::Debug {
    /// Open a session for `config`. Callers validate the config first.
    async fn open(&self, config: &ServerConfig) -> Result<Arc<dyn ToolSession>, McpError>;
}

/// Connector backed by the rmcp client.
#[derive(Debug, Clone, Default)]
pub struct RmcpConnector {
    http: reqwest::Client,
}

impl RmcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    async fn open_stdio(&self, config: &ServerConfig) -> Result<Arc<dyn ToolSession>, McpError> {
        let command = config
            .command
            .as_deref()
            .ok_or_else(|| McpError::ConfigInvalid {
                server: config.name.clone(),
                reason: "missing command for stdio server".to_string(),
            })?;

        // The child inherits the gateway's environment; config.env overrides it.
        let mut cmd = Command::new(command);
        cmd.args(&config.args)
            .envs(expand_env_map(&config.env))
            .kill_on_drop(true);

        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| McpError::from_spawn(&config.name, command, &e))?;

        let service = ().into_dyn().serve(transport).await.map_err(|e| {
            McpError::from_handshake(&config.name, e.to_string())
        })?;

        tracing::debug!(
            name: "mcp.session.stdio.ready",
            server = %config.name,
            command = %command,
            "stdio session established"
        );

        Ok(Arc::new(StdioSession::new(config.name.clone(), service)))
    }

    async fn open_sse(&self, config: &ServerConfig) -> Result<Arc<dyn ToolSession>, McpError> {
        let url = config.url.as_deref().ok_or_else(|| McpError::ConfigInvalid {
            server: config.name.clone(),
            reason: "missing URL for sse server".to_string(),
        })?;

        let http = if config.headers.is_empty() {
            self.http.clone()
        } else {
            let headers = header_map(&config.name, &expand_env_map(&config.headers))?;
            reqwest::Client::builder()
                .default_headers(headers)
                .build()
                .map_err(|e| McpError::Initialize {
                    server: config.name.clone(),
                    message: format!("failed to build HTTP client: {e}"),
                })?
        };

        let transport = StreamableHttpClientTransport::with_client(
            http,
            StreamableHttpClientTransportConfig::with_uri(url.to_string()),
        );

        let service = ().into_dyn().serve(transport).await.map_err(|e| {
            McpError::from_handshake(&config.name, e.to_string())
        })?;

        tracing::debug!(
            name: "mcp.session.sse.ready",
            server = %config.name,
            url = %url,
            "sse session established"
        );

        Ok(Arc::new(SseSession::new(config.name.clone(), service)))
    }
}

#[async_trait]
impl SessionConnector for RmcpConnector {
    async fn open(&self, config: &ServerConfig) -> Result<Arc<dyn ToolSession>, McpError> {
        match config.transport {
            TransportKind::Stdio => self.open_stdio(config).await,
            TransportKind::Sse => self.open_sse(config).await,
        }
    }
}

fn header_map(
    server: &str,
    headers: &std::collections::HashMap<String, String>,
) -> Result<HeaderMap, McpError> {
    let invalid = |reason: String| McpError::ConfigInvalid {
        server: server.to_string(),
        reason,
    };

    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| invalid(format!("invalid header name '{key}': {e}")))?;
        // Values may carry credentials; keep them out of the error text.
        let value = HeaderValue::from_str(value)
            .map_err(|e| invalid(format!("invalid value for header '{key}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}
