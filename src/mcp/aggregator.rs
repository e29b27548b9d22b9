//! Per-turn tool aggregation.
//!
//! Servers are resolved strictly in the order given so that the
//! last-writer-wins merge in [`ToolCatalog`] is deterministic. One server's
//! failure never stops the remaining servers from being processed.

use serde::{Deserialize, Serialize};

use super::catalog::{ToolCatalog, ToolCatalogEntry};
use super::config::{ServerConfig, TransportKind};
use super::error::McpError;
use super::factory::SessionFactory;
use super::registry::ConnectionStatus;

/// Fallback reason when a failed handle carries no error.
pub const UNKNOWN_FAILURE: &str = "Failed to create client";

/// Status of one server for one turn. Rebuilt every turn, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusReport {
    pub name: String,
    pub transport: TransportKind,
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl ServerStatusReport {
    fn connected(config: &ServerConfig, tools: Vec<String>) -> Self {
        Self {
            name: config.name.clone(),
            transport: config.transport,
            status: ConnectionStatus::Connected,
            error: None,
            tools,
        }
    }

    fn failed(config: &ServerConfig, error: String) -> Self {
        Self {
            name: config.name.clone(),
            transport: config.transport,
            status: ConnectionStatus::Failed,
            error: Some(error),
            tools: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Result of [`ToolAggregator::aggregate`].
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub catalog: ToolCatalog,
    /// One report per input config, in input order.
    pub statuses: Vec<ServerStatusReport>,
}

#[derive(Debug, Clone)]
pub struct ToolAggregator {
    factory: SessionFactory,
}

impl ToolAggregator {
    pub fn new(factory: SessionFactory) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }

    pub async fn aggregate(&self, configs: &[ServerConfig]) -> Aggregation {
        let mut aggregation = Aggregation {
            catalog: ToolCatalog::new(),
            statuses: Vec::with_capacity(configs.len()),
        };

        for config in configs {
            let report = self.resolve(config, &mut aggregation.catalog).await;
            aggregation.statuses.push(report);
        }

        tracing::info!(
            name: "mcp.aggregate.done",
            servers = configs.len(),
            connected = aggregation.statuses.iter().filter(|s| s.is_connected()).count(),
            tools = aggregation.catalog.len(),
            "Tool aggregation finished"
        );

        aggregation
    }

    /// Resolve a single server and merge its tools into `catalog`.
    pub async fn resolve(&self, config: &ServerConfig, catalog: &mut ToolCatalog) -> ServerStatusReport {
        let handle = self.factory.connect(config).await;

        let session = match (handle.status(), handle.session()) {
            (ConnectionStatus::Connected, Some(session)) => session,
            _ => {
                let reason = handle
                    .last_error()
                    .unwrap_or_else(|| UNKNOWN_FAILURE.to_string());
                return ServerStatusReport::failed(config, reason);
            }
        };

        // Sessions can go stale after creation, so the listing is repeated every turn.
        match session.list_tools().await {
            Ok(tools) => {
                let names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
                for tool in tools {
                    let entry = ToolCatalogEntry::new(tool, std::sync::Arc::clone(session));
                    if let Some(shadowed) = catalog.insert(entry) {
                        tracing::warn!(
                            name: "mcp.tool.shadowed",
                            tool = %shadowed.name,
                            previous = %shadowed.server,
                            server = %config.name,
                            "Tool name collision; later server wins"
                        );
                    }
                }
                ServerStatusReport::connected(config, names)
            }
            Err(e) => {
                let e = match e {
                    McpError::ToolFetchFailed { .. } => e,
                    other => McpError::tool_fetch(&config.name, other.to_string()),
                };
                tracing::warn!(
                    name: "mcp.tool.fetch_failed",
                    server = %config.name,
                    error = %e,
                    "Tool listing failed on connected session"
                );
                ServerStatusReport::failed(config, e.to_string())
            }
        }
    }
}
