use axum::{Json, extract::State};
use serde::Serialize;

use crate::AppState;
use crate::mcp::registry::RegistryEntry;
use crate::mcp::{ServerConfig, ServerStatusReport};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerListing {
    /// Every identity the registry has seen since startup.
    pub sessions: Vec<RegistryEntry>,
    /// Servers used when a turn omits `mcpServers`.
    pub defaults: Vec<String>,
}

/// GET /api/mcp/servers
pub async fn api_list_servers(State(state): State<AppState>) -> Json<ServerListing> {
    Json(ServerListing {
        sessions: state.aggregator.factory().registry().snapshot(),
        defaults: state
            .turns
            .default_servers()
            .iter()
            .map(|s| s.name.clone())
            .collect(),
    })
}

/// POST /api/mcp/probe - Resolve one server exactly as a turn would.
pub async fn api_probe_server(
    State(state): State<AppState>,
    Json(config): Json<ServerConfig>,
) -> Json<ServerStatusReport> {
    tracing::info!(
        name: "mcp.probe",
        server = %config.name,
        transport = %config.transport,
        "Probing MCP server"
    );

    let mut aggregation = state.aggregator.aggregate(std::slice::from_ref(&config)).await;
    let report = aggregation.statuses.pop().unwrap_or_else(|| ServerStatusReport {
        name: config.name.clone(),
        transport: config.transport,
        status: crate::mcp::ConnectionStatus::Failed,
        error: Some(crate::mcp::aggregator::UNKNOWN_FAILURE.to_string()),
        tools: Vec::new(),
    });

    Json(report)
}
