use axum::{Router, extract::DefaultBodyLimit};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::config::AppConfig;
use crate::llm::{LlmSettings, Orchestrator};
use crate::mcp::config::load_mcp_config;
use crate::mcp::{RmcpConnector, ServerConfig};
use crate::persistence::ContextStore;
use crate::persistence::providers::{MemoryStore, PostgresStore};

/// Servers file picked up from the working directory when none is configured.
const FALLBACK_SERVERS_FILE: &str = "mcp.json";

/// Build the router with all middleware applied.
pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    crate::api::router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Open the context store selected by `persistence.provider`.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ContextStore>> {
    match (
        config.persistence.provider.as_str(),
        config.persistence.database_url.as_deref(),
    ) {
        ("postgres", Some(url)) => {
            let store = PostgresStore::new(url).await?;
            info!(name: "store.ready", provider = "postgres", "Context store connected");
            Ok(Arc::new(store))
        }
        ("postgres", None) => anyhow::bail!("postgres store requires persistence.database_url"),
        (provider, _) => {
            info!(name: "store.ready", provider = %provider, "Using in-memory context store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Default MCP servers for turns that do not send their own list.
///
/// A configured file must load; the fallback `mcp.json` is optional.
pub fn load_default_servers(config: &AppConfig) -> anyhow::Result<Vec<ServerConfig>> {
    let path = match &config.mcp.servers_file {
        Some(path) => path.clone(),
        None if Path::new(FALLBACK_SERVERS_FILE).exists() => FALLBACK_SERVERS_FILE.into(),
        None => return Ok(Vec::new()),
    };

    let servers = load_mcp_config(&path)?.servers();
    for server in &servers {
        info!(
            name: "mcp.default_server",
            server = %server.name,
            transport = %server.transport,
            file = %path.display(),
            "Default MCP server configured"
        );
    }
    Ok(servers)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let settings = LlmSettings::from_config(&config.llm);
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.default_model,
        provider = ?settings.provider,
        server_key = settings.api_key.is_some(),
        "LLM configuration loaded"
    );

    let orchestrator = Arc::new(
        Orchestrator::new(settings).with_max_iterations(config.llm.max_tool_iterations),
    );
    let store = open_store(&config).await?;
    let default_servers = load_default_servers(&config)?;

    let state = AppState::new(
        Arc::clone(&config),
        orchestrator,
        store,
        Arc::new(RmcpConnector::new()),
        default_servers,
    );
    let app = build_app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        connect_timeout = ?Duration::from_secs(config.mcp.connect_timeout_secs),
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(name: "server.shutdown", "Shutdown signal received");
}
