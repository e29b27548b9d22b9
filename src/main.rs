//! Agentic chat gateway server.
//!
//! Entry point: loads `.env`, configuration and logging, then serves the API.

use std::sync::Arc;

use agentic_chat_gateway::{config::AppConfig, server, telemetry};
use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before anything reads the environment
    let _ = dotenvy::dotenv();

    telemetry::init();

    let config = AppConfig::load()?;
    tracing::debug!(config = ?config, "Configuration loaded");

    server::start_server(Arc::new(config)).await
}
