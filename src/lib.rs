//! Agentic chat gateway
//!
//! Backend for a browser chat UI that talks to a hosted model router and to
//! external Model Context Protocol (MCP) tool servers.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with SSE streaming
//! - **MCP**: per-identity session cache, bounded connection with a
//!   tool-listing probe, per-turn tool aggregation
//! - **Context**: conversation history and document retrieval over a
//!   pluggable store
//! - **Turns**: instruction assembly and the model tool loop
//!
//! # Modules
//!
//! - [`mcp`]: MCP sessions, registry and tool aggregation
//! - [`context`]: retrieval of history and documents
//! - [`persistence`]: the context store boundary and its providers
//! - [`turn`]: per-turn assembly
//! - [`llm`]: model drivers and the tool-loop orchestrator
//! - [`normalized`]: unified streaming event model

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::assigning_clones)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod context;
pub mod llm;
pub mod mcp;
pub mod normalized;
pub mod persistence;
pub mod server;
pub mod telemetry;
pub mod turn;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use context::ContextRetriever;
use llm::Orchestrator;
use mcp::{ConnectionRegistry, ServerConfig, SessionConnector, SessionFactory, ToolAggregator};
use persistence::ContextStore;
use turn::{TurnAssembler, TurnSettings};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Global Configuration
    pub config: Arc<AppConfig>,
    /// LLM orchestrator for turns and prompt enhancement.
    pub orchestrator: Arc<Orchestrator>,
    /// Tool aggregation over the process-wide connection registry.
    pub aggregator: ToolAggregator,
    /// History and document retrieval.
    pub retriever: ContextRetriever,
    /// Turn assembly.
    pub turns: TurnAssembler,
}

impl AppState {
    /// Wire the application graph. The registry is created here and lives
    /// as long as the state.
    pub fn new(
        config: Arc<AppConfig>,
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn ContextStore>,
        connector: Arc<dyn SessionConnector>,
        default_servers: Vec<ServerConfig>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let factory = SessionFactory::new(connector, registry)
            .with_timeout(Duration::from_secs(config.mcp.connect_timeout_secs));
        let aggregator = ToolAggregator::new(factory);

        let retriever = ContextRetriever::new(store)
            .with_limits(config.context.history_limit, config.context.document_limit);

        let turns = TurnAssembler::new(retriever.clone(), aggregator.clone(), Arc::clone(&orchestrator))
            .with_default_servers(default_servers)
            .with_settings(TurnSettings {
                agent_id: config.context.agent_id.clone(),
                recent_turns_in_prompt: config.context.recent_turns_in_prompt,
                excerpt_chars: config.context.excerpt_chars,
            });

        Self {
            config,
            orchestrator,
            aggregator,
            retriever,
            turns,
        }
    }
}
