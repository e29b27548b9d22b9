use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Context store provider: memory or postgres
    #[arg(long, env = "CONTEXT_STORE")]
    pub store: Option<String>,

    /// PostgreSQL connection string for the context store
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Default MCP servers file (`{"mcpServers": {...}}`)
    #[arg(long, env = "MCP_CONFIG")]
    pub mcp_config: Option<PathBuf>,

    /// Server-side model router key
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub mcp: McpSettings,
    pub context: ContextConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub body_limit_bytes: usize,
}

/// A model offered to the UI.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub default_model: String,
    pub enhance_model: String,
    #[serde(default = "default_models")]
    pub models: Vec<ModelInfo>,
    pub max_tool_iterations: usize,
    #[serde(default)]
    pub parallel_tool_calls: Option<bool>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("default_model", &self.default_model)
            .field("enhance_model", &self.enhance_model)
            .field("models", &self.models)
            .field("max_tool_iterations", &self.max_tool_iterations)
            .field("parallel_tool_calls", &self.parallel_tool_calls)
            .finish()
    }
}

fn default_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo {
            id: "google/gemini-2.5-pro-preview".to_string(),
            name: "Gemini 2.5 Pro Preview".to_string(),
        },
        ModelInfo {
            id: "anthropic/claude-sonnet-4".to_string(),
            name: "Claude Sonnet 4".to_string(),
        },
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct McpSettings {
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub servers_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    pub history_limit: usize,
    pub document_limit: usize,
    /// Recent entries quoted in the instruction block.
    pub recent_turns_in_prompt: usize,
    pub excerpt_chars: usize,
    /// Agent id under which turn messages are stored.
    pub agent_id: String,
}

#[derive(Deserialize, Clone)]
pub struct PersistenceConfig {
    pub provider: String,
    #[serde(default)]
    pub database_url: Option<String>,
}

impl std::fmt::Debug for PersistenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceConfig")
            .field("provider", &self.provider)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.body_limit_bytes", 10 * 1024 * 1024)?
            .set_default("llm.base_url", "https://openrouter.ai/api")?
            .set_default("llm.default_model", "google/gemini-2.5-pro-preview")?
            .set_default("llm.enhance_model", "openai/gpt-4.1-nano")?
            .set_default("llm.max_tool_iterations", 10)?
            .set_default("mcp.connect_timeout_secs", 30)?
            .set_default("context.history_limit", 20)?
            .set_default("context.document_limit", 5)?
            .set_default("context.recent_turns_in_prompt", 5)?
            .set_default("context.excerpt_chars", 100)?
            .set_default("context.agent_id", "main")?
            .set_default("persistence.provider", "memory")?;

        // 2. Config file: explicit path must exist, ./config.* is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables, e.g. GATEWAY_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their clap-level env vars) win
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(store) = cli.store {
            builder = builder.set_override("persistence.provider", store)?;
        }
        if let Some(url) = cli.database_url {
            builder = builder.set_override("persistence.database_url", url)?;
        }
        if let Some(path) = cli.mcp_config {
            builder = builder.set_override("mcp.servers_file", path.to_string_lossy().into_owned())?;
        }
        if let Some(key) = cli.api_key {
            builder = builder.set_override("llm.api_key", key)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        match self.persistence.provider.as_str() {
            "memory" => Ok(()),
            "postgres" if self.persistence.database_url.is_some() => Ok(()),
            "postgres" => Err(config::ConfigError::Message(
                "persistence.provider = postgres requires persistence.database_url".to_string(),
            )),
            other => Err(config::ConfigError::Message(format!(
                "unknown persistence provider '{other}' (expected memory or postgres)"
            ))),
        }
    }
}
