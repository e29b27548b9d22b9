//! Bounded-time session establishment.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use super::config::ServerConfig;
use super::connector::SessionConnector;
use super::error::McpError;
use super::registry::{ConnectionRegistry, SessionHandle};
use super::session::ToolSession;

/// Upper bound on connect plus probe for any server.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates sessions and records every outcome in the registry.
///
/// Each attempt runs on its own task, so a caller that goes away (for
/// example a client disconnecting mid-turn) does not cancel it and the
/// registry is populated regardless.
#[derive(Clone)]
pub struct SessionFactory {
    connector: Arc<dyn SessionConnector>,
    registry: Arc<ConnectionRegistry>,
    timeout: Duration,
}

impl std::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("connector", &self.connector)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SessionFactory {
    pub fn new(connector: Arc<dyn SessionConnector>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            connector,
            registry,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Effective bound for `config`: a per-server timeout may only shorten it.
    /// Zero counts as unset.
    pub fn timeout_for(&self, config: &ServerConfig) -> Duration {
        config
            .timeout
            .filter(|&t| t > 0)
            .map(Duration::from_secs)
            .map_or(self.timeout, |t| t.min(self.timeout))
    }

    /// Get the cached handle for `config`'s identity or establish a new one.
    ///
    /// Never fails: every failure is captured in a `failed` handle.
    pub async fn connect(&self, config: &ServerConfig) -> Arc<SessionHandle> {
        let key = config.identity();
        let identity = key.clone();
        let factory = self.clone();
        let config = config.clone();

        self.registry
            .get_or_create(&key, move || {
                let registry = Arc::clone(&factory.registry);
                let task = tokio::spawn(async move { factory.establish(config).await });
                async move {
                    match task.await {
                        Ok(handle) => handle,
                        Err(e) => {
                            let handle = Arc::new(SessionHandle::failed(
                                identity.clone(),
                                McpError::Initialize {
                                    server: identity.name.clone(),
                                    message: format!("connection task aborted: {e}"),
                                },
                            ));
                            registry.insert(Arc::clone(&handle));
                            handle
                        }
                    }
                }
                .boxed()
            })
            .await
    }

    async fn establish(&self, config: ServerConfig) -> Arc<SessionHandle> {
        let identity = config.identity();

        tracing::info!(
            name: "mcp.session.connecting",
            server = %config.name,
            transport = %config.transport,
            "Connecting to tool server"
        );

        let handle = match self.try_establish(&config).await {
            Ok((session, tool_names)) => {
                tracing::info!(
                    name: "mcp.session.connected",
                    server = %config.name,
                    transport = %config.transport,
                    tool_count = tool_names.len(),
                    "Tool server connected"
                );
                SessionHandle::connected(identity, session, tool_names)
            }
            Err(e) => {
                tracing::error!(
                    name: "mcp.session.failed",
                    server = %config.name,
                    transport = %config.transport,
                    kind = e.kind(),
                    error = %e,
                    hint = %e.diagnostic(),
                    "Tool server connection failed"
                );
                SessionHandle::failed(identity, e)
            }
        };

        let handle = Arc::new(handle);
        self.registry.insert(Arc::clone(&handle));
        handle
    }

    async fn try_establish(
        &self,
        config: &ServerConfig,
    ) -> Result<(Arc<dyn ToolSession>, Vec<String>), McpError> {
        config.validate()?;

        let limit = self.timeout_for(config);
        let attempt = async {
            let session = self.connector.open(config).await?;
            // A transport can come up without a protocol endpoint behind it.
            let tools = session
                .list_tools()
                .await
                .map_err(|e| McpError::Initialize {
                    server: config.name.clone(),
                    message: format!("tool listing probe failed: {e}"),
                })?;
            let names = tools.into_iter().map(|t| t.name).collect();
            Ok((session, names))
        };

        tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_elapsed| McpError::ConnectionTimeout {
                server: config.name.clone(),
                timeout_secs: limit.as_secs(),
            })?
    }
}
