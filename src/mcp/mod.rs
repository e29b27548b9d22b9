//! Model Context Protocol (MCP) session management and tool aggregation.
//!
//! Tool servers are declared per turn as [`ServerConfig`]s. Each one is
//! resolved through the [`ConnectionRegistry`]: the first reference to an
//! identity `(transport, name)` establishes a session via the
//! [`SessionFactory`], every later reference reuses the cached handle,
//! including failed ones.
//!
//! # Configuration
//!
//! A default server list can be loaded from an `mcp.json` file:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "time": {
//!       "command": "npx",
//!       "args": ["-y", "@mcpcentral/mcp-time"]
//!     },
//!     "search": {
//!       "url": "https://mcp.example.com/mcp",
//!       "headers": { "Authorization": "Bearer ${SEARCH_API_KEY}" }
//!     }
//!   }
//! }
//! ```
//!
//! # Tool namespace
//!
//! Tools are not namespaced by server. When two servers expose the same
//! name, the server listed later wins.

pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod connector;
pub mod error;
pub mod factory;
pub mod registry;
pub mod session;

pub use aggregator::{Aggregation, ServerStatusReport, ToolAggregator};
pub use catalog::{ToolCatalog, ToolCatalogEntry};
pub use config::{ServerConfig, SessionIdentity, TransportKind};
pub use connector::{RmcpConnector, SessionConnector};
pub use error::McpError;
pub use factory::{DEFAULT_CONNECT_TIMEOUT, SessionFactory};
pub use registry::{ConnectionRegistry, ConnectionStatus, SessionHandle};
pub use session::{ToolDescriptor, ToolSession};
