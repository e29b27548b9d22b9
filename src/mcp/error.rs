//! Failure taxonomy for tool-server sessions.
//!
//! These errors never abort a turn. They end up as text inside a
//! [`ServerStatusReport`](super::aggregator::ServerStatusReport) and in logs.

use std::io;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum McpError {
    /// Required transport fields are missing or malformed.
    #[error("Invalid configuration: {reason}")]
    ConfigInvalid { server: String, reason: String },

    #[error("Command not found: {command}")]
    ExecutableNotFound { server: String, command: String },

    #[error("Permission denied: {command}")]
    PermissionDenied { server: String, command: String },

    #[error("Failed to spawn process '{command}': {message}")]
    SpawnFailure {
        server: String,
        command: String,
        message: String,
    },

    /// Connection plus probe did not finish within the bound.
    #[error("Connection timeout after {timeout_secs}s")]
    ConnectionTimeout { server: String, timeout_secs: u64 },

    #[error("Connection refused: {message}")]
    ConnectionRefused { server: String, message: String },

    /// Transport came up but the protocol handshake or probe failed.
    #[error("Failed to initialize session: {message}")]
    Initialize { server: String, message: String },

    /// Tool listing failed on a session that had connected.
    #[error("Tool fetch failed: {message}")]
    ToolFetchFailed { server: String, message: String },

    #[error("Tool call '{tool}' failed: {message}")]
    ToolCall {
        server: String,
        tool: String,
        message: String,
    },

    #[error("unknown tool: {tool}")]
    UnknownTool { tool: String },
}

impl McpError {
    /// Classify a subprocess spawn error.
    pub fn from_spawn(server: &str, command: &str, err: &io::Error) -> Self {
        let server = server.to_string();
        let command = command.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Self::ExecutableNotFound { server, command },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { server, command },
            _ => Self::SpawnFailure {
                server,
                command,
                message: err.to_string(),
            },
        }
    }

    /// Classify a handshake failure; refused sockets get their own class.
    pub fn from_handshake(server: &str, message: String) -> Self {
        let server = server.to_string();
        if message.to_lowercase().contains("connection refused") {
            Self::ConnectionRefused { server, message }
        } else {
            Self::Initialize { server, message }
        }
    }

    pub fn tool_fetch(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFetchFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Server the error belongs to, when there is one.
    pub fn server(&self) -> Option<&str> {
        match self {
            Self::ConfigInvalid { server, .. }
            | Self::ExecutableNotFound { server, .. }
            | Self::PermissionDenied { server, .. }
            | Self::SpawnFailure { server, .. }
            | Self::ConnectionTimeout { server, .. }
            | Self::ConnectionRefused { server, .. }
            | Self::Initialize { server, .. }
            | Self::ToolFetchFailed { server, .. }
            | Self::ToolCall { server, .. } => Some(server),
            Self::UnknownTool { .. } => None,
        }
    }

    /// Short machine-friendly label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigInvalid { .. } => "config_invalid",
            Self::ExecutableNotFound { .. } => "executable_not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::SpawnFailure { .. } => "spawn_failure",
            Self::ConnectionTimeout { .. } => "connection_timeout",
            Self::ConnectionRefused { .. } => "connection_refused",
            Self::Initialize { .. } => "initialize",
            Self::ToolFetchFailed { .. } => "tool_fetch_failed",
            Self::ToolCall { .. } => "tool_call",
            Self::UnknownTool { .. } => "unknown_tool",
        }
    }

    /// Operator-facing troubleshooting hint.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::ConfigInvalid { .. } => {
                "Stdio servers need a command; sse servers need a URL.".to_string()
            }
            Self::ExecutableNotFound { command, .. } => {
                format!("Make sure '{command}' is installed and on PATH.")
            }
            Self::PermissionDenied { command, .. } => {
                format!("Check that '{command}' is executable by the gateway user.")
            }
            Self::SpawnFailure { .. } => "Check the command and its arguments.".to_string(),
            Self::ConnectionTimeout { .. } => {
                "The server may be slow to start or unreachable.".to_string()
            }
            Self::ConnectionRefused { .. } => {
                "Nothing is listening at the configured URL.".to_string()
            }
            Self::Initialize { .. } => {
                "The endpoint is reachable but did not complete the MCP handshake.".to_string()
            }
            Self::ToolFetchFailed { .. } => {
                "The session connected earlier but no longer answers tools/list.".to_string()
            }
            Self::ToolCall { .. } | Self::UnknownTool { .. } => {
                "The model called a tool that could not be executed.".to_string()
            }
        }
    }
}
