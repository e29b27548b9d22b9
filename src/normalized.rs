//! Normalized event types for streaming turn responses.
//!
//! This module defines the event model the chat endpoint streams to the
//! browser. Driver output, tool execution and MCP connection status all
//! flow through [`NormalizedEvent`].
//!
//! # Event Types
//!
//! - Stream lifecycle (start, done, error)
//! - MCP server status for the turn
//! - Message deltas for incremental text output
//! - Tool call lifecycle (delta, complete, result)
//!
//! # Example
//!
//! ```rust
//! use agentic_chat_gateway::normalized::{NormalizedEvent, sse_event};
//!
//! let event = NormalizedEvent::MessageDelta {
//!     text: "Hello".to_string(),
//! };
//! let sse = sse_event(&event);
//! assert!(sse.contains("message.delta"));
//! ```

use serde::{Deserialize, Serialize};

use crate::mcp::ServerStatusReport;

/// Normalized streaming events emitted while a turn runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum NormalizedEvent {
    // ─────────────────────────────────────────────────────────────────────
    // Stream Lifecycle
    // ─────────────────────────────────────────────────────────────────────
    /// Indicates the start of a new streaming response.
    #[serde(rename = "stream.start")]
    StreamStart {
        /// Unique identifier for this request/response pair.
        request_id: String,
    },

    /// Per-server connection outcome for the turn, in declaration order.
    #[serde(rename = "mcp.status")]
    McpStatus {
        servers: Vec<ServerStatusReport>,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Message Content
    // ─────────────────────────────────────────────────────────────────────
    /// Incremental text delta from the assistant's response.
    #[serde(rename = "message.delta")]
    MessageDelta {
        /// The text fragment to append.
        text: String,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Tool Calls
    // ─────────────────────────────────────────────────────────────────────
    /// Incremental tool call delta (streaming tool call assembly).
    #[serde(rename = "tool_call.delta")]
    ToolCallDelta {
        /// Index of this tool call in the current batch.
        call_index: usize,
        /// Tool call ID (may arrive in first delta or later).
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Tool/function name (may arrive in first delta or later).
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Incremental arguments JSON fragment.
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments_delta: Option<String>,
    },

    /// Tool call is fully assembled and ready for execution.
    #[serde(rename = "tool_call.complete")]
    ToolCallComplete {
        /// Index of this tool call in the current batch.
        call_index: usize,
        /// Tool call ID.
        id: String,
        /// Tool/function name.
        name: String,
        /// Complete arguments as JSON string.
        arguments_json: String,
    },

    /// Result from executing a tool.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// Tool call ID this result corresponds to.
        id: String,
        /// Tool/function name.
        name: String,
        /// Result content (typically JSON).
        content: String,
        /// Whether the tool execution succeeded.
        #[serde(default = "default_true")]
        success: bool,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Errors and Completion
    // ─────────────────────────────────────────────────────────────────────
    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error {
        /// Error message.
        message: String,
        /// Optional error code for programmatic handling.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Stream has completed successfully.
    #[serde(rename = "done")]
    Done,
}

fn default_true() -> bool {
    true
}

/// Convert a [`NormalizedEvent`] to an SSE-formatted string.
///
/// The output carries both an `event:` line (for `EventSource` listeners)
/// and a `data:` line containing the JSON payload.
///
/// # Example
///
/// ```rust
/// use agentic_chat_gateway::normalized::{NormalizedEvent, sse_event};
///
/// let event = NormalizedEvent::Done;
/// let sse = sse_event(&event);
/// assert!(sse.contains("event: done"));
/// ```
pub fn sse_event(evt: &NormalizedEvent) -> String {
    let json = serde_json::to_string(evt).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "data": { "message": e.to_string() } }).to_string()
    });

    let event_name = event_name(evt);

    format!("event: {event_name}\ndata: {json}\n\n")
}

/// Get the SSE event name for a [`NormalizedEvent`].
pub fn event_name(evt: &NormalizedEvent) -> &'static str {
    match evt {
        NormalizedEvent::StreamStart { .. } => "stream.start",
        NormalizedEvent::McpStatus { .. } => "mcp.status",
        NormalizedEvent::MessageDelta { .. } => "message.delta",
        NormalizedEvent::ToolCallDelta { .. } => "tool_call.delta",
        NormalizedEvent::ToolCallComplete { .. } => "tool_call.complete",
        NormalizedEvent::ToolResult { .. } => "tool_result",
        NormalizedEvent::Error { .. } => "error",
        NormalizedEvent::Done => "done",
    }
}
