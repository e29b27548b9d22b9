//! System instruction block for a turn.
//!
//! The block always spells out which servers are unavailable and why, so a
//! degraded turn is visible to the model instead of silently missing tools.

use std::fmt::Write;

use crate::context::ContextBundle;
use crate::mcp::{ServerStatusReport, ToolCatalog};

const PREAMBLE: &str = "You are an agentic assistant with access to MCP (Model Context Protocol) tools and shared context across conversations.";

const GUIDELINES: &str = "**Instructions:**
1. Use the contextual information to provide coherent, informed responses
2. When you use tools, ALWAYS explain what you're doing before and after using them
3. Format your responses using proper markdown for better readability
4. Use headers, lists, code blocks, and tables to structure your responses
5. When presenting results from tools, organize them clearly with appropriate formatting
6. If you perform multiple operations, create a summary report at the end
7. Reference previous conversations and documents when relevant

**Tool Usage Guidelines:**
- Announce when you're about to use a tool: \"I'll now use the [tool_name] tool to...\"
- Explain the results: \"The tool returned the following information...\"
- Provide context and interpretation of the results";

const NO_TOOLS_WARNING: &str = "⚠️ **No MCP tools are currently available.** This means the MCP server connections failed.
Please check the troubleshooting tips and ensure your MCP servers are properly configured and running.";

const TOOLS_READY: &str =
    "🎉 **MCP tools are available!** You can now use the connected tools for various tasks.";

const IMAGE_NOTE: &str = "If images are provided, analyze them thoroughly and incorporate the analysis into your response using proper markdown formatting.";

/// Everything the instruction block is composed from.
#[derive(Debug, Clone, Copy)]
pub struct InstructionInputs<'a> {
    pub context: Option<&'a ContextBundle>,
    pub statuses: &'a [ServerStatusReport],
    pub catalog: &'a ToolCatalog,
    pub preferred_server: Option<&'a str>,
    /// How many recent entries to quote.
    pub recent_turns: usize,
    /// Characters kept from each quoted entry or document.
    pub excerpt_chars: usize,
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

pub fn compose_instructions(inputs: &InstructionInputs<'_>) -> String {
    let mut out = String::with_capacity(2048);
    out.push_str(PREAMBLE);
    out.push_str("\n\n**🧠 Contextual Awareness:**\n");

    match inputs.context {
        Some(ctx) => {
            let _ = writeln!(out, "- Recent conversations: {} messages", ctx.recent_conversations.len());
            let _ = writeln!(out, "- Available documents: {} documents", ctx.relevant_documents.len());
            let _ = writeln!(out, "- Session ID: {}", ctx.session_id);

            out.push_str("\n**Recent Context:**\n");
            for entry in ctx.recent_conversations.iter().take(inputs.recent_turns) {
                let _ = writeln!(out, "{}: {}", entry.role, excerpt(&entry.content, inputs.excerpt_chars));
            }

            out.push_str("\n**Relevant Documents:**\n");
            for doc in &ctx.relevant_documents {
                let _ = writeln!(out, "- {}: {}", doc.title, excerpt(&doc.content, inputs.excerpt_chars));
            }
        }
        None => out.push_str("No contextual information available for this session.\n"),
    }

    out.push_str("\n**🔧 MCP Connection Status:**\n");
    for status in inputs.statuses {
        if status.is_connected() {
            let names = if status.tools.is_empty() {
                "none".to_string()
            } else {
                status.tools.join(", ")
            };
            let _ = writeln!(
                out,
                "✅ **{}**: Connected ({} tools: {})",
                status.name,
                status.tools.len(),
                names
            );
        } else {
            let _ = writeln!(
                out,
                "❌ **{}**: Failed - {}",
                status.name,
                status.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let _ = writeln!(out, "\n**📦 Available Tools ({} total):**", inputs.catalog.len());
    if inputs.catalog.is_empty() {
        out.push_str("❌ No tools available - all server connections failed\n");
    } else {
        for tool in inputs.catalog.iter() {
            let _ = writeln!(
                out,
                "- **{}**: {}",
                tool.name,
                tool.description.as_deref().filter(|d| !d.is_empty()).unwrap_or("No description")
            );
        }
    }

    if let Some(server) = inputs.preferred_server.filter(|s| !s.is_empty()) {
        let _ = writeln!(
            out,
            "\n**🎯 User Selected Server:** {server} - Focus on using tools from this server when possible."
        );
    }

    out.push('\n');
    out.push_str(GUIDELINES);
    out.push_str("\n\n");
    out.push_str(if inputs.catalog.is_empty() {
        NO_TOOLS_WARNING
    } else {
        TOOLS_READY
    });
    out.push_str("\n\n");
    out.push_str(IMAGE_NOTE);

    out
}
