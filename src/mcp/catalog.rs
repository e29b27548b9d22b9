//! Flat per-turn tool namespace.
//!
//! Tools from every connected server share one namespace keyed by tool name.
//! On a name collision the later server wins and the earlier entry is
//! replaced in place, keeping its original position.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::McpError;
use super::session::{ToolDescriptor, ToolSession};

#[derive(Debug, Clone)]
pub struct ToolCatalogEntry {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
    /// Server that provided this entry.
    pub server: String,
    session: Arc<dyn ToolSession>,
}

impl ToolCatalogEntry {
    pub fn new(descriptor: ToolDescriptor, session: Arc<dyn ToolSession>) -> Self {
        Self {
            name: descriptor.name,
            description: descriptor.description,
            input_schema: descriptor.input_schema,
            server: session.server_name().to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<dyn ToolSession> {
        &self.session
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<ToolCatalogEntry>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, returning the one it shadowed.
    pub fn insert(&mut self, entry: ToolCatalogEntry) -> Option<ToolCatalogEntry> {
        if let Some(&pos) = self.index.get(&entry.name) {
            return Some(std::mem::replace(&mut self.entries[pos], entry));
        }
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
        None
    }

    pub fn get(&self, name: &str) -> Option<&ToolCatalogEntry> {
        self.index.get(name).map(|&pos| &self.entries[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolCatalogEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Tools in `OpenAI` function-calling format.
    pub fn openai_tools_json(&self) -> Vec<serde_json::Value> {
        self.entries
            .iter()
            .map(|t| {
                let params = if t.input_schema.is_object() {
                    t.input_schema.clone()
                } else {
                    serde_json::json!({"type":"object","properties":{}})
                };

                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description.as_deref().unwrap_or(""),
                        "parameters": params
                    }
                })
            })
            .collect()
    }

    /// Invoke `name` on the session that owns it.
    pub async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let entry = self.get(name).ok_or_else(|| McpError::UnknownTool {
            tool: name.to_string(),
        })?;
        entry.session.call_tool(name, arguments).await
    }
}
