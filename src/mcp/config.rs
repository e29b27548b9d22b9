use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, collections::HashMap, fmt, fs, path::Path};

use super::error::McpError;

/// Transport used to reach a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Subprocess speaking the protocol over standard input/output.
    Stdio,
    /// Remote endpoint reached over HTTP.
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Sse => f.write_str("sse"),
        }
    }
}

/// Registry key for a cached session: `(transport, server name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionIdentity {
    pub transport: TransportKind,
    pub name: String,
}

impl SessionIdentity {
    pub fn new(transport: TransportKind, name: impl Into<String>) -> Self {
        Self {
            transport,
            name: name.into(),
        }
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.transport, self.name)
    }
}

/// Declarative description of one tool server, as submitted with a turn.
///
/// The wire shape matches what the browser sends:
///
/// ```json
/// { "name": "time", "type": "stdio", "command": "npx", "args": ["-y", "mcp-time"] }
/// { "name": "search", "type": "sse", "url": "https://example.com/mcp", "headers": { "Authorization": "Bearer ${TOKEN}" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Client-side identifier; not part of the session identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub transport: TransportKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Connection timeout in seconds. Can only tighten the factory bound.
    #[serde(
        default,
        alias = "timeoutSeconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<u64>,
}

impl ServerConfig {
    /// A stdio server launched with `command`.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::empty(name.into(), TransportKind::Stdio)
        }
    }

    /// A remote server reached at `url`.
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::empty(name.into(), TransportKind::Sse)
        }
    }

    fn empty(name: String, transport: TransportKind) -> Self {
        Self {
            id: None,
            name,
            transport,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity::new(self.transport, self.name.clone())
    }

    /// Check that the transport-specific fields required to connect are present.
    pub fn validate(&self) -> Result<(), McpError> {
        match self.transport {
            TransportKind::Stdio => {
                if is_blank(self.command.as_deref()) {
                    return Err(McpError::ConfigInvalid {
                        server: self.name.clone(),
                        reason: "missing command for stdio server".to_string(),
                    });
                }
            }
            TransportKind::Sse => {
                let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) else {
                    return Err(McpError::ConfigInvalid {
                        server: self.name.clone(),
                        reason: "missing URL for sse server".to_string(),
                    });
                };
                if let Err(e) = url::Url::parse(url) {
                    return Err(McpError::ConfigInvalid {
                        server: self.name.clone(),
                        reason: format!("invalid URL '{url}': {e}"),
                    });
                }
            }
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Contents of an `mcp.json` file, used as the default server list.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, McpServerEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum McpServerEntry {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        timeout: Option<u64>,
    },
    Remote {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        timeout: Option<u64>,
    },
}

impl McpConfig {
    /// Server configs ordered by name.
    pub fn servers(&self) -> Vec<ServerConfig> {
        self.mcp_servers
            .iter()
            .map(|(name, entry)| match entry {
                McpServerEntry::Stdio {
                    command,
                    args,
                    env,
                    timeout,
                } => ServerConfig {
                    args: args.clone(),
                    env: env.clone(),
                    timeout: *timeout,
                    ..ServerConfig::stdio(name.clone(), command.clone())
                },
                McpServerEntry::Remote {
                    url,
                    headers,
                    timeout,
                } => ServerConfig {
                    headers: headers.clone(),
                    timeout: *timeout,
                    ..ServerConfig::sse(name.clone(), url.clone())
                },
            })
            .collect()
    }
}

pub fn load_mcp_config(path: impl AsRef<Path>) -> anyhow::Result<McpConfig> {
    let txt = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&txt)?)
}

/// Expand `${VAR}` placeholders from the process environment.
///
/// Unknown variables and unterminated placeholders are left as written.
pub fn expand_env_placeholders(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match std::env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

pub fn expand_env_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), expand_env_placeholders(v)))
        .collect()
}
