//! Launch configuration for the stdio bridge.
//!
//! The bridge is a separate executable that external MCP hosts spawn; its
//! entire configuration travels through environment variables. This module
//! resolves the bridge binary, selects the fixed set of tools to expose,
//! and emits the `mcpServers` JSON snippet a host pastes into its config.
//!
//! The exposed set stays deliberately small: a shell tool, a browser tool,
//! and `get_api_spec`. Hosts discover the full surface by calling
//! `get_api_spec` and then drive the per-tool HTTP endpoints through the
//! shell tool.

use crate::error::FabricError;
use crate::naming::normalize_tool;
use crate::registration::{ProviderKind, ToolEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use which::which;

/// Environment variable that overrides the bridge executable path.
pub const BRIDGE_BINARY_ENV_VAR: &str = "MCP_BRIDGE_BINARY";

/// Environment variable with a host-reachable API URL override, for agents
/// running inside a container whose `localhost` the bridge cannot see.
pub const BRIDGE_API_URL_ENV_VAR: &str = "MCP_BRIDGE_API_URL";

/// Environment variable the bridge reads the API base URL from.
pub const API_URL_ENV_VAR: &str = "MCP_API_URL";

/// Environment variable the bridge reads the bearer token from.
pub const API_TOKEN_ENV_VAR: &str = "MCP_API_TOKEN";

/// Environment variable carrying the JSON tool manifest.
pub const TOOLS_ENV_VAR: &str = "MCP_TOOLS";

/// File name of the bridge executable.
pub const BRIDGE_BINARY_NAME: &str = "mcp-fabric-bridge";

/// Server name under which the bridge appears to MCP hosts.
pub const BRIDGE_SERVER_NAME: &str = "api-bridge";

/// Provider kind tag in the bridge manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeToolKind {
    /// Forwarded to `/tools/mcp/{server}/{tool}`.
    Mcp,
    /// Forwarded to `/tools/custom/{tool}`.
    Custom,
    /// Forwarded to `/tools/virtual/{tool}`.
    Virtual,
}

/// One entry of the `MCP_TOOLS` manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeToolEntry {
    /// Tool name as exposed through the bridge.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the arguments.
    pub input_schema: Value,
    /// Owning server; present only for MCP tools.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub server: Option<String>,
    /// Provider kind.
    #[serde(rename = "type")]
    pub kind: BridgeToolKind,
}

/// Launch configuration for the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeLaunchConfig {
    /// Absolute path to the bridge executable.
    pub command: String,
    /// Arguments (always empty today; the bridge is env-configured).
    pub args: Vec<String>,
    /// Environment for the bridge process.
    pub env: HashMap<String, String>,
}

impl BridgeLaunchConfig {
    /// Renders the `mcpServers` JSON snippet MCP hosts consume.
    #[must_use]
    pub fn to_mcp_servers_json(&self) -> Value {
        serde_json::json!({
            "mcpServers": {
                BRIDGE_SERVER_NAME: {
                    "command": &self.command,
                    "args": &self.args,
                    "env": &self.env
                }
            }
        })
    }
}

/// Locates the bridge executable.
///
/// Resolution order:
/// 1. `explicit_path` if provided and the file exists.
/// 2. The path in the `MCP_BRIDGE_BINARY` environment variable.
/// 3. `mcp-fabric-bridge` resolved via `$PATH`.
/// 4. Conventional install locations (`~/.local/bin`, `/usr/local/bin`).
///
/// # Errors
///
/// Returns `FabricError::BridgeBinaryNotFound` when no candidate exists.
pub fn resolve_bridge_binary(explicit_path: Option<PathBuf>) -> Result<PathBuf, FabricError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(path);
        }
        return Err(FabricError::BridgeBinaryNotFound(format!(
            "explicit path does not exist: {}",
            path.display()
        )));
    }

    if let Ok(path_str) = std::env::var(BRIDGE_BINARY_ENV_VAR) {
        let path = PathBuf::from(path_str);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Ok(path) = which(BRIDGE_BINARY_NAME) {
        return Ok(path);
    }

    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local/bin").join(BRIDGE_BINARY_NAME));
    }
    candidates.push(PathBuf::from("/usr/local/bin").join(BRIDGE_BINARY_NAME));
    for candidate in candidates {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(FabricError::BridgeBinaryNotFound(format!(
        "{BRIDGE_BINARY_NAME} not on PATH and no install location matched"
    )))
}

/// Builder for the bridge launch configuration.
pub struct BridgeManifestBuilder {
    api_url: String,
    token: String,
    entries: Vec<ToolEntry>,
    expose: Vec<(String, BridgeToolKind)>,
    binary: Option<PathBuf>,
}

impl BridgeManifestBuilder {
    /// Starts a builder with the default exposed set: `execute_command`,
    /// `browser_action`, and `get_api_spec`.
    #[must_use]
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token: token.into(),
            entries: Vec::new(),
            expose: vec![
                ("execute_command".to_string(), BridgeToolKind::Custom),
                ("browser_action".to_string(), BridgeToolKind::Custom),
                ("get_api_spec".to_string(), BridgeToolKind::Virtual),
            ],
            binary: None,
        }
    }

    /// Supplies the agent's local tool tables to look entries up in.
    #[must_use]
    pub fn tools(mut self, entries: Vec<ToolEntry>) -> Self {
        self.entries = entries;
        self
    }

    /// Replaces the default exposed set.
    #[must_use]
    pub fn expose(mut self, desired: Vec<(String, BridgeToolKind)>) -> Self {
        self.expose = desired;
        self
    }

    /// Uses an explicit bridge executable instead of discovery.
    #[must_use]
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Builds the launch configuration.
    ///
    /// Desired tools missing from the local tables are skipped with a
    /// warning; a missing bridge binary is fatal.
    pub fn build(self) -> Result<BridgeLaunchConfig, FabricError> {
        let command = resolve_bridge_binary(self.binary)?;

        let mut manifest = Vec::new();
        for (name, kind) in &self.expose {
            let wanted = normalize_tool(name);
            let found = self.entries.iter().find(|entry| {
                normalize_tool(&entry.name) == wanted && kind_matches(&entry.kind, *kind)
            });
            match found {
                Some(entry) => manifest.push(BridgeToolEntry {
                    name: entry.name.clone(),
                    description: entry.description.clone(),
                    input_schema: entry.parameters.clone(),
                    server: match &entry.kind {
                        ProviderKind::Mcp { server } => Some(server.clone()),
                        ProviderKind::Custom { .. } | ProviderKind::Virtual => None,
                    },
                    kind: *kind,
                }),
                None => {
                    tracing::warn!(
                        event = "bridge_tool_missing",
                        tool = %name,
                        "desired bridge tool not registered, skipping"
                    );
                }
            }
        }

        let api_url = std::env::var(BRIDGE_API_URL_ENV_VAR).unwrap_or(self.api_url);
        let tools_json = serde_json::to_string(&manifest)
            .map_err(|e| FabricError::Handler(format!("failed to serialize tool manifest: {e}")))?;

        let mut env = HashMap::new();
        env.insert(API_URL_ENV_VAR.to_string(), api_url);
        env.insert(API_TOKEN_ENV_VAR.to_string(), self.token);
        env.insert(TOOLS_ENV_VAR.to_string(), tools_json);

        Ok(BridgeLaunchConfig {
            command: command.to_string_lossy().to_string(),
            args: vec![],
            env,
        })
    }
}

const fn kind_matches(kind: &ProviderKind, wanted: BridgeToolKind) -> bool {
    matches!(
        (kind, wanted),
        (ProviderKind::Mcp { .. }, BridgeToolKind::Mcp)
            | (ProviderKind::Custom { .. }, BridgeToolKind::Custom)
            | (ProviderKind::Virtual, BridgeToolKind::Virtual)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write as _;

    fn entries() -> Vec<ToolEntry> {
        vec![
            ToolEntry {
                name: "execute_command".to_string(),
                package: "workspace".to_string(),
                kind: ProviderKind::Custom {
                    category: "workspace".to_string(),
                },
                description: "run a shell command".to_string(),
                parameters: json!({"type": "object", "properties": {"command": {"type": "string"}}}),
            },
            ToolEntry {
                name: "get_api_spec".to_string(),
                package: "virtual_tools".to_string(),
                kind: ProviderKind::Virtual,
                description: "introspect the API".to_string(),
                parameters: json!({"type": "object"}),
            },
            ToolEntry {
                name: "GetSheetData".to_string(),
                package: "google_sheets".to_string(),
                kind: ProviderKind::Mcp {
                    server: "google_sheets".to_string(),
                },
                description: "read a sheet".to_string(),
                parameters: json!({"type": "object"}),
            },
        ]
    }

    fn fake_binary() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"#!/bin/sh\n").unwrap();
        f
    }

    #[test]
    fn manifest_contains_the_exposed_subset() {
        let binary = fake_binary();
        let config = BridgeManifestBuilder::new("http://127.0.0.1:8931", "tok-123")
            .tools(entries())
            .binary(binary.path())
            .build()
            .unwrap();

        assert_eq!(config.args, Vec::<String>::new());
        assert_eq!(config.env.get(API_URL_ENV_VAR).unwrap(), "http://127.0.0.1:8931");
        assert_eq!(config.env.get(API_TOKEN_ENV_VAR).unwrap(), "tok-123");

        let tools: Vec<BridgeToolEntry> =
            serde_json::from_str(config.env.get(TOOLS_ENV_VAR).unwrap()).unwrap();
        // browser_action is not registered, so only two of the default
        // three survive.
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "execute_command");
        assert_eq!(tools[0].kind, BridgeToolKind::Custom);
        assert!(tools[0].server.is_none());
        assert_eq!(tools[1].name, "get_api_spec");
        assert_eq!(tools[1].kind, BridgeToolKind::Virtual);
    }

    #[test]
    fn mcp_entries_carry_their_server() {
        let binary = fake_binary();
        let config = BridgeManifestBuilder::new("http://127.0.0.1:8931", "tok")
            .tools(entries())
            .expose(vec![("get_sheet_data".to_string(), BridgeToolKind::Mcp)])
            .binary(binary.path())
            .build()
            .unwrap();

        let tools: Vec<BridgeToolEntry> =
            serde_json::from_str(config.env.get(TOOLS_ENV_VAR).unwrap()).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "GetSheetData");
        assert_eq!(tools[0].server.as_deref(), Some("google_sheets"));

        let rendered = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(rendered["type"], "mcp");
    }

    #[test]
    fn launch_snippet_has_the_mcp_servers_shape() {
        let binary = fake_binary();
        let config = BridgeManifestBuilder::new("http://127.0.0.1:8931", "tok")
            .tools(entries())
            .binary(binary.path())
            .build()
            .unwrap();

        let json = config.to_mcp_servers_json();
        let entry = &json["mcpServers"][BRIDGE_SERVER_NAME];
        assert_eq!(entry["command"], config.command);
        assert_eq!(entry["env"][API_TOKEN_ENV_VAR], "tok");
        assert!(entry["env"][TOOLS_ENV_VAR].is_string());
    }

    #[test]
    fn missing_binary_is_fatal() {
        let err = BridgeManifestBuilder::new("http://x", "t")
            .tools(entries())
            .binary("/definitely/not/here/bridge")
            .build()
            .unwrap_err();
        assert!(matches!(err, FabricError::BridgeBinaryNotFound(_)));
    }
}
