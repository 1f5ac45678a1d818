//! Bridge configuration, read entirely from the environment.
//!
//! The agent side writes three variables into the launch config it hands to
//! the MCP host: the API base URL, the bearer token, and the JSON tool
//! manifest. The bridge holds no other state.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment variable with the API base URL.
pub const API_URL_ENV_VAR: &str = "MCP_API_URL";

/// Environment variable with the bearer token.
pub const API_TOKEN_ENV_VAR: &str = "MCP_API_TOKEN";

/// Environment variable with the JSON tool manifest.
pub const TOOLS_ENV_VAR: &str = "MCP_TOOLS";

/// Provider kind of a manifest entry; selects the per-tool endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// `/tools/mcp/{server}/{tool}`.
    Mcp,
    /// `/tools/custom/{tool}`.
    Custom,
    /// `/tools/virtual/{tool}`.
    Virtual,
}

/// One tool the bridge exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeTool {
    /// Tool name as announced over `tools/list`.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the arguments, forwarded verbatim.
    #[serde(default)]
    pub input_schema: Value,
    /// Owning server; required when `kind` is [`ToolKind::Mcp`].
    #[serde(default)]
    pub server: Option<String>,
    /// Provider kind.
    #[serde(rename = "type")]
    pub kind: ToolKind,
}

/// Fully parsed bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the execution surface.
    pub api_url: String,
    /// Bearer token for every forwarded call.
    pub token: String,
    /// Tools to expose.
    pub tools: Vec<BridgeTool>,
}

impl BridgeConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, BridgeError> {
        let api_url = require_env(API_URL_ENV_VAR)?;
        let token = require_env(API_TOKEN_ENV_VAR)?;
        let tools_json = require_env(TOOLS_ENV_VAR)?;
        Self::from_parts(api_url, token, &tools_json)
    }

    /// Builds a configuration from raw parts; `tools_json` is the manifest
    /// array as it appears in the environment.
    pub fn from_parts(
        api_url: String,
        token: String,
        tools_json: &str,
    ) -> Result<Self, BridgeError> {
        let tools: Vec<BridgeTool> = serde_json::from_str(tools_json)
            .map_err(|e| BridgeError::InvalidManifest(format!("unparseable manifest: {e}")))?;
        for tool in &tools {
            if tool.kind == ToolKind::Mcp && tool.server.as_deref().unwrap_or("").is_empty() {
                return Err(BridgeError::InvalidManifest(format!(
                    "mcp tool {} is missing its server",
                    tool.name
                )));
            }
        }
        Ok(Self {
            api_url,
            token,
            tools,
        })
    }
}

fn require_env(var: &'static str) -> Result<String, BridgeError> {
    std::env::var(var).map_err(|_| BridgeError::MissingEnv { var })
}
