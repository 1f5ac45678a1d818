//! Forwards tool calls to the execution surface over authenticated HTTP.

use crate::error::BridgeError;
use crate::manifest::{BridgeTool, ToolKind};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Client timeout, slightly above the surface's own 2-minute execution
/// deadline so the surface's envelope wins the race.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(130);

/// The surface's uniform response envelope.
#[derive(Debug, Deserialize)]
struct ExecuteEnvelope {
    success: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Authenticated HTTP relay to the execution surface.
pub struct ApiRelay {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiRelay {
    /// Creates a relay for the given base URL and bearer token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    /// Invokes a manifest tool with the given arguments, returning the
    /// string result from the surface's envelope.
    pub async fn call(&self, tool: &BridgeTool, args: Value) -> Result<String, BridgeError> {
        let url = format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            endpoint_path(tool)
        );
        tracing::debug!(event = "forwarding_call", tool = %tool.name, url = %url, "forwarding tool call");

        let envelope: ExecuteEnvelope = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?
            .json()
            .await?;

        if envelope.success {
            Ok(envelope.result.unwrap_or_default())
        } else {
            Err(BridgeError::Api(
                envelope
                    .error
                    .unwrap_or_else(|| "unknown error from execution surface".to_string()),
            ))
        }
    }
}

/// The per-tool endpoint path for a manifest entry, with sanitized segments.
pub fn endpoint_path(tool: &BridgeTool) -> String {
    match tool.kind {
        ToolKind::Mcp => {
            let server = tool.server.as_deref().unwrap_or_default();
            format!(
                "/tools/mcp/{}/{}",
                sanitize_segment(server),
                sanitize_segment(&tool.name)
            )
        }
        ToolKind::Custom => format!("/tools/custom/{}", sanitize_segment(&tool.name)),
        ToolKind::Virtual => format!("/tools/virtual/{}", sanitize_segment(&tool.name)),
    }
}

/// URL-segment form of a name: lowercase, `-` folded to `_`. Mirrors the
/// surface's ingress rule; the surface itself handles the hyphen fallback.
fn sanitize_segment(name: &str) -> String {
    name.to_lowercase().replace('-', "_")
}
