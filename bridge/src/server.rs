//! MCP stdio server handler backed by the HTTP relay.
//!
//! The bridge is a pure protocol adapter: `tools/list` answers from the
//! environment manifest, `tools/call` forwards to the execution surface. It
//! never loads MCP configuration and never talks to MCP servers itself.

use crate::manifest::{BridgeConfig, BridgeTool};
use crate::relay::ApiRelay;
use rmcp::service::RequestContext;
use rmcp::RoleServer;
use rmcp::{
    ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, Content, ErrorData, JsonObject, ListToolsResult,
        PaginatedRequestParams, Tool as McpTool,
    },
};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// Server name announced during `initialize`.
const SERVER_NAME: &str = "mcp-fabric-bridge";

/// MCP server handler that serves the manifest tools over stdio.
pub struct BridgeHandler {
    tools: HashMap<String, BridgeTool>,
    /// Pre-computed tool definitions for `tools/list`.
    definitions: Vec<McpTool>,
    relay: ApiRelay,
}

impl BridgeHandler {
    /// Builds a handler from the parsed configuration.
    pub fn new(config: BridgeConfig) -> Result<Self, crate::error::BridgeError> {
        let relay = ApiRelay::new(config.api_url, config.token)?;
        let definitions = config.tools.iter().map(entry_to_tool).collect();
        let tools = config
            .tools
            .into_iter()
            .map(|tool| (tool.name.clone(), tool))
            .collect();
        Ok(Self {
            tools,
            definitions,
            relay,
        })
    }
}

/// Converts a manifest entry into an MCP tool definition.
fn entry_to_tool(entry: &BridgeTool) -> McpTool {
    let input_schema = if let Value::Object(map) = entry.input_schema.clone() {
        Arc::new(map)
    } else {
        Arc::new(JsonObject::new())
    };

    McpTool {
        name: Cow::Owned(entry.name.clone()),
        title: Some(entry.name.clone()),
        description: Some(Cow::Owned(entry.description.clone())),
        input_schema,
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

impl ServerHandler for BridgeHandler {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: rmcp::model::Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                website_url: None,
                icons: None,
            },
            instructions: None,
        }
    }

    async fn initialize(
        &self,
        _request: rmcp::model::InitializeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<rmcp::model::InitializeResult, ErrorData> {
        Ok(self.get_info())
    }

    #[tracing::instrument(skip(self, _request, _context), fields(rpc.method = "list_tools"))]
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.definitions.clone(),
            next_cursor: None,
            meta: None,
        })
    }

    #[tracing::instrument(skip(self, request, _context), fields(rpc.method = "call_tool", tool.name = %request.name))]
    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let Some(tool) = self.tools.get(request.name.as_ref()) else {
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "unknown tool: {}",
                request.name
            ))]));
        };

        let args = request
            .arguments
            .map_or(Value::Object(JsonObject::new()), Value::Object);

        match self.relay.call(tool, args).await {
            Ok(output) => Ok(CallToolResult::success(vec![Content::text(output)])),
            Err(e) => {
                tracing::error!(target: "bridge", tool_name = %request.name, error = %e, "tool call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }
}
