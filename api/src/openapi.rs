//! OpenAPI description of the per-tool endpoints.
//!
//! The bridge exposes only a handful of tools directly; everything else is
//! discovered by calling the `get_api_spec` virtual tool, which returns the
//! document built here, and then invoking the described endpoints from
//! generated code.

use mcp_fabric::naming::sanitize_segment;
use mcp_fabric::registration::{ProviderKind, ToolEntry};
use mcp_fabric::registry::{handler_fn, ToolHandler};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Builds an OpenAPI 3 document describing one `POST` endpoint per tool.
#[must_use]
pub fn build_openapi(entries: &[ToolEntry], base_url: &str) -> Value {
    let mut paths = Map::new();
    for entry in entries {
        let path = endpoint_path(entry);
        paths.insert(
            path,
            json!({
                "post": {
                    "operationId": entry.name,
                    "summary": entry.description,
                    "requestBody": {
                        "required": false,
                        "content": {
                            "application/json": {
                                "schema": entry.parameters
                            }
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "Execution envelope",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/ExecuteResponse" }
                                }
                            }
                        }
                    },
                    "security": [ { "bearerAuth": [] } ]
                }
            }),
        );
    }

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "MCP fabric execution surface",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "servers": [ { "url": base_url } ],
        "paths": Value::Object(paths),
        "components": {
            "schemas": {
                "ExecuteResponse": {
                    "type": "object",
                    "required": ["success"],
                    "properties": {
                        "success": { "type": "boolean" },
                        "result": { "type": "string" },
                        "error": { "type": "string" }
                    }
                }
            },
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer" }
            }
        }
    })
}

/// The per-tool endpoint path for an entry, with sanitized segments.
#[must_use]
pub fn endpoint_path(entry: &ToolEntry) -> String {
    match &entry.kind {
        ProviderKind::Mcp { server } => format!(
            "/tools/mcp/{}/{}",
            sanitize_segment(server),
            sanitize_segment(&entry.name)
        ),
        ProviderKind::Custom { .. } => format!("/tools/custom/{}", sanitize_segment(&entry.name)),
        ProviderKind::Virtual => format!("/tools/virtual/{}", sanitize_segment(&entry.name)),
    }
}

/// Wraps a built spec as the `get_api_spec` virtual tool handler.
#[must_use]
pub fn api_spec_tool(spec: &Value) -> Arc<dyn ToolHandler> {
    let rendered =
        serde_json::to_string_pretty(spec).unwrap_or_else(|_| spec.to_string());
    handler_fn(move |_args| {
        let rendered = rendered.clone();
        async move { Ok(rendered) }
    })
}
