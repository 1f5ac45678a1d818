//! Minimal wiring: initialize the registry with a couple of local tools,
//! start the execution surface, and print the bridge launch config.
//!
//! ```bash
//! cargo run --example serve_api
//! curl -X POST http://127.0.0.1:8931/api/virtual/execute \
//!   -H "Authorization: Bearer <printed token>" \
//!   -H "Content-Type: application/json" \
//!   -d '{"tool":"get_api_spec","args":{}}'
//! ```

use mcp_fabric::prelude::*;
use mcp_fabric::registration::{ProviderKind, ToolEntry};
use mcp_fabric_api::openapi;
use mcp_fabric_api::ApiServer;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let addr = "127.0.0.1:8931".parse()?;
    let server = ApiServer::new(addr);
    let base_url = format!("http://{addr}");

    let entries = vec![
        ToolEntry {
            name: "execute_command".to_string(),
            package: "workspace".to_string(),
            kind: ProviderKind::Custom {
                category: "workspace".to_string(),
            },
            description: "Run a shell command in the workspace".to_string(),
            parameters: json!({
                "type": "object",
                "properties": { "command": { "type": "string" } },
                "required": ["command"]
            }),
        },
        ToolEntry {
            name: "get_api_spec".to_string(),
            package: "virtual_tools".to_string(),
            kind: ProviderKind::Virtual,
            description: "OpenAPI description of every per-tool endpoint".to_string(),
            parameters: json!({"type": "object"}),
        },
    ];

    let spec = openapi::build_openapi(&entries, &base_url);
    ToolRegistry::init_or_merge(
        RegistryInit::builder()
            .custom_tool(
                "execute_command",
                handler_fn(|args| async move {
                    // Demo stub; a real agent registers its sandboxed executor.
                    Ok(format!("would execute: {args}"))
                }),
            )
            .virtual_tool("get_api_spec", openapi::api_spec_tool(&spec))
            .build(),
    );

    match BridgeManifestBuilder::new(&base_url, server.token())
        .tools(entries)
        .build()
    {
        Ok(launch) => println!(
            "bridge launch config:\n{}",
            serde_json::to_string_pretty(&launch.to_mcp_servers_json())?
        ),
        Err(e) => eprintln!("bridge binary not installed, skipping launch config: {e}"),
    }

    println!("token: {}", server.token());
    server.serve().await?;
    Ok(())
}
