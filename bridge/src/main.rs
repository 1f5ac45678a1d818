//! Stdio bridge binary: lets an MCP-native host invoke the fabric's HTTP
//! execution surface as if it were a single local MCP server.
//!
//! Configuration arrives entirely through environment variables
//! (`MCP_API_URL`, `MCP_API_TOKEN`, `MCP_TOOLS`); the agent side writes
//! them into the launch config it hands to the host. Exits 0 on clean
//! stdin EOF, non-zero on misconfiguration.

mod error;
mod manifest;
mod relay;
mod server;

use manifest::BridgeConfig;
use server::BridgeHandler;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = BridgeConfig::from_env()?;
    tracing::info!(
        event = "bridge_starting",
        api_url = %config.api_url,
        tools = config.tools.len(),
        "bridge starting over stdio"
    );

    let handler = BridgeHandler::new(config)?;
    let (stdin, stdout) = rmcp::transport::io::stdio();
    let service = rmcp::ServiceExt::serve(handler, (stdin, stdout))
        .await
        .map_err(|e| anyhow::anyhow!("failed to start stdio server: {e}"))?;
    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("stdio server failed: {e}"))?;

    tracing::info!(event = "bridge_stopped", "stdin closed, exiting");
    Ok(())
}
