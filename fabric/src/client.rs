//! MCP client abstraction: the seam where concrete transports plug in.
//!
//! The fabric never speaks a wire protocol itself. It routes calls through
//! [`McpClient`] handles that a [`ClientConnector`] produces, and the
//! connection pool treats both as opaque. Transport crates implement these
//! traits; tests substitute fault-injected fakes.

use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// A schema-described tool advertised by an MCP server via `tools/list`.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Wire name of the tool as the server reported it.
    pub name: String,
    /// Human-readable description, possibly empty.
    pub description: String,
    /// JSON Schema for the tool's arguments, carried opaquely.
    pub input_schema: Value,
}

/// One part of an MCP tool result.
#[derive(Debug, Clone)]
pub enum ContentPart {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
    /// An embedded text resource; unwrapped to its text on conversion.
    Resource {
        /// The resource's text payload.
        text: String,
        /// Optional resource URI.
        uri: Option<String>,
    },
    /// A non-text part the fabric carries but does not interpret.
    Other(Value),
}

/// The raw result envelope from an MCP `tools/call`.
///
/// `is_error` is a *claim*, not a verdict: some servers set it on
/// otherwise-successful results. The dispatch router decides what it means.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    /// Content parts in server order.
    pub content: Vec<ContentPart>,
    /// The server's error flag.
    pub is_error: bool,
}

impl ToolOutcome {
    /// A successful outcome with a single text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// An error-flagged outcome with a single text part.
    #[must_use]
    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::Text { text: text.into() }],
            is_error: true,
        }
    }
}

/// Transport-level client failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An I/O error from the underlying transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport's internal channel closed mid-request (the
    /// protocol-layer equivalent of a broken pipe).
    #[error("connection closed: {0}")]
    ChannelClosed(String),

    /// The server replied with something that is not valid MCP.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection establishment failed.
    #[error("failed to connect: {0}")]
    ConnectFailed(String),

    /// The request did not complete within the transport's own deadline.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ClientError {
    /// Whether this error is a broken-pipe-class transport failure that the
    /// router may recover from with one fresh connection.
    ///
    /// Qualifying: `EPIPE`, connection reset, connection aborted, and
    /// [`ClientError::ChannelClosed`]. Deliberately conservative:
    /// `UnexpectedEof`, timeouts, and protocol errors do *not* qualify, so a
    /// persistent fault cannot turn into a retry loop.
    #[must_use]
    pub fn is_broken_pipe(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
            ),
            Self::ChannelClosed(_) => true,
            Self::Protocol(_) | Self::ConnectFailed(_) | Self::Timeout(_) => false,
        }
    }
}

/// A connected MCP client.
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Lists the tools the server advertises.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError>;

    /// Invokes a tool by its wire name.
    async fn call_tool(&self, tool: &str, args: Value) -> Result<ToolOutcome, ClientError>;
}

impl std::fmt::Debug for dyn McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn McpClient>")
    }
}

/// Produces connected [`McpClient`] handles for the connection pool.
///
/// `server` is passed in its wire form; implementations typically resolve it
/// against an MCP server configuration file at `config_path`.
#[async_trait]
pub trait ClientConnector: Send + Sync {
    /// Establishes a new connection to the named server.
    async fn connect(
        &self,
        server: &str,
        config_path: Option<&Path>,
    ) -> Result<Arc<dyn McpClient>, ClientError>;
}

/// Connector used when a registry is initialized without a transport layer.
/// Every connection attempt fails; already-adopted clients keep working.
#[derive(Debug, Default)]
pub struct NoConnector;

#[async_trait]
impl ClientConnector for NoConnector {
    async fn connect(
        &self,
        server: &str,
        _config_path: Option<&Path>,
    ) -> Result<Arc<dyn McpClient>, ClientError> {
        Err(ClientError::ConnectFailed(format!(
            "no client connector configured (server {server})"
        )))
    }
}
