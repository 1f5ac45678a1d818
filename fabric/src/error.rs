//! Error types for the tool dispatch fabric.

use crate::client::ClientError;
use thiserror::Error;

/// All errors the fabric surfaces to callers.
#[derive(Debug, Error)]
pub enum FabricError {
    /// The process-wide registry has not been initialized yet.
    #[error("tool registry is not initialized")]
    RegistryUninitialized,

    /// No provider is registered under the given tool name.
    #[error("tool not found: {tool}")]
    ToolNotFound {
        /// The name the caller asked for.
        tool: String,
    },

    /// The named MCP server has no cached connection and none could be
    /// established.
    #[error("failed to connect to server {server}: {reason}")]
    ServerNotConnected {
        /// Canonical or wire server name as the caller supplied it.
        server: String,
        /// What went wrong while connecting.
        reason: String,
    },

    /// A `selected_tools` entry did not parse as `pkg:tool` or `pkg:*`.
    #[error("invalid selector: {raw}")]
    InvalidSelector {
        /// The raw selector string.
        raw: String,
    },

    /// The tool ran and reported a genuine failure.
    #[error("tool execution failed: {message}")]
    ToolExecutionFailed {
        /// The failure message extracted from the result envelope.
        message: String,
    },

    /// The call's deadline elapsed before completion.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A transport call failed with a broken pipe and the automatic
    /// reconnect also failed; the original error is preserved.
    #[error("{original} (reconnect failed: {recovery})")]
    RecoveryFailed {
        /// The transport error that triggered recovery.
        original: ClientError,
        /// Why the fresh connection could not be established.
        recovery: Box<FabricError>,
    },

    /// Transport-level client failure that recovery did not apply to.
    #[error("transport error: {0}")]
    Client(#[from] ClientError),

    /// A custom or virtual handler failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// The bridge executable could not be located.
    #[error("bridge binary not found: {0}")]
    BridgeBinaryNotFound(String),
}

impl FabricError {
    /// Whether this error means the server itself could not be reached, as
    /// opposed to the tool failing. The HTTP surface uses this to decide
    /// whether a desanitized server name is worth one retry.
    #[must_use]
    pub fn is_connect_failure(&self) -> bool {
        match self {
            Self::ServerNotConnected { .. } => true,
            Self::Client(e) => matches!(e, ClientError::ConnectFailed(_)),
            Self::RecoveryFailed { recovery, .. } => recovery.is_connect_failure(),
            _ => false,
        }
    }
}
