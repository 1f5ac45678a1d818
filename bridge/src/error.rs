//! Error types for the stdio bridge.

use thiserror::Error;

/// All errors the bridge can hit.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required environment variable is absent.
    #[error("missing required environment variable {var}")]
    MissingEnv {
        /// The variable name.
        var: &'static str,
    },

    /// The `MCP_TOOLS` manifest did not parse or failed validation.
    #[error("invalid tool manifest: {0}")]
    InvalidManifest(String),

    /// The forwarded HTTP request failed at the transport level.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The execution surface returned a failure envelope.
    #[error("{0}")]
    Api(String),
}
