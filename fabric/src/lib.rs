//! Tool dispatch and execution fabric for MCP-backed LLM agents.
//!
//! An LLM emits tool-call requests; this crate resolves each request against
//! a process-wide registry of providers (remote MCP servers, in-process
//! custom tools, fabric-internal virtual tools), executes it with the right
//! transport semantics, and returns a plain string result.
//!
//! The pieces, bottom up: [`naming`] defines the canonical identifier form
//! used by every map key; [`filter`] is the single inclusion predicate both
//! registration paths share; [`pool`] caches MCP client connections and
//! replaces them on broken pipes; [`router`] dispatches calls and
//! disambiguates the MCP result envelope; [`registry`] ties the tables
//! together behind a merge-friendly process singleton; [`manifest`] emits
//! the launch configuration for the stdio bridge.

pub mod client;
pub mod error;
pub mod filter;
pub mod manifest;
pub mod naming;
pub mod pool;
pub mod registration;
pub mod registry;
pub mod router;

pub use error::FabricError;

/// Common traits and types for ergonomic usage of the fabric.
pub mod prelude {
    pub use crate::client::{
        ClientConnector, ClientError, ContentPart, McpClient, ToolDescriptor, ToolOutcome,
    };
    pub use crate::error::FabricError;
    pub use crate::filter::{Selector, ToolFilter};
    pub use crate::manifest::{BridgeLaunchConfig, BridgeManifestBuilder, BridgeToolKind};
    pub use crate::naming::{desanitize_server, normalize_server, normalize_tool, sanitize_segment};
    pub use crate::pool::ConnectionPool;
    pub use crate::registration::{ProviderKind, ToolEntry};
    pub use crate::registry::{handler_fn, RegistryInit, ToolHandler, ToolRegistry};
    pub use crate::router::{BuildErrorClassifier, CallContext, GenuineErrorClassifier};
}
