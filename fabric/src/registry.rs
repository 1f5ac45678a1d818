//! Process-wide tool registry.
//!
//! One registry serves the whole process: multiple agents contribute
//! providers through [`ToolRegistry::init_or_merge`] and dispatch through
//! the `call_*` entry points. Readers take an `Arc` snapshot and never hold
//! a lock across a transport round-trip.
//!
//! Merge semantics are deliberate and asymmetric: MCP clients and virtual
//! tools keep the first registration, while custom tools are *replaced* on
//! re-registration; an orchestration layer re-registers executors wrapped
//! with guards, and the newest wrapper must win.

use crate::client::{ClientConnector, McpClient, NoConnector};
use crate::error::FabricError;
use crate::naming::{normalize_server, normalize_tool};
use crate::pool::ConnectionPool;
use crate::router::{self, BuildErrorClassifier, CallContext, GenuineErrorClassifier};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

/// Cap on how many known tool names a not-found debug dump lists.
const NOT_FOUND_DUMP_CAP: usize = 32;

/// A locally-implemented tool: custom (agent-registered, categorized) or
/// virtual (fabric-internal).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with the given JSON arguments.
    async fn call(&self, args: Value) -> Result<String, FabricError>;
}

/// Wraps an async closure as a [`ToolHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, FabricError>> + Send + 'static,
{
    struct FnHandler<F>(F);

    #[async_trait]
    impl<F> ToolHandler for FnHandler<F>
    where
        F: Fn(Value) -> futures::future::BoxFuture<'static, Result<String, FabricError>>
            + Send
            + Sync,
    {
        async fn call(&self, args: Value) -> Result<String, FabricError> {
            (self.0)(args).await
        }
    }

    let boxed = move |args: Value| -> futures::future::BoxFuture<'static, Result<String, FabricError>> {
        Box::pin(f(args))
    };
    Arc::new(FnHandler(boxed))
}

/// Providers contributed by one agent, merged into the process registry.
#[derive(Default)]
pub struct RegistryInit {
    mcp_clients: HashMap<String, Arc<dyn McpClient>>,
    custom_tools: HashMap<String, Arc<dyn ToolHandler>>,
    virtual_tools: HashMap<String, Arc<dyn ToolHandler>>,
    tool_to_server: HashMap<String, String>,
    connector: Option<Arc<dyn ClientConnector>>,
    config_path: Option<PathBuf>,
    classifier: Option<Arc<dyn GenuineErrorClassifier>>,
}

impl RegistryInit {
    /// Returns a new builder.
    #[must_use]
    pub fn builder() -> RegistryInitBuilder {
        RegistryInitBuilder::default()
    }
}

/// Builder for [`RegistryInit`]. All names are canonicalized on insertion.
#[derive(Default)]
pub struct RegistryInitBuilder {
    init: RegistryInit,
}

impl RegistryInitBuilder {
    /// Adds an already-connected MCP client for `server`.
    #[must_use]
    pub fn mcp_client(mut self, server: impl AsRef<str>, client: Arc<dyn McpClient>) -> Self {
        self.init
            .mcp_clients
            .insert(normalize_server(server.as_ref()), client);
        self
    }

    /// Adds a custom tool handler.
    #[must_use]
    pub fn custom_tool(mut self, name: impl AsRef<str>, handler: Arc<dyn ToolHandler>) -> Self {
        self.init
            .custom_tools
            .insert(normalize_tool(name.as_ref()), handler);
        self
    }

    /// Adds a virtual tool handler.
    #[must_use]
    pub fn virtual_tool(mut self, name: impl AsRef<str>, handler: Arc<dyn ToolHandler>) -> Self {
        self.init
            .virtual_tools
            .insert(normalize_tool(name.as_ref()), handler);
        self
    }

    /// Maps an MCP tool name to its owning server for name-only dispatch.
    #[must_use]
    pub fn tool_mapping(mut self, tool: impl AsRef<str>, server: impl AsRef<str>) -> Self {
        self.init.tool_to_server.insert(
            normalize_tool(tool.as_ref()),
            normalize_server(server.as_ref()),
        );
        self
    }

    /// Sets the transport connector for lazy and recovery connections.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn ClientConnector>) -> Self {
        self.init.connector = Some(connector);
        self
    }

    /// Sets the MCP server configuration path handed to the connector.
    #[must_use]
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.init.config_path = Some(path.into());
        self
    }

    /// Overrides the genuine-error classifier (defaults to
    /// [`BuildErrorClassifier`]).
    #[must_use]
    pub fn classifier(mut self, classifier: Arc<dyn GenuineErrorClassifier>) -> Self {
        self.init.classifier = Some(classifier);
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> RegistryInit {
        self.init
    }
}

/// The process-wide tool index. Immutable once published; merges build a new
/// snapshot and swap it in.
pub struct ToolRegistry {
    pool: Arc<ConnectionPool>,
    custom_tools: HashMap<String, Arc<dyn ToolHandler>>,
    virtual_tools: HashMap<String, Arc<dyn ToolHandler>>,
    tool_to_server: HashMap<String, String>,
    classifier: Arc<dyn GenuineErrorClassifier>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("custom_tools", &self.custom_tools.keys().collect::<Vec<_>>())
            .field("virtual_tools", &self.virtual_tools.keys().collect::<Vec<_>>())
            .field("tool_to_server", &self.tool_to_server)
            .finish_non_exhaustive()
    }
}

struct Global {
    slot: RwLock<Option<Arc<ToolRegistry>>>,
    /// Serializes init-or-merge; readers only touch `slot`.
    creation: Mutex<()>,
}

fn global() -> &'static Global {
    static GLOBAL: OnceLock<Global> = OnceLock::new();
    GLOBAL.get_or_init(|| Global {
        slot: RwLock::new(None),
        creation: Mutex::new(()),
    })
}

impl ToolRegistry {
    /// Initializes the process registry, or merges into it if it already
    /// exists. Safe to call from multiple agents; merges are serialized.
    pub fn init_or_merge(init: RegistryInit) {
        let g = global();
        let _creation = match g.creation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let current = {
            let slot = match g.slot.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.clone()
        };

        let next = match current {
            None => Arc::new(Self::from_init(init)),
            Some(existing) => Arc::new(existing.merged_with(init)),
        };

        let mut slot = match g.slot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(next);
    }

    /// Returns the current registry snapshot.
    pub fn get() -> Result<Arc<Self>, FabricError> {
        let slot = match global().slot.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.clone().ok_or(FabricError::RegistryUninitialized)
    }

    fn from_init(init: RegistryInit) -> Self {
        let connector = init
            .connector
            .unwrap_or_else(|| Arc::new(NoConnector) as Arc<dyn ClientConnector>);
        let pool = Arc::new(ConnectionPool::new(connector, init.config_path));
        for (server, client) in init.mcp_clients {
            pool.adopt(&server, client);
            tracing::debug!(event = "mcp_client_registered", server = %server, "registered MCP client");
        }
        let mut tool_to_server = HashMap::new();
        for (tool, server) in init.tool_to_server {
            tracing::debug!(event = "tool_mapping_registered", tool = %tool, server = %server, "registered tool mapping");
            tool_to_server.insert(tool, server);
        }
        for name in init.custom_tools.keys() {
            tracing::debug!(event = "custom_tool_registered", tool = %name, "registered custom tool");
        }
        for name in init.virtual_tools.keys() {
            tracing::debug!(event = "virtual_tool_registered", tool = %name, "registered virtual tool");
        }
        let registry = Self {
            pool,
            custom_tools: init.custom_tools,
            virtual_tools: init.virtual_tools,
            tool_to_server,
            classifier: init
                .classifier
                .unwrap_or_else(|| Arc::new(BuildErrorClassifier)),
        };
        registry.warn_on_kind_overlap();
        registry
    }

    /// Builds the merged successor snapshot. The connection pool is shared
    /// with the predecessor so live connections survive the merge.
    fn merged_with(&self, init: RegistryInit) -> Self {
        for (server, client) in init.mcp_clients {
            if self.pool.adopt(&server, client) {
                tracing::debug!(event = "mcp_client_registered", server = %server, "registered MCP client");
            } else {
                tracing::debug!(event = "mcp_client_kept", server = %server, "kept existing MCP client");
            }
        }

        let mut custom_tools = self.custom_tools.clone();
        for (name, handler) in init.custom_tools {
            if custom_tools.insert(name.clone(), handler).is_some() {
                // Replacement is the point: the newer registration may wrap
                // the older executor with guards.
                tracing::debug!(event = "custom_tool_replaced", tool = %name, "replaced custom tool");
            } else {
                tracing::debug!(event = "custom_tool_registered", tool = %name, "registered custom tool");
            }
        }

        let mut virtual_tools = self.virtual_tools.clone();
        for (name, handler) in init.virtual_tools {
            if virtual_tools.contains_key(&name) {
                tracing::debug!(event = "virtual_tool_kept", tool = %name, "kept existing virtual tool");
            } else {
                virtual_tools.insert(name.clone(), handler);
                tracing::debug!(event = "virtual_tool_registered", tool = %name, "registered virtual tool");
            }
        }

        let mut tool_to_server = self.tool_to_server.clone();
        for (tool, server) in init.tool_to_server {
            match tool_to_server.get(&tool) {
                Some(existing) if *existing != server => {
                    tracing::warn!(
                        event = "tool_mapping_conflict",
                        tool = %tool,
                        existing = %existing,
                        rejected = %server,
                        "conflicting tool-to-server mapping, keeping first"
                    );
                }
                Some(_) => {}
                None => {
                    tracing::debug!(event = "tool_mapping_registered", tool = %tool, server = %server, "registered tool mapping");
                    tool_to_server.insert(tool, server);
                }
            }
        }

        let registry = Self {
            pool: Arc::clone(&self.pool),
            custom_tools,
            virtual_tools,
            tool_to_server,
            classifier: init.classifier.unwrap_or_else(|| Arc::clone(&self.classifier)),
        };
        registry.warn_on_kind_overlap();
        registry
    }

    /// Virtual names shadow custom names at dispatch; an overlap is almost
    /// always a registration mistake, so make it visible.
    fn warn_on_kind_overlap(&self) {
        for name in self.virtual_tools.keys() {
            if self.custom_tools.contains_key(name) {
                tracing::warn!(
                    event = "tool_kind_overlap",
                    tool = %name,
                    "tool registered as both virtual and custom; virtual wins at dispatch"
                );
            }
        }
    }

    /// The shared connection pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Calls an MCP tool by name, resolving its server through the
    /// tool-to-server mapping.
    pub async fn call_mcp(
        &self,
        ctx: CallContext,
        tool: &str,
        args: Value,
    ) -> Result<String, FabricError> {
        let key = normalize_tool(tool);
        let Some(server) = self.tool_to_server.get(&key) else {
            self.log_not_found(tool);
            return Err(FabricError::ToolNotFound {
                tool: tool.to_string(),
            });
        };
        self.call_mcp_on(ctx, server, tool, args).await
    }

    /// Calls an MCP tool on an explicitly named server (used by the HTTP
    /// surface, where the path carries the identity).
    pub async fn call_mcp_on(
        &self,
        ctx: CallContext,
        server: &str,
        tool: &str,
        args: Value,
    ) -> Result<String, FabricError> {
        router::invoke_mcp(&self.pool, &*self.classifier, ctx, server, tool, args).await
    }

    /// Calls a custom tool.
    pub async fn call_custom(
        &self,
        _ctx: CallContext,
        tool: &str,
        args: Value,
    ) -> Result<String, FabricError> {
        let key = normalize_tool(tool);
        let Some(handler) = self.custom_tools.get(&key).cloned() else {
            self.log_not_found(tool);
            return Err(FabricError::ToolNotFound {
                tool: tool.to_string(),
            });
        };
        handler.call(args).await
    }

    /// Calls a virtual tool.
    pub async fn call_virtual(
        &self,
        _ctx: CallContext,
        tool: &str,
        args: Value,
    ) -> Result<String, FabricError> {
        let key = normalize_tool(tool);
        let Some(handler) = self.virtual_tools.get(&key).cloned() else {
            self.log_not_found(tool);
            return Err(FabricError::ToolNotFound {
                tool: tool.to_string(),
            });
        };
        handler.call(args).await
    }

    /// Name-only dispatch across all provider kinds. Virtual and custom
    /// handlers shadow an MCP tool of the same name.
    pub async fn invoke(
        &self,
        ctx: CallContext,
        tool: &str,
        args: Value,
    ) -> Result<String, FabricError> {
        let key = normalize_tool(tool);
        if self.virtual_tools.contains_key(&key) {
            return self.call_virtual(ctx, tool, args).await;
        }
        if self.custom_tools.contains_key(&key) {
            return self.call_custom(ctx, tool, args).await;
        }
        self.call_mcp(ctx, tool, args).await
    }

    /// Canonical names of registered custom tools, sorted.
    #[must_use]
    pub fn custom_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.custom_tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Canonical names of registered virtual tools, sorted.
    #[must_use]
    pub fn virtual_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.virtual_tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// The server a tool name maps to, if any.
    #[must_use]
    pub fn server_for_tool(&self, tool: &str) -> Option<&str> {
        self.tool_to_server
            .get(&normalize_tool(tool))
            .map(String::as_str)
    }

    fn log_not_found(&self, tool: &str) {
        let mut known: Vec<&str> = self
            .custom_tools
            .keys()
            .chain(self.virtual_tools.keys())
            .chain(self.tool_to_server.keys())
            .map(String::as_str)
            .collect();
        known.sort_unstable();
        known.truncate(NOT_FOUND_DUMP_CAP);
        tracing::debug!(
            event = "tool_not_found",
            tool,
            known = %known.join(", "),
            "tool not present in any registry table"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, ToolDescriptor, ToolOutcome};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoClient;

    #[async_trait]
    impl McpClient for EchoClient {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
            Ok(vec![])
        }

        async fn call_tool(&self, tool: &str, _args: Value) -> Result<ToolOutcome, ClientError> {
            Ok(ToolOutcome::text(format!("echo:{tool}")))
        }
    }

    fn tagged_handler(tag: &'static str) -> Arc<dyn ToolHandler> {
        handler_fn(move |_args| async move { Ok(tag.to_string()) })
    }

    #[tokio::test]
    async fn custom_tools_replace_on_merge() {
        let first = ToolRegistry::from_init(
            RegistryInit::builder()
                .custom_tool("execute_command", tagged_handler("plain"))
                .build(),
        );
        let merged = first.merged_with(
            RegistryInit::builder()
                .custom_tool("execute_command", tagged_handler("guarded"))
                .build(),
        );

        let out = merged
            .call_custom(CallContext::default(), "execute_command", Value::Null)
            .await
            .unwrap();
        assert_eq!(out, "guarded");
    }

    #[tokio::test]
    async fn virtual_tools_keep_first_on_merge() {
        let first = ToolRegistry::from_init(
            RegistryInit::builder()
                .virtual_tool("get_api_spec", tagged_handler("original"))
                .build(),
        );
        let merged = first.merged_with(
            RegistryInit::builder()
                .virtual_tool("get_api_spec", tagged_handler("usurper"))
                .build(),
        );

        let out = merged
            .call_virtual(CallContext::default(), "get_api_spec", Value::Null)
            .await
            .unwrap();
        assert_eq!(out, "original");
    }

    #[tokio::test]
    async fn conflicting_tool_mapping_keeps_first() {
        let first = ToolRegistry::from_init(
            RegistryInit::builder()
                .tool_mapping("read_email", "gmail")
                .build(),
        );
        let merged = first.merged_with(
            RegistryInit::builder()
                .tool_mapping("read_email", "outlook")
                .tool_mapping("send_message", "slack")
                .build(),
        );

        assert_eq!(merged.server_for_tool("read_email"), Some("gmail"));
        assert_eq!(merged.server_for_tool("send_message"), Some("slack"));
    }

    #[tokio::test]
    async fn mcp_clients_keep_first_on_merge() {
        let first = ToolRegistry::from_init(
            RegistryInit::builder()
                .mcp_client("gmail", Arc::new(EchoClient))
                .build(),
        );
        let adopted = Arc::clone(&first.pool);
        let before = adopted.get_or_create("gmail").await.unwrap();

        let merged = first.merged_with(
            RegistryInit::builder()
                .mcp_client("gmail", Arc::new(EchoClient))
                .build(),
        );
        let after = merged.pool().get_or_create("gmail").await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn name_only_dispatch_resolves_the_server() {
        let registry = ToolRegistry::from_init(
            RegistryInit::builder()
                .mcp_client("gmail", Arc::new(EchoClient))
                .tool_mapping("ReadEmail", "Gmail")
                .build(),
        );
        let out = registry
            .call_mcp(CallContext::default(), "read_email", Value::Null)
            .await
            .unwrap();
        assert_eq!(out, "echo:read_email");
    }

    #[tokio::test]
    async fn invoke_prefers_local_handlers_over_mcp() {
        let registry = ToolRegistry::from_init(
            RegistryInit::builder()
                .mcp_client("gmail", Arc::new(EchoClient))
                .tool_mapping("read_email", "gmail")
                .custom_tool("read_email", tagged_handler("custom-shadow"))
                .build(),
        );
        let out = registry
            .invoke(CallContext::default(), "read_email", Value::Null)
            .await
            .unwrap();
        assert_eq!(out, "custom-shadow");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::from_init(RegistryInit::default());
        let err = registry
            .call_custom(CallContext::default(), "missing", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn handlers_observe_their_arguments() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let handler = handler_fn(move |args| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(args.to_string())
            }
        });
        let registry = ToolRegistry::from_init(
            RegistryInit::builder().custom_tool("echo_args", handler).build(),
        );
        let out = registry
            .call_custom(
                CallContext::default(),
                "echo_args",
                serde_json::json!({"a": 1}),
            )
            .await
            .unwrap();
        assert_eq!(out, r#"{"a":1}"#);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
