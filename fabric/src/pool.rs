//! Cached MCP client connections with broken-pipe replacement.
//!
//! The pool owns one [`McpClient`] handle per server, created lazily through
//! the configured [`ClientConnector`]. Cache reads are shared-lock lookups;
//! first-time creation serializes on a per-server async lock so that
//! concurrent callers for the same server produce exactly one connection,
//! while distinct servers connect independently.

use crate::client::{ClientConnector, McpClient};
use crate::error::FabricError;
use crate::naming::normalize_server;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

/// A pooled connection and its provenance.
#[derive(Clone)]
pub struct CachedConnection {
    /// Canonical server name this connection belongs to.
    pub server_name: String,
    /// The shared client handle.
    pub client: Arc<dyn McpClient>,
    /// When the connection was established or adopted.
    pub created_at: Instant,
}

/// Process-lifetime cache of MCP client connections.
pub struct ConnectionPool {
    connector: Arc<dyn ClientConnector>,
    config_path: Option<PathBuf>,
    entries: RwLock<HashMap<String, CachedConnection>>,
    /// Per-server creation locks; taken only on the connect path.
    init_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConnectionPool {
    /// Creates an empty pool backed by the given connector.
    #[must_use]
    pub fn new(connector: Arc<dyn ClientConnector>, config_path: Option<PathBuf>) -> Self {
        Self {
            connector,
            config_path,
            entries: RwLock::new(HashMap::new()),
            init_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached client for `server`, connecting on first use.
    ///
    /// The wire spelling of `server` is forwarded to the connector as given;
    /// the cache key is always canonical.
    pub async fn get_or_create(&self, server: &str) -> Result<Arc<dyn McpClient>, FabricError> {
        let key = normalize_server(server);
        if let Some(entry) = self.lookup(&key) {
            return Ok(entry.client);
        }

        let creation = self.init_lock(&key);
        let _guard = creation.lock().await;
        // Double-check: another caller may have connected while we waited.
        if let Some(entry) = self.lookup(&key) {
            return Ok(entry.client);
        }

        let client = self.connect(server, &key).await?;
        tracing::info!(event = "mcp_connected", server = %key, "established MCP connection");
        Ok(client)
    }

    /// Invalidates any cached connection for `server` and connects anew.
    ///
    /// The replacement is a single map-entry swap: until the fresh client is
    /// ready, readers keep seeing the old one; afterwards only the fresh one
    /// is handed out. If the reconnect fails the stale entry is dropped so
    /// the next `get_or_create` starts clean.
    pub async fn get_fresh(&self, server: &str) -> Result<Arc<dyn McpClient>, FabricError> {
        let key = normalize_server(server);
        let creation = self.init_lock(&key);
        let _guard = creation.lock().await;

        match self.connect(server, &key).await {
            Ok(client) => {
                tracing::info!(event = "mcp_reconnected", server = %key, "replaced MCP connection");
                Ok(client)
            }
            Err(e) => {
                let mut map = match self.entries.write() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                map.remove(&key);
                Err(e)
            }
        }
    }

    /// Seeds an already-connected client (first-writer-wins).
    ///
    /// Returns `true` if the client was adopted, `false` if the server was
    /// already present.
    pub fn adopt(&self, server: &str, client: Arc<dyn McpClient>) -> bool {
        let key = normalize_server(server);
        let mut map = match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if map.contains_key(&key) {
            return false;
        }
        map.insert(
            key.clone(),
            CachedConnection {
                server_name: key,
                client,
                created_at: Instant::now(),
            },
        );
        true
    }

    /// Whether a connection for `server` is currently cached.
    #[must_use]
    pub fn contains(&self, server: &str) -> bool {
        self.lookup(&normalize_server(server)).is_some()
    }

    /// Canonical names of all cached servers, sorted.
    #[must_use]
    pub fn servers(&self) -> Vec<String> {
        let map = match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }

    /// The configured MCP server configuration path, if any.
    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    fn lookup(&self, key: &str) -> Option<CachedConnection> {
        let map = match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(key).cloned()
    }

    async fn connect(&self, server: &str, key: &str) -> Result<Arc<dyn McpClient>, FabricError> {
        let client = self
            .connector
            .connect(server, self.config_path.as_deref())
            .await
            .map_err(|e| FabricError::ServerNotConnected {
                server: server.to_string(),
                reason: e.to_string(),
            })?;
        let mut map = match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.insert(
            key.to_string(),
            CachedConnection {
                server_name: key.to_string(),
                client: Arc::clone(&client),
                created_at: Instant::now(),
            },
        );
        Ok(client)
    }

    fn init_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.init_locks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, ToolDescriptor, ToolOutcome};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticClient;

    #[async_trait]
    impl McpClient for StaticClient {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
            Ok(vec![])
        }

        async fn call_tool(&self, _tool: &str, _args: Value) -> Result<ToolOutcome, ClientError> {
            Ok(ToolOutcome::text("ok"))
        }
    }

    /// Counts connections; optionally sleeps inside connect to widen races.
    struct CountingConnector {
        connects: AtomicUsize,
        delay: Duration,
    }

    impl CountingConnector {
        fn new(delay: Duration) -> Self {
            Self {
                connects: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl ClientConnector for CountingConnector {
        async fn connect(
            &self,
            _server: &str,
            _config_path: Option<&std::path::Path>,
        ) -> Result<Arc<dyn McpClient>, ClientError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(Arc::new(StaticClient))
        }
    }

    struct FailingConnector;

    #[async_trait]
    impl ClientConnector for FailingConnector {
        async fn connect(
            &self,
            server: &str,
            _config_path: Option<&std::path::Path>,
        ) -> Result<Arc<dyn McpClient>, ClientError> {
            Err(ClientError::ConnectFailed(format!("no route to {server}")))
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_connection() {
        let connector = Arc::new(CountingConnector::new(Duration::from_millis(20)));
        let pool = Arc::new(ConnectionPool::new(connector.clone(), None));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(
                async move { pool.get_or_create("gmail").await },
            ));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_servers_connect_independently() {
        let connector = Arc::new(CountingConnector::new(Duration::ZERO));
        let pool = ConnectionPool::new(connector.clone(), None);

        pool.get_or_create("gmail").await.unwrap();
        pool.get_or_create("playwright").await.unwrap();
        pool.get_or_create("gmail").await.unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(pool.servers(), vec!["gmail", "playwright"]);
    }

    #[tokio::test]
    async fn get_fresh_replaces_the_cached_client() {
        let connector = Arc::new(CountingConnector::new(Duration::ZERO));
        let pool = ConnectionPool::new(connector.clone(), None);

        let first = pool.get_or_create("gmail").await.unwrap();
        let fresh = pool.get_fresh("gmail").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);

        let cached = pool.get_or_create("gmail").await.unwrap();
        assert!(Arc::ptr_eq(&fresh, &cached));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_drops_the_stale_entry() {
        let counting = Arc::new(CountingConnector::new(Duration::ZERO));
        let pool = ConnectionPool::new(counting, None);
        pool.get_or_create("gmail").await.unwrap();

        let failing_pool = ConnectionPool::new(Arc::new(FailingConnector), None);
        failing_pool.adopt("gmail", pool.get_or_create("gmail").await.unwrap());
        assert!(failing_pool.contains("gmail"));

        let err = failing_pool.get_fresh("gmail").await.unwrap_err();
        assert!(matches!(err, FabricError::ServerNotConnected { .. }));
        assert!(!failing_pool.contains("gmail"));
    }

    #[tokio::test]
    async fn adopt_is_first_writer_wins() {
        let pool = ConnectionPool::new(Arc::new(FailingConnector), None);
        let a: Arc<dyn McpClient> = Arc::new(StaticClient);
        let b: Arc<dyn McpClient> = Arc::new(StaticClient);
        assert!(pool.adopt("Google-Sheets", Arc::clone(&a)));
        assert!(!pool.adopt("google_sheets", b));
        let cached = pool.get_or_create("google-sheets").await.unwrap();
        assert!(Arc::ptr_eq(&cached, &a));
    }

    #[tokio::test]
    async fn connect_failure_maps_to_server_not_connected() {
        let pool = ConnectionPool::new(Arc::new(FailingConnector), None);
        let err = pool.get_or_create("gmail").await.unwrap_err();
        match err {
            FabricError::ServerNotConnected { server, reason } => {
                assert_eq!(server, "gmail");
                assert!(reason.contains("no route"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
