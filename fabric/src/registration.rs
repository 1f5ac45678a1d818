//! The two consumers of the tool filter.
//!
//! LLM-facing registration and code-execution discovery both enumerate the
//! same providers and must agree exactly on what is included. Each function
//! here routes every decision through [`ToolFilter::should_include`] with
//! identical arguments; neither reimplements any part of the predicate.

use crate::client::McpClient;
use crate::filter::ToolFilter;
use crate::naming::{normalize_server, normalize_tool, sanitize_segment};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Package name under which virtual tools are grouped.
pub const VIRTUAL_PACKAGE: &str = "virtual_tools";

/// Which provider backs a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// A remote MCP server reachable through the connection pool.
    Mcp {
        /// Canonical server name.
        server: String,
    },
    /// A locally-linked handler registered under a category.
    Custom {
        /// Canonical category name.
        category: String,
    },
    /// A fabric-internal handler.
    Virtual,
}

/// One tool as offered to a consumer (LLM registration, bridge manifest,
/// endpoint documentation).
#[derive(Debug, Clone)]
pub struct ToolEntry {
    /// Wire name of the tool.
    pub name: String,
    /// Canonical package (server, category, or [`VIRTUAL_PACKAGE`]).
    pub package: String,
    /// Provider backing this tool.
    pub kind: ProviderKind,
    /// Human-readable description.
    pub description: String,
    /// Opaque JSON Schema for the arguments.
    pub parameters: Value,
}

/// A custom tool as declared by the agent at startup.
#[derive(Debug, Clone)]
pub struct CustomToolSpec {
    /// Tool name.
    pub name: String,
    /// Category the tool belongs to.
    pub category: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the arguments.
    pub parameters: Value,
}

/// A virtual tool as declared by the fabric or an embedding layer.
#[derive(Debug, Clone)]
pub struct VirtualToolSpec {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the arguments.
    pub parameters: Value,
}

/// A package directory as seen by code-execution discovery.
#[derive(Debug, Clone)]
pub struct PackageDir {
    /// Sanitized directory name.
    pub dir: String,
    /// Whether the directory is a category (custom/system) rather than an
    /// MCP server.
    pub is_category: bool,
    /// Included tools under this directory.
    pub entries: Vec<ToolEntry>,
}

/// Collects the tool entries offered to the LLM.
///
/// MCP servers whose `tools/list` fails are skipped with a warning; the
/// remaining providers still register.
pub async fn llm_tool_entries(
    filter: &ToolFilter,
    mcp_clients: &HashMap<String, Arc<dyn McpClient>>,
    custom: &[CustomToolSpec],
    virtuals: &[VirtualToolSpec],
) -> Vec<ToolEntry> {
    let mut entries = Vec::new();

    let mut servers: Vec<&String> = mcp_clients.keys().collect();
    servers.sort();
    for server in servers {
        let Some(client) = mcp_clients.get(server) else {
            continue;
        };
        let descriptors = match client.list_tools().await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(event = "list_tools_failed", server = %server, error = %e, "skipping server during registration");
                continue;
            }
        };
        for descriptor in descriptors {
            if filter.should_include(server, &descriptor.name, false, false) {
                entries.push(ToolEntry {
                    name: descriptor.name.clone(),
                    package: normalize_server(server),
                    kind: ProviderKind::Mcp {
                        server: normalize_server(server),
                    },
                    description: descriptor.description,
                    parameters: descriptor.input_schema,
                });
            }
        }
    }

    for spec in custom {
        if filter.should_include(&spec.category, &spec.name, true, false) {
            entries.push(ToolEntry {
                name: spec.name.clone(),
                package: normalize_server(&spec.category),
                kind: ProviderKind::Custom {
                    category: normalize_server(&spec.category),
                },
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            });
        }
    }

    for spec in virtuals {
        if filter.should_include(VIRTUAL_PACKAGE, &spec.name, false, true) {
            entries.push(ToolEntry {
                name: spec.name.clone(),
                package: VIRTUAL_PACKAGE.to_string(),
                kind: ProviderKind::Virtual,
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            });
        }
    }

    entries
}

/// Collects the same tool set grouped by package directory for
/// code-execution discovery.
///
/// The inclusion decisions are byte-for-byte those of [`llm_tool_entries`]:
/// both call sites delegate to the one filter.
pub async fn codegen_tool_entries(
    filter: &ToolFilter,
    mcp_clients: &HashMap<String, Arc<dyn McpClient>>,
    custom: &[CustomToolSpec],
    virtuals: &[VirtualToolSpec],
) -> Vec<PackageDir> {
    let flat = llm_tool_entries(filter, mcp_clients, custom, virtuals).await;

    let mut dirs: HashMap<String, PackageDir> = HashMap::new();
    for entry in flat {
        let dir = sanitize_segment(&entry.package);
        let slot = dirs.entry(dir.clone()).or_insert_with(|| PackageDir {
            is_category: filter.is_category_directory(&dir),
            dir,
            entries: Vec::new(),
        });
        slot.entries.push(entry);
    }

    let mut out: Vec<PackageDir> = dirs.into_values().collect();
    for dir in &mut out {
        dir.entries
            .sort_by_key(|e| normalize_tool(&e.name));
    }
    out.sort_by(|a, b| a.dir.cmp(&b.dir));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, ToolDescriptor, ToolOutcome};
    use async_trait::async_trait;
    use serde_json::json;

    struct ListingClient {
        tools: Vec<&'static str>,
    }

    #[async_trait]
    impl McpClient for ListingClient {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
            Ok(self
                .tools
                .iter()
                .map(|name| ToolDescriptor {
                    name: (*name).to_string(),
                    description: format!("{name} tool"),
                    input_schema: json!({"type": "object"}),
                })
                .collect())
        }

        async fn call_tool(&self, _tool: &str, _args: Value) -> Result<ToolOutcome, ClientError> {
            Ok(ToolOutcome::text("unused"))
        }
    }

    struct BrokenClient;

    #[async_trait]
    impl McpClient for BrokenClient {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
            Err(ClientError::Protocol("listing refused".to_string()))
        }

        async fn call_tool(&self, _tool: &str, _args: Value) -> Result<ToolOutcome, ClientError> {
            Ok(ToolOutcome::text("unused"))
        }
    }

    fn fixtures() -> (
        HashMap<String, Arc<dyn McpClient>>,
        Vec<CustomToolSpec>,
        Vec<VirtualToolSpec>,
    ) {
        let mut clients: HashMap<String, Arc<dyn McpClient>> = HashMap::new();
        clients.insert(
            "gmail".to_string(),
            Arc::new(ListingClient {
                tools: vec!["read_email", "send_email", "delete_email"],
            }),
        );
        clients.insert(
            "google-sheets".to_string(),
            Arc::new(ListingClient {
                tools: vec!["GetSheetData"],
            }),
        );
        let custom = vec![CustomToolSpec {
            name: "execute_command".to_string(),
            category: "workspace".to_string(),
            description: "run a shell command".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let virtuals = vec![VirtualToolSpec {
            name: "get_api_spec".to_string(),
            description: "introspect the API".to_string(),
            parameters: json!({"type": "object"}),
        }];
        (clients, custom, virtuals)
    }

    #[tokio::test]
    async fn both_call_sites_agree_on_inclusion() {
        let (clients, custom, virtuals) = fixtures();
        let filter = ToolFilter::new(
            &["gmail:read_email".to_string()],
            &[],
            &["gmail".to_string(), "google-sheets".to_string()],
            &["workspace".to_string()],
        );

        let flat = llm_tool_entries(&filter, &clients, &custom, &virtuals).await;
        let grouped = codegen_tool_entries(&filter, &clients, &custom, &virtuals).await;

        let mut flat_names: Vec<String> = flat
            .iter()
            .map(|e| format!("{}:{}", e.package, normalize_tool(&e.name)))
            .collect();
        flat_names.sort();
        let mut grouped_names: Vec<String> = grouped
            .iter()
            .flat_map(|d| {
                d.entries
                    .iter()
                    .map(|e| format!("{}:{}", e.package, normalize_tool(&e.name)))
            })
            .collect();
        grouped_names.sort();
        assert_eq!(flat_names, grouped_names);

        // Per-tool mode on gmail, system default on workspace, virtual
        // unconditional, strict exclusion of the unselected server.
        assert_eq!(
            flat_names,
            vec![
                "gmail:read_email",
                "virtual_tools:get_api_spec",
                "workspace:execute_command",
            ]
        );
    }

    #[tokio::test]
    async fn grouping_classifies_directories() {
        let (clients, custom, virtuals) = fixtures();
        let filter = ToolFilter::allow_all(
            &["gmail".to_string(), "google-sheets".to_string()],
            &["workspace".to_string()],
        );
        let grouped = codegen_tool_entries(&filter, &clients, &custom, &virtuals).await;

        let dirs: Vec<(&str, bool)> = grouped
            .iter()
            .map(|d| (d.dir.as_str(), d.is_category))
            .collect();
        assert_eq!(
            dirs,
            vec![
                ("gmail", false),
                ("google_sheets", false),
                ("virtual_tools", true),
                ("workspace", true),
            ]
        );
    }

    #[tokio::test]
    async fn broken_listing_skips_only_that_server() {
        let (mut clients, custom, virtuals) = fixtures();
        clients.insert("slack".to_string(), Arc::new(BrokenClient));
        let filter = ToolFilter::allow_all(
            &[
                "gmail".to_string(),
                "google-sheets".to_string(),
                "slack".to_string(),
            ],
            &["workspace".to_string()],
        );

        let flat = llm_tool_entries(&filter, &clients, &custom, &virtuals).await;
        assert!(flat.iter().all(|e| e.package != "slack"));
        assert!(flat.iter().any(|e| e.package == "gmail"));
    }
}
