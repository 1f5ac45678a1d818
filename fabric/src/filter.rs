//! Inclusion filtering for `(package, tool)` pairs.
//!
//! [`ToolFilter::should_include`] is the single authoritative predicate for
//! tool selection. Both consumers, LLM-facing registration and
//! code-execution discovery, must call it with the same arguments for the
//! same pair; a second, diverging implementation is exactly the class of bug
//! this module exists to prevent.
//!
//! Filters are immutable after construction. Rebuild to change selection.

use crate::naming::{normalize_server, normalize_tool};
use std::collections::HashSet;

/// Categories that are always recognized as non-MCP packages, regardless of
/// configuration. Keeps human-in-the-loop and workspace tools from being
/// mis-routed to MCP lookup.
pub const SYSTEM_CATEGORIES: [&str; 6] = [
    "workspace",
    "workspace_basic",
    "workspace_advanced",
    "workspace_git",
    "workspace_browser",
    "human",
];

/// One parsed entry of `selected_tools`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// `pkg:*`: every tool of the package.
    AllTools {
        /// The package the wildcard applies to.
        package: String,
    },
    /// `pkg:tool`: exactly one tool.
    Tool {
        /// The package half of the selector.
        package: String,
        /// The tool half of the selector.
        tool: String,
    },
}

impl Selector {
    /// Parses a raw `"pkg:tool"` / `"pkg:*"` selector string.
    pub fn parse(raw: &str) -> Result<Self, crate::FabricError> {
        let invalid = || crate::FabricError::InvalidSelector {
            raw: raw.to_string(),
        };
        let (package, tool) = raw.split_once(':').ok_or_else(invalid)?;
        let package = package.trim();
        let tool = tool.trim();
        if package.is_empty() || tool.is_empty() || tool.contains(':') {
            return Err(invalid());
        }
        if tool == "*" {
            Ok(Self::AllTools {
                package: package.to_string(),
            })
        } else {
            Ok(Self::Tool {
                package: package.to_string(),
                tool: tool.to_string(),
            })
        }
    }
}

/// Immutable, precomputed inclusion filter.
///
/// All sets hold canonical names; the original (wire) spellings are inserted
/// alongside so that lookups succeed whichever form a caller holds.
pub struct ToolFilter {
    filtering_active: bool,
    has_selected_tools: bool,
    has_selected_servers: bool,
    /// Full `"pkg:tool"` strings, raw and canonicalized.
    normalized_tool_set: HashSet<String>,
    /// Packages selected with `:*`.
    servers_with_all_tools: HashSet<String>,
    /// Packages with at least one non-wildcard selector.
    servers_with_specific_tools: HashSet<String>,
    /// Entries of `selected_servers`.
    selected_servers: HashSet<String>,
    /// Names of connected MCP servers.
    mcp_server_names: HashSet<String>,
    /// Custom categories, bare and `_tools`-suffixed.
    custom_categories: HashSet<String>,
    /// System categories, bare and `_tools`-suffixed.
    system_categories: HashSet<String>,
}

impl ToolFilter {
    /// Builds a filter from raw configuration.
    ///
    /// Malformed `selected_tools` entries are skipped with a warning rather
    /// than failing construction.
    #[must_use]
    pub fn new(
        selected_tools: &[String],
        selected_servers: &[String],
        mcp_server_names: &[String],
        custom_categories: &[String],
    ) -> Self {
        let mut normalized_tool_set = HashSet::new();
        let mut servers_with_all_tools = HashSet::new();
        let mut servers_with_specific_tools = HashSet::new();

        for raw in selected_tools {
            match Selector::parse(raw) {
                Ok(Selector::AllTools { package }) => {
                    servers_with_all_tools.insert(normalize_server(&package));
                    servers_with_all_tools.insert(package);
                }
                Ok(Selector::Tool { package, tool }) => {
                    normalized_tool_set.insert(format!("{package}:{tool}"));
                    normalized_tool_set.insert(format!(
                        "{}:{}",
                        normalize_server(&package),
                        normalize_tool(&tool)
                    ));
                    servers_with_specific_tools.insert(normalize_server(&package));
                    servers_with_specific_tools.insert(package);
                }
                Err(e) => {
                    tracing::warn!(event = "selector_skipped", selector = %raw, error = %e, "skipping malformed tool selector");
                }
            }
        }

        let mut selected = HashSet::new();
        for s in selected_servers {
            selected.insert(normalize_server(s));
            selected.insert(s.clone());
        }

        let mut servers = HashSet::new();
        for s in mcp_server_names {
            servers.insert(normalize_server(s));
            servers.insert(s.clone());
        }

        let mut categories = HashSet::new();
        for c in custom_categories {
            let canonical = normalize_server(c);
            categories.insert(format!("{canonical}_tools"));
            categories.insert(canonical);
        }

        let mut system = HashSet::new();
        for c in SYSTEM_CATEGORIES {
            system.insert(c.to_string());
            system.insert(format!("{c}_tools"));
        }

        Self {
            filtering_active: !selected_tools.is_empty() || !selected_servers.is_empty(),
            has_selected_tools: !selected_tools.is_empty(),
            has_selected_servers: !selected_servers.is_empty(),
            normalized_tool_set,
            servers_with_all_tools,
            servers_with_specific_tools,
            selected_servers: selected,
            mcp_server_names: servers,
            custom_categories: categories,
            system_categories: system,
        }
    }

    /// A filter that includes everything (no selectors configured).
    #[must_use]
    pub fn allow_all(mcp_server_names: &[String], custom_categories: &[String]) -> Self {
        Self::new(&[], &[], mcp_server_names, custom_categories)
    }

    /// The authoritative inclusion decision for a `(package, tool)` pair.
    ///
    /// Pure: depends only on the arguments and the precomputed sets. Steps
    /// are ordered, first match wins:
    ///
    /// 1. virtual tools are unconditionally included;
    /// 2. no filtering configured includes everything;
    /// 3. a system category with no specific selection keeps its default
    ///    include (selecting any specific tool of the category switches it
    ///    to per-tool mode);
    /// 4. `pkg:*` wildcard;
    /// 5. per-tool mode: only the selected tools of the package, which
    ///    also overrides a server-wide include for the same package;
    /// 6. `selected_servers` membership;
    /// 7. strict mode: tools were selected and this package has none;
    /// 8. include (backwards-compatible default).
    #[must_use]
    pub fn should_include(
        &self,
        package: &str,
        tool: &str,
        is_custom: bool,
        is_virtual: bool,
    ) -> bool {
        let included = self.decide(package, tool, is_virtual);
        tracing::debug!(
            event = "filter_decision",
            package,
            tool,
            is_custom,
            is_virtual,
            included,
            "filter decision"
        );
        included
    }

    fn decide(&self, package: &str, tool: &str, is_virtual: bool) -> bool {
        if is_virtual {
            return true;
        }
        if !self.filtering_active {
            return true;
        }

        let pkg = normalize_server(package);
        let canonical_pair = format!("{pkg}:{}", normalize_tool(tool));
        let raw_pair = format!("{package}:{tool}");

        if self.system_categories.contains(&pkg) && !self.has_specific_selection(&pkg) {
            return true;
        }

        if self.servers_with_all_tools.contains(&pkg)
            || self.servers_with_all_tools.contains(package)
        {
            return true;
        }

        if self.servers_with_specific_tools.contains(&pkg)
            || self.servers_with_specific_tools.contains(package)
        {
            return self.normalized_tool_set.contains(&canonical_pair)
                || self.normalized_tool_set.contains(&raw_pair);
        }

        if self.has_selected_servers {
            return self.selected_servers.contains(&pkg) || self.selected_servers.contains(package);
        }

        if self.has_selected_tools {
            return false;
        }

        true
    }

    /// Whether any specific tool of `pkg` (or its `_tools` twin) is selected.
    fn has_specific_selection(&self, pkg: &str) -> bool {
        if self.servers_with_specific_tools.contains(pkg) {
            return true;
        }
        let twin = pkg.strip_suffix("_tools").map_or_else(
            || format!("{pkg}_tools"),
            std::string::ToString::to_string,
        );
        self.servers_with_specific_tools.contains(&twin)
    }

    /// Classifies a package directory name: category (custom/system) versus
    /// MCP server. A directory that matches no known MCP server is treated
    /// as a category.
    #[must_use]
    pub fn is_category_directory(&self, dir: &str) -> bool {
        let d = normalize_server(dir);
        if self.system_categories.contains(&d) || self.custom_categories.contains(&d) {
            return true;
        }
        if let Some(stripped) = d.strip_suffix("_tools") {
            if self.system_categories.contains(stripped) || self.custom_categories.contains(stripped)
            {
                return true;
            }
        }
        !self.mcp_server_names.contains(&d) && !self.mcp_server_names.contains(dir)
    }
}
