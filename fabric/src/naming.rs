//! Canonical naming for server and tool identifiers.
//!
//! Every map key in the registry and every precomputed filter set uses the
//! *canonical* form produced here: lowercase, `_`-separated. The wire form
//! (what an MCP server or a URL actually carries) may differ and is
//! reconstructed on demand via [`desanitize_server`].

/// Canonicalizes an MCP server name: lowercase, `-` folded to `_`.
#[must_use]
pub fn normalize_server(name: &str) -> String {
    name.to_lowercase().replace('-', "_")
}

/// Canonicalizes a tool name.
///
/// Hyphens fold to `_` first. If the folded name already contains `_` it is
/// simply lowercased; otherwise the input is treated as PascalCase/camelCase
/// and an `_` is inserted before each interior uppercase letter:
/// `GetSheetData` -> `get_sheet_data`, `google-sheets` -> `google_sheets`.
#[must_use]
pub fn normalize_tool(name: &str) -> String {
    let folded = name.replace('-', "_");
    if folded.contains('_') {
        return folded.to_lowercase();
    }
    let mut out = String::with_capacity(folded.len() + 4);
    for (i, ch) in folded.chars().enumerate() {
        if ch.is_uppercase() && i != 0 {
            out.push('_');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

/// Sanitizes a name for use as a URL path segment or on-disk directory.
///
/// Same transformation as [`normalize_server`]; kept distinct because the
/// two call sites evolve independently (URL ingress vs registry keys).
#[must_use]
pub fn sanitize_segment(name: &str) -> String {
    name.to_lowercase().replace('-', "_")
}

/// Reconstructs the hyphenated wire form of a sanitized server name.
///
/// Used only by the single-retry fallback when a sanitized segment such as
/// `google_sheets` fails to resolve but the configured server is spelled
/// `google-sheets`.
#[must_use]
pub fn desanitize_server(name: &str) -> String {
    name.replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_lowercases_and_folds_hyphens() {
        assert_eq!(normalize_server("Google-Sheets"), "google_sheets");
        assert_eq!(normalize_server("gmail"), "gmail");
    }

    #[test]
    fn tool_splits_pascal_case() {
        assert_eq!(normalize_tool("GetSheetData"), "get_sheet_data");
        assert_eq!(normalize_tool("readEmail"), "read_email");
    }

    #[test]
    fn tool_with_separator_is_only_lowercased() {
        assert_eq!(normalize_tool("google-sheets"), "google_sheets");
        assert_eq!(normalize_tool("Read_Email"), "read_email");
        assert_eq!(normalize_tool("click"), "click");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["Google-Sheets", "GetSheetData", "read_email", "x"] {
            let server = normalize_server(raw);
            assert_eq!(normalize_server(&server), server);
            let tool = normalize_tool(raw);
            assert_eq!(normalize_tool(&tool), tool);
        }
    }

    #[test]
    fn desanitize_restores_hyphens() {
        assert_eq!(desanitize_server("google_sheets"), "google-sheets");
        assert_eq!(sanitize_segment("Google-Sheets"), "google_sheets");
    }
}
