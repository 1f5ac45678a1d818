//! Unified dispatch: routes an invocation to its provider and normalizes
//! the MCP result envelope.
//!
//! Custom and virtual handlers return their string untouched. MCP calls go
//! through the connection pool, recover once from a broken pipe, and then
//! pass the result envelope through disambiguation: some servers set
//! `is_error = true` on otherwise-successful results, so the flag alone is
//! not trusted; a pluggable classifier decides whether the content looks
//! like a genuine failure.

use crate::client::{ContentPart, ToolOutcome};
use crate::error::FabricError;
use crate::pool::ConnectionPool;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Per-call context carried through every invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContext {
    /// Absolute deadline for the call, if any.
    pub deadline: Option<Instant>,
}

impl CallContext {
    /// A context whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Whether the deadline has already elapsed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left until the deadline; zero once elapsed, `None` when the
    /// context carries no deadline. Enforcement layers (e.g. the HTTP
    /// surface's outer timeout) must derive their timer from this so the
    /// context stays the single source of truth.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Decides whether an `is_error = true` envelope carries a genuine failure.
///
/// The default [`BuildErrorClassifier`] recognizes compiler/build output;
/// deployments whose generated code is compiled by a different toolchain
/// substitute their own patterns here.
pub trait GenuineErrorClassifier: Send + Sync {
    /// `message` is the extracted error message, `content` the full
    /// serialized content of the result.
    fn is_genuine_error(&self, message: &str, content: &str) -> bool;
}

/// Recognizes build/compile failures in tool output.
#[derive(Debug, Default)]
pub struct BuildErrorClassifier;

/// Substrings that mark output as coming from a failed build.
const EXPLICIT_MARKERS: [&str; 3] = ["failed to build plugin", "build output:", "go build"];

/// Error keywords that only count together with build context.
const ERROR_KEYWORDS: [&str; 5] = [
    "syntax error",
    "undefined:",
    "cannot use",
    "wrong signature",
    "cannot find package",
];

/// Context words that, combined with an error keyword, indicate a build.
const CONTEXT_WORDS: [&str; 2] = ["compilation", "build"];

fn location_regex() -> Option<&'static Regex> {
    static LOCATION: OnceLock<Option<Regex>> = OnceLock::new();
    LOCATION
        .get_or_init(|| Regex::new(r"\.[a-z]+:\d+:\d+:").ok())
        .as_ref()
}

impl GenuineErrorClassifier for BuildErrorClassifier {
    fn is_genuine_error(&self, message: &str, content: &str) -> bool {
        let haystack = format!("{}\n{}", message.to_lowercase(), content.to_lowercase());

        if EXPLICIT_MARKERS.iter().any(|m| haystack.contains(m)) {
            return true;
        }

        let has_location = location_regex().is_some_and(|re| re.is_match(&haystack));
        if has_location {
            return true;
        }

        let has_keyword = ERROR_KEYWORDS.iter().any(|k| haystack.contains(k));
        let has_context = CONTEXT_WORDS.iter().any(|c| haystack.contains(c));
        has_keyword && (has_context || has_location)
    }
}

/// Calls an MCP tool on `server` with broken-pipe recovery, then normalizes
/// the result envelope to a string.
///
/// Recovery is single-shot: one fresh connection, one retry. If the
/// reconnect fails the original transport error is returned annotated with
/// the recovery failure; if the deadline elapsed during the first attempt
/// the retry is skipped and the original error surfaces.
pub async fn invoke_mcp(
    pool: &ConnectionPool,
    classifier: &dyn GenuineErrorClassifier,
    ctx: CallContext,
    server: &str,
    tool: &str,
    args: Value,
) -> Result<String, FabricError> {
    let client = pool.get_or_create(server).await.map_err(|e| {
        tracing::debug!(event = "connection_failed", server, tool, error = %e, "failed to get connection");
        e
    })?;

    let outcome = match client.call_tool(tool, args.clone()).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_broken_pipe() => {
            tracing::info!(event = "broken_pipe_detected", server, tool, error = %e, "transport pipe broke, attempting one reconnect");
            if ctx.expired() {
                tracing::info!(event = "broken_pipe_retry_skipped", server, tool, "deadline elapsed, not retrying");
                return Err(e.into());
            }
            let fresh = match pool.get_fresh(server).await {
                Ok(client) => client,
                Err(recovery) => {
                    return Err(FabricError::RecoveryFailed {
                        original: e,
                        recovery: Box::new(recovery),
                    });
                }
            };
            match fresh.call_tool(tool, args).await {
                Ok(outcome) => {
                    tracing::info!(event = "broken_pipe_recovered", server, tool, "retry on fresh connection succeeded");
                    outcome
                }
                Err(retry_err) => {
                    tracing::info!(event = "broken_pipe_retry_failed", server, tool, error = %retry_err, "retry on fresh connection failed");
                    return Err(retry_err.into());
                }
            }
        }
        Err(e) => return Err(e.into()),
    };

    normalize_outcome(classifier, server, tool, &outcome)
}

/// Applies envelope disambiguation and converts content to a string.
pub fn normalize_outcome(
    classifier: &dyn GenuineErrorClassifier,
    server: &str,
    tool: &str,
    outcome: &ToolOutcome,
) -> Result<String, FabricError> {
    if outcome.is_error {
        let message = extract_error_message(outcome);
        let full = serialize_content(outcome);
        if classifier.is_genuine_error(&message, &full) {
            return Err(FabricError::ToolExecutionFailed { message });
        }
        tracing::warn!(
            event = "spurious_error_flag",
            server,
            tool,
            "is_error=true without a recognizable failure, treating result as success"
        );
    }
    Ok(content_to_string(outcome))
}

/// Extracts an error message from an error-flagged result: the first text
/// part, else all parts serialized and joined, else a synthesized fallback.
fn extract_error_message(outcome: &ToolOutcome) -> String {
    for part in &outcome.content {
        if let ContentPart::Text { text } = part {
            if !text.is_empty() {
                return text.clone();
            }
        }
    }
    let serialized = serialize_content(outcome);
    if !serialized.is_empty() {
        return serialized;
    }
    format!(
        "tool returned error result (is_error=true) but no error message in content (parts: {})",
        outcome.content.len()
    )
}

/// Serializes every content part: text as-is, everything else as JSON.
fn serialize_content(outcome: &ToolOutcome) -> String {
    let mut parts = Vec::with_capacity(outcome.content.len());
    for part in &outcome.content {
        match part {
            ContentPart::Text { text } | ContentPart::Resource { text, .. } => {
                parts.push(text.clone());
            }
            ContentPart::Other(value) => parts.push(value.to_string()),
        }
    }
    parts.retain(|p| !p.is_empty());
    parts.join("\n")
}

/// Converts result content to the string handed back to the caller: text
/// parts joined with newlines, embedded resources unwrapped, non-text parts
/// dropped.
fn content_to_string(outcome: &ToolOutcome) -> String {
    let mut parts = Vec::with_capacity(outcome.content.len());
    for part in &outcome.content {
        match part {
            ContentPart::Text { text } | ContentPart::Resource { text, .. } => {
                if !text.is_empty() {
                    parts.push(text.clone());
                }
            }
            ContentPart::Other(_) => {}
        }
    }
    if !parts.is_empty() {
        return parts.join("\n");
    }
    if outcome.is_error {
        format!("Error: {}", extract_error_message(outcome))
    } else {
        "Tool execution completed (no output returned)".to_string()
    }
}
