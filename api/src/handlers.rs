//! Request handlers for the execution surface.
//!
//! Two endpoint families share the same dispatch logic: batch endpoints
//! carry the tool identity in the body, per-tool endpoints carry it in the
//! path. Business failures come back as `{success:false}` envelopes with
//! HTTP 200; only protocol problems (auth, malformed bodies) use 4xx.

use axum::extract::rejection::JsonRejection;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mcp_fabric::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Per-call execution deadline.
pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Body of `POST /api/mcp/execute`.
#[derive(Debug, Deserialize)]
pub struct McpExecuteRequest {
    /// Target server (wire or sanitized spelling).
    pub server: String,
    /// Tool name.
    pub tool: String,
    /// Arguments forwarded opaquely.
    #[serde(default)]
    pub args: Value,
}

/// Body of `POST /api/custom/execute` and `POST /api/virtual/execute`.
#[derive(Debug, Deserialize)]
pub struct ToolExecuteRequest {
    /// Tool name.
    pub tool: String,
    /// Arguments forwarded opaquely.
    #[serde(default)]
    pub args: Value,
}

/// The uniform response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Whether the call succeeded.
    pub success: bool,
    /// Tool output on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Failure message on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteResponse {
    /// A success envelope.
    #[must_use]
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
        }
    }

    /// A failure envelope.
    #[must_use]
    pub fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// `POST /api/mcp/execute`.
pub async fn execute_mcp(
    payload: Result<Json<McpExecuteRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(&rejection),
    };
    Json(run_mcp(&req.server, &req.tool, req.args).await).into_response()
}

/// `POST /api/custom/execute`.
pub async fn execute_custom(
    payload: Result<Json<ToolExecuteRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(&rejection),
    };
    Json(run_local(LocalKind::Custom, &req.tool, req.args).await).into_response()
}

/// `POST /api/virtual/execute`.
pub async fn execute_virtual(
    payload: Result<Json<ToolExecuteRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(&rejection),
    };
    Json(run_local(LocalKind::Virtual, &req.tool, req.args).await).into_response()
}

/// `POST /tools/mcp/{server}/{tool}`; body is the args object itself.
pub async fn tool_mcp(
    Path((server, tool)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let args = match extract_args(payload) {
        Ok(args) => args,
        Err(response) => return response,
    };
    Json(run_mcp(&server, &tool, args).await).into_response()
}

/// `POST /tools/custom/{tool}`.
pub async fn tool_custom(
    Path(tool): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let args = match extract_args(payload) {
        Ok(args) => args,
        Err(response) => return response,
    };
    Json(run_local(LocalKind::Custom, &tool, args).await).into_response()
}

/// `POST /tools/virtual/{tool}`.
pub async fn tool_virtual(
    Path(tool): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let args = match extract_args(payload) {
        Ok(args) => args,
        Err(response) => return response,
    };
    Json(run_local(LocalKind::Virtual, &tool, args).await).into_response()
}

#[derive(Clone, Copy)]
enum LocalKind {
    Custom,
    Virtual,
}

/// Pulls the args object out of a per-tool body, stripping the optional
/// `session_id` the caller may have tucked in.
fn extract_args(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, Response> {
    let Json(mut args) = payload.map_err(|rejection| bad_request(&rejection))?;
    if args.is_null() {
        args = Value::Object(serde_json::Map::new());
    }
    let Some(object) = args.as_object_mut() else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ExecuteResponse::failure("request body must be a JSON object")),
        )
            .into_response());
    };
    if let Some(session_id) = object.remove("session_id") {
        tracing::debug!(event = "session_id_stripped", session_id = %session_id, "removed session_id from tool args");
    }
    Ok(args)
}

fn bad_request(rejection: &JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ExecuteResponse::failure(format!(
            "malformed request body: {rejection}"
        ))),
    )
        .into_response()
}

/// Dispatches an MCP call with the per-call deadline and the sanitized-name
/// fallback: a connect failure for a server spelled with `_` is retried
/// exactly once with the hyphenated form.
async fn run_mcp(server: &str, tool: &str, args: Value) -> ExecuteResponse {
    let registry = match ToolRegistry::get() {
        Ok(r) => r,
        Err(e) => return ExecuteResponse::failure(e),
    };
    let ctx = CallContext::with_timeout(EXECUTION_TIMEOUT);

    let call = async {
        match registry.call_mcp_on(ctx, server, tool, args.clone()).await {
            Err(e) if e.is_connect_failure() && server.contains('_') => {
                let desanitized = desanitize_server(server);
                tracing::info!(
                    event = "server_name_retry",
                    server,
                    retry = %desanitized,
                    "connect failed for sanitized name, retrying with wire form"
                );
                registry.call_mcp_on(ctx, &desanitized, tool, args).await
            }
            other => other,
        }
    };

    finish(ctx, call).await
}

async fn run_local(kind: LocalKind, tool: &str, args: Value) -> ExecuteResponse {
    let registry = match ToolRegistry::get() {
        Ok(r) => r,
        Err(e) => return ExecuteResponse::failure(e),
    };
    let ctx = CallContext::with_timeout(EXECUTION_TIMEOUT);
    let call = async {
        match kind {
            LocalKind::Custom => registry.call_custom(ctx, tool, args).await,
            LocalKind::Virtual => registry.call_virtual(ctx, tool, args).await,
        }
    };
    finish(ctx, call).await
}

/// Enforces the context's deadline around a dispatch future. The timer is
/// derived from the same [`CallContext`] the router consults for its retry
/// decision, so there is exactly one deadline per call.
async fn finish(
    ctx: CallContext,
    call: impl std::future::Future<Output = Result<String, FabricError>>,
) -> ExecuteResponse {
    let result = match ctx.remaining() {
        Some(remaining) => match tokio::time::timeout(remaining, call).await {
            Ok(result) => result,
            Err(_) => Err(FabricError::DeadlineExceeded),
        },
        None => call.await,
    };
    match result {
        Ok(result) => ExecuteResponse::success(result),
        Err(e) => ExecuteResponse::failure(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serialization_omits_absent_fields() {
        let ok = serde_json::to_value(ExecuteResponse::success("out")).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "result": "out"}));

        let err = serde_json::to_value(ExecuteResponse::failure("boom")).unwrap();
        assert_eq!(err, serde_json::json!({"success": false, "error": "boom"}));
    }

    #[tokio::test]
    async fn elapsed_deadline_surfaces_the_fabric_error() {
        let ctx = CallContext::with_timeout(Duration::ZERO);
        let response = finish(ctx, std::future::pending::<Result<String, FabricError>>()).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("deadline exceeded"));
    }

    #[tokio::test]
    async fn no_deadline_runs_to_completion() {
        let ctx = CallContext::default();
        let response = finish(ctx, async { Ok("done".to_string()) }).await;
        assert!(response.success);
        assert_eq!(response.result.as_deref(), Some("done"));
    }
}
