//! Process-wide registry lifecycle: init, merge from a second agent, and
//! dispatch across all three provider kinds.

use async_trait::async_trait;
use mcp_fabric::prelude::*;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Once};

struct EchoClient;

#[async_trait]
impl McpClient for EchoClient {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
        Ok(vec![ToolDescriptor {
            name: "read_email".to_string(),
            description: "read an email".to_string(),
            input_schema: json!({"type": "object"}),
        }])
    }

    async fn call_tool(&self, tool: &str, args: Value) -> Result<ToolOutcome, ClientError> {
        Ok(ToolOutcome::text(format!("mcp:{tool}:{args}")))
    }
}

struct EchoConnector;

#[async_trait]
impl ClientConnector for EchoConnector {
    async fn connect(
        &self,
        _server: &str,
        _config_path: Option<&Path>,
    ) -> Result<Arc<dyn McpClient>, ClientError> {
        Ok(Arc::new(EchoClient))
    }
}

fn setup() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        // First agent: connector, one custom tool, one virtual tool.
        ToolRegistry::init_or_merge(
            RegistryInit::builder()
                .connector(Arc::new(EchoConnector))
                .custom_tool(
                    "execute_command",
                    handler_fn(|args| async move { Ok(format!("shell:{args}")) }),
                )
                .virtual_tool(
                    "get_api_spec",
                    handler_fn(|_| async move { Ok("{}".to_string()) }),
                )
                .tool_mapping("read_email", "gmail")
                .build(),
        );
        // Second agent merges in its own provider.
        ToolRegistry::init_or_merge(
            RegistryInit::builder()
                .custom_tool(
                    "browser_action",
                    handler_fn(|args| async move { Ok(format!("browser:{args}")) }),
                )
                .tool_mapping("send_message", "slack")
                .build(),
        );
    });
}

#[tokio::test]
async fn merged_registry_serves_both_agents() {
    setup();
    let registry = ToolRegistry::get().unwrap();

    let shell = registry
        .call_custom(CallContext::default(), "execute_command", json!({"c": "ls"}))
        .await
        .unwrap();
    assert_eq!(shell, r#"shell:{"c":"ls"}"#);

    let browser = registry
        .call_custom(CallContext::default(), "browser_action", json!({}))
        .await
        .unwrap();
    assert_eq!(browser, "browser:{}");

    assert_eq!(registry.server_for_tool("read_email"), Some("gmail"));
    assert_eq!(registry.server_for_tool("send_message"), Some("slack"));
}

#[tokio::test]
async fn name_only_mcp_dispatch_connects_lazily() {
    setup();
    let registry = ToolRegistry::get().unwrap();
    let out = registry
        .call_mcp(CallContext::default(), "read_email", json!({"id": 7}))
        .await
        .unwrap();
    assert_eq!(out, r#"mcp:read_email:{"id":7}"#);
    assert!(registry.pool().contains("gmail"));
}

#[tokio::test]
async fn virtual_tools_answer_through_the_registry() {
    setup();
    let registry = ToolRegistry::get().unwrap();
    let out = registry
        .call_virtual(CallContext::default(), "get_api_spec", Value::Null)
        .await
        .unwrap();
    assert_eq!(out, "{}");
}

#[tokio::test]
async fn unified_invoke_covers_all_kinds() {
    setup();
    let registry = ToolRegistry::get().unwrap();

    let v = registry
        .invoke(CallContext::default(), "get_api_spec", Value::Null)
        .await
        .unwrap();
    assert_eq!(v, "{}");

    let c = registry
        .invoke(CallContext::default(), "browser_action", json!({}))
        .await
        .unwrap();
    assert_eq!(c, "browser:{}");

    let m = registry
        .invoke(CallContext::default(), "read_email", json!({}))
        .await
        .unwrap();
    assert_eq!(m, "mcp:read_email:{}");

    let missing = registry
        .invoke(CallContext::default(), "nope", Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(missing, FabricError::ToolNotFound { .. }));
}
