//! Tool routing
//!
//! Agents call tools through one `ToolPort`. Behind it sit three kinds of
//! callable: in-process function tools, other agents wrapped as tools, and
//! remote MCP tools routed by name prefix.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::adapters::mcp_client::McpClientManager;
use crate::agents::core::{Agent, AgentInvocation};
use crate::agents::error::AgentError;
use crate::domain::{Tool, ToolError, ToolPort};

/// An in-process tool callable by agents
#[async_trait]
pub trait FunctionTool: Send + Sync {
    /// Name, description and input schema
    fn definition(&self) -> Tool;

    /// Run the tool
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Another agent exposed as a tool
///
/// The wrapped agent runs to completion on the provided input; its final
/// text becomes the tool result.
pub struct AgentTool {
    name: String,
    description: String,
    agent: Arc<dyn Agent>,
}

impl AgentTool {
    /// Wrap an agent as a tool
    pub fn new(name: impl Into<String>, description: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            agent,
        }
    }

    fn definition(&self) -> Tool {
        Tool {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "The task or question for the agent"
                    }
                },
                "required": ["input"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let input = args
            .get("input")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let stream = self.agent.execute(AgentInvocation::new(input));
        match stream.collect().await {
            Ok(response) => Ok(Value::String(response.output)),
            Err(AgentError::ToolConnection(msg)) => Err(ToolError::Connection(msg)),
            Err(e) => Err(ToolError::Execution(e.to_string())),
        }
    }
}

/// One registered tool
pub enum ToolBinding {
    /// In-process function
    Function(Arc<dyn FunctionTool>),
    /// Agent callable as a tool
    Agent(AgentTool),
}

impl ToolBinding {
    /// The binding's advertised definition
    pub fn definition(&self) -> Tool {
        match self {
            ToolBinding::Function(tool) => tool.definition(),
            ToolBinding::Agent(tool) => tool.definition(),
        }
    }

    /// Invoke the binding
    pub async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        match self {
            ToolBinding::Function(tool) => tool.execute(args).await,
            ToolBinding::Agent(tool) => tool.invoke(args).await,
        }
    }
}

/// Routes tool calls to bindings or MCP servers
pub struct ToolRouter {
    bindings: HashMap<String, ToolBinding>,
    mcp: Arc<McpClientManager>,
}

impl ToolRouter {
    /// Create a router over local bindings and MCP servers
    pub fn new(mcp: Arc<McpClientManager>) -> Self {
        Self {
            bindings: HashMap::new(),
            mcp,
        }
    }

    /// Register a binding under its definition name
    pub fn register(&mut self, binding: ToolBinding) {
        self.bindings.insert(binding.definition().name, binding);
    }
}

#[async_trait]
impl ToolPort for ToolRouter {
    async fn execute_tool(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        debug!(tool = %name, "Executing tool");

        if McpClientManager::is_mcp_tool(name) {
            return self.mcp.call_tool(name, args).await;
        }

        match self.bindings.get(name) {
            Some(binding) => binding.invoke(args).await,
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        let mut tools: Vec<Tool> = self.bindings.values().map(ToolBinding::definition).collect();
        tools.extend(self.mcp.list_all_tools().await);
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl FunctionTool for EchoTool {
        fn definition(&self) -> Tool {
            Tool {
                name: "echo".to_string(),
                description: "Echoes its input".to_string(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn execute(&self, args: Value) -> Result<Value, ToolError> {
            Ok(args)
        }
    }

    fn router() -> ToolRouter {
        let mut router = ToolRouter::new(Arc::new(McpClientManager::new(&[])));
        router.register(ToolBinding::Function(Arc::new(EchoTool)));
        router
    }

    #[tokio::test]
    async fn routes_to_registered_function() {
        let result = router()
            .execute_tool("echo", json!({"pair": "EURUSD"}))
            .await
            .unwrap();
        assert_eq!(result["pair"], "EURUSD");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let err = router().execute_tool("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn lists_registered_tools() {
        let tools = router().list_tools().await.unwrap();
        assert!(tools.iter().any(|t| t.name == "echo"));
    }
}
