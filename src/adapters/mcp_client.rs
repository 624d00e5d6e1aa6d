//! MCP client adapter
//!
//! Connects to external MCP tool servers over a stdio subprocess transport
//! (line-delimited JSON-RPC) and routes tool calls to them. The browser
//! automation server is reached this way: the manager spawns the configured
//! command, performs the `initialize` handshake, and keeps the process alive
//! until shutdown.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::config::McpServerSettings;
use crate::domain::{Tool, ToolError};

/// Prefix for MCP tools when exposed to agents
pub const MCP_TOOL_PREFIX: &str = "mcp__";

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    // Notifications from the server carry no id and are ignored
    id: Option<u64>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Tool information from an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ListToolsResult {
    tools: Vec<McpTool>,
}

#[derive(Debug, Deserialize)]
struct CallToolResult {
    content: Vec<ContentItem>,
    #[serde(rename = "isError")]
    is_error: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

/// Connection lifecycle of an MCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpServerState {
    Uninitialized,
    Connecting,
    Ready,
    Closed,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Live connection to a spawned server process
struct McpConnection {
    child: Child,
    stdin: ChildStdin,
    pending: PendingMap,
    tools: Vec<McpTool>,
    request_id: u64,
}

impl McpConnection {
    fn next_id(&mut self) -> u64 {
        self.request_id += 1;
        self.request_id
    }

    async fn send_request(
        &mut self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ToolError> {
        let id = self.next_id();
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.to_string(),
            params,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let mut line = serde_json::to_string(&request)
            .map_err(|e| ToolError::Execution(format!("Failed to encode request: {}", e)))?;
        line.push('\n');

        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ToolError::Connection(format!("Failed to write to server: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| ToolError::Connection(format!("Failed to flush to server: {}", e)))?;

        let response = tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| ToolError::Connection(format!("Timed out waiting for {}", method)))?
            .map_err(|_| ToolError::Connection("Server closed the connection".to_string()))?;

        if let Some(error) = response.error {
            return Err(ToolError::Execution(format!(
                "[{}] {}",
                error.code, error.message
            )));
        }

        response
            .result
            .ok_or_else(|| ToolError::Execution("No result in response".to_string()))
    }

    async fn send_notification(&mut self, method: &str) -> Result<(), ToolError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method: method.to_string(),
            params: None,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| ToolError::Execution(format!("Failed to encode notification: {}", e)))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ToolError::Connection(format!("Failed to write to server: {}", e)))?;
        Ok(())
    }
}

enum ServerSlot {
    Uninitialized,
    Ready(McpConnection),
    Closed,
}

/// One configured MCP server and its connection lifecycle
///
/// `connect` and `close` are both idempotent: connecting twice reuses the
/// live process, closing before connecting (or twice) is a no-op.
pub struct McpServer {
    config: McpServerSettings,
    slot: Mutex<ServerSlot>,
    state: std::sync::Mutex<McpServerState>,
}

impl McpServer {
    /// Create an unconnected server from configuration
    pub fn new(config: McpServerSettings) -> Self {
        Self {
            config,
            slot: Mutex::new(ServerSlot::Uninitialized),
            state: std::sync::Mutex::new(McpServerState::Uninitialized),
        }
    }

    /// Server name from configuration
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> McpServerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: McpServerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    /// Spawn the server process and perform the initialize handshake
    ///
    /// On failure the server stays `Uninitialized` so a later call can retry.
    pub async fn connect(&self) -> Result<(), ToolError> {
        let mut slot = self.slot.lock().await;

        match *slot {
            ServerSlot::Ready(_) => return Ok(()),
            ServerSlot::Closed => {
                return Err(ToolError::Connection(format!(
                    "MCP server '{}' is closed",
                    self.config.name
                )))
            }
            ServerSlot::Uninitialized => {}
        }

        self.set_state(McpServerState::Connecting);
        info!(server = %self.config.name, command = %self.config.command, "Connecting to MCP server");

        let result = self.spawn_and_initialize().await;
        match result {
            Ok(connection) => {
                info!(
                    server = %self.config.name,
                    tools = connection.tools.len(),
                    "MCP server ready"
                );
                *slot = ServerSlot::Ready(connection);
                self.set_state(McpServerState::Ready);
                Ok(())
            }
            Err(e) => {
                self.set_state(McpServerState::Uninitialized);
                Err(e)
            }
        }
    }

    async fn spawn_and_initialize(&self) -> Result<McpConnection, ToolError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &self.config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| {
            ToolError::Connection(format!(
                "Failed to spawn '{}': {}",
                self.config.command, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolError::Connection("Failed to open server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Connection("Failed to open server stdout".to_string()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        let server_name = self.config.name.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonRpcResponse>(&line) {
                    Ok(response) => {
                        if let Some(id) = response.id {
                            if let Some(tx) = reader_pending.lock().await.remove(&id) {
                                let _ = tx.send(response);
                            }
                        }
                    }
                    Err(e) => {
                        debug!(server = %server_name, "Ignoring unparseable line: {}", e);
                    }
                }
            }
            debug!(server = %server_name, "MCP server stdout closed");
        });

        let mut connection = McpConnection {
            child,
            stdin,
            pending,
            tools: Vec::new(),
            request_id: 0,
        };

        let init_params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        connection
            .send_request("initialize", Some(init_params), self.timeout())
            .await?;
        connection
            .send_notification("notifications/initialized")
            .await?;

        let result = connection
            .send_request("tools/list", None, self.timeout())
            .await?;
        let list_result: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| ToolError::Execution(format!("Invalid tools/list result: {}", e)))?;
        for tool in &list_result.tools {
            debug!(server = %self.config.name, tool = %tool.name, "Discovered tool");
        }
        connection.tools = list_result.tools;

        Ok(connection)
    }

    /// Tools advertised by this server, prefixed for agent use
    pub async fn tools(&self) -> Vec<Tool> {
        let slot = self.slot.lock().await;
        let ServerSlot::Ready(connection) = &*slot else {
            return Vec::new();
        };

        connection
            .tools
            .iter()
            .map(|t| Tool {
                name: format!("{}{}_{}", MCP_TOOL_PREFIX, self.config.name, t.name),
                description: t
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("MCP tool from {}", self.config.name)),
                input_schema: t
                    .input_schema
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object"})),
            })
            .collect()
    }

    /// Call a tool by its unprefixed name
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value, ToolError> {
        let mut slot = self.slot.lock().await;
        let ServerSlot::Ready(connection) = &mut *slot else {
            return Err(ToolError::Connection(format!(
                "MCP server '{}' is not connected",
                self.config.name
            )));
        };

        let params = json!({
            "name": tool_name,
            "arguments": arguments
        });

        let timeout = self.timeout();
        let result = connection
            .send_request("tools/call", Some(params), timeout)
            .await?;
        let call_result: CallToolResult = serde_json::from_value(result)
            .map_err(|e| ToolError::Execution(format!("Invalid tools/call result: {}", e)))?;

        let mut output = String::new();
        for item in call_result.content {
            if item.content_type == "text" {
                if let Some(text) = item.text {
                    if !output.is_empty() {
                        output.push('\n');
                    }
                    output.push_str(&text);
                }
            }
        }

        if call_result.is_error.unwrap_or(false) {
            return Err(ToolError::Execution(if output.is_empty() {
                format!("Tool '{}' reported an error", tool_name)
            } else {
                output
            }));
        }

        // Tool output is text that is often JSON; pass structure through
        // when it parses
        if let Ok(json_value) = serde_json::from_str::<Value>(&output) {
            Ok(json_value)
        } else {
            Ok(Value::String(output))
        }
    }

    /// Terminate the server process
    ///
    /// Errors from the transport are logged, never propagated: shutdown must
    /// not be blocked by cleanup failure.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;

        match std::mem::replace(&mut *slot, ServerSlot::Closed) {
            ServerSlot::Ready(mut connection) => {
                if let Err(e) = connection.child.kill().await {
                    warn!(server = %self.config.name, "Failed to kill MCP server process: {}", e);
                }
                info!(server = %self.config.name, "MCP server closed");
            }
            ServerSlot::Uninitialized | ServerSlot::Closed => {
                // close before connect, or a second close: nothing to do
            }
        }
        self.set_state(McpServerState::Closed);
    }
}

/// Manager for all configured MCP servers
pub struct McpClientManager {
    servers: HashMap<String, Arc<McpServer>>,
}

impl McpClientManager {
    /// Create a manager from server configurations
    pub fn new(configs: &[McpServerSettings]) -> Self {
        let servers = configs
            .iter()
            .filter(|c| c.enabled)
            .map(|c| (c.name.clone(), Arc::new(McpServer::new(c.clone()))))
            .collect();
        Self { servers }
    }

    /// Connect every configured server
    ///
    /// A server that fails to connect is logged and skipped; its tools are
    /// simply unavailable until a retry.
    pub async fn connect_all(&self) {
        for server in self.servers.values() {
            if let Err(e) = server.connect().await {
                warn!(server = %server.name(), "Failed to connect MCP server: {}", e);
            }
        }
    }

    /// Close every server, logging failures
    pub async fn close_all(&self) {
        for server in self.servers.values() {
            server.close().await;
        }
    }

    /// All tools across connected servers, with prefixed names
    pub async fn list_all_tools(&self) -> Vec<Tool> {
        let mut all_tools = Vec::new();
        for server in self.servers.values() {
            all_tools.extend(server.tools().await);
        }
        all_tools
    }

    /// Call a tool by its prefixed name (`mcp__{server}_{tool}`)
    pub async fn call_tool(&self, prefixed_name: &str, arguments: Value) -> Result<Value, ToolError> {
        let name_without_prefix = prefixed_name
            .strip_prefix(MCP_TOOL_PREFIX)
            .ok_or_else(|| ToolError::NotFound(prefixed_name.to_string()))?;

        let (server_name, tool_name) = name_without_prefix
            .split_once('_')
            .ok_or_else(|| ToolError::NotFound(prefixed_name.to_string()))?;

        let server = self
            .servers
            .get(server_name)
            .ok_or_else(|| ToolError::Connection(format!("MCP server not found: {}", server_name)))?;

        server.call_tool(tool_name, arguments).await
    }

    /// Check if a tool name belongs to an MCP server
    pub fn is_mcp_tool(name: &str) -> bool {
        name.starts_with(MCP_TOOL_PREFIX)
    }

    /// Names of configured servers
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(name: &str) -> McpServerSettings {
        McpServerSettings {
            name: name.to_string(),
            command: "definitely-not-a-real-command".to_string(),
            args: vec![],
            env: HashMap::new(),
            enabled: true,
            timeout_seconds: 1,
        }
    }

    #[tokio::test]
    async fn close_before_connect_is_a_noop() {
        let server = McpServer::new(settings("playwright"));
        server.close().await;
        server.close().await;
        assert_eq!(server.state(), McpServerState::Closed);
    }

    #[tokio::test]
    async fn failed_connect_leaves_server_uninitialized() {
        let server = McpServer::new(settings("playwright"));
        let err = server.connect().await.unwrap_err();
        assert!(matches!(err, ToolError::Connection(_)));
        assert_eq!(server.state(), McpServerState::Uninitialized);
    }

    #[tokio::test]
    async fn calling_unconnected_server_is_a_connection_error() {
        let server = McpServer::new(settings("playwright"));
        let err = server
            .call_tool("browser_navigate", json!({"url": "https://example.com"}))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn manager_routes_prefixed_names() {
        let manager = McpClientManager::new(&[settings("playwright")]);
        let err = manager
            .call_tool("mcp__playwright_browser_snapshot", json!({}))
            .await
            .unwrap_err();
        // Routed to the right server, which is not connected
        assert!(matches!(err, ToolError::Connection(_)));

        let err = manager.call_tool("not_prefixed", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn recognizes_mcp_tool_names() {
        assert!(McpClientManager::is_mcp_tool("mcp__playwright_browser_click"));
        assert!(!McpClientManager::is_mcp_tool("save_daily_plan"));
    }
}
