//! Ports shared between agents and tool adapters

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A tool exposed to agents
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Errors surfaced by tool execution
///
/// The distinction matters to the tool loop: `Connection` aborts the running
/// stage, while `NotFound` and `Execution` are fed back to the model as a
/// failure payload so it can react.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool registered under this name
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The tool's backing server is unreachable or not connected
    #[error("tool connection error: {0}")]
    Connection(String),

    /// The tool ran but its underlying action failed
    #[error("tool execution error: {0}")]
    Execution(String),
}

impl ToolError {
    /// Whether this failure must abort the running stage
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::Connection(_))
    }
}

/// Port for executing tools by name
#[async_trait]
pub trait ToolPort: Send + Sync {
    async fn execute_tool(&self, name: &str, args: Value) -> Result<Value, ToolError>;
    async fn list_tools(&self) -> Result<Vec<Tool>, ToolError>;
}
