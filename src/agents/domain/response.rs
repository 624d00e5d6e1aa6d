//! Internal agent streaming types
//!
//! Agents emit `AgentChunk`s over an `AgentStream` while executing. The
//! pipeline runner consumes these and translates them into the public
//! `PipelineEvent` vocabulary.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::{ToolCall, ToolCallResult};
use crate::agents::error::AgentError;

/// Final response from one agent execution
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentResponse {
    /// Final text output
    pub output: String,
    /// Tool calls made during execution (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallResult>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// A chunk of streaming output from an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentChunk {
    /// Streamed text content
    Text { content: String },
    /// Tool call being initiated
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// Tool execution result
    ToolResult {
        tool_call_id: String,
        name: String,
        result: serde_json::Value,
        success: bool,
    },
    /// Final complete response
    Complete { response: AgentResponse },
    /// Error occurred
    Error { message: String },
}

impl AgentChunk {
    /// Create a text chunk
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Create a tool call chunk
    pub fn tool_call(tool_call: &ToolCall) -> Self {
        Self::ToolCall {
            id: tool_call.id.clone(),
            name: tool_call.name.clone(),
            arguments: tool_call.arguments.clone(),
        }
    }

    /// Create a tool result chunk
    pub fn tool_result(result: &ToolCallResult) -> Self {
        Self::ToolResult {
            tool_call_id: result.tool_call_id.clone(),
            name: result.tool_name.clone(),
            result: result.output.clone(),
            success: result.success,
        }
    }

    /// Create a complete chunk
    pub fn complete(response: AgentResponse) -> Self {
        Self::Complete { response }
    }

    /// Create an error chunk
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Streaming response from an agent
pub struct AgentStream {
    receiver: mpsc::Receiver<Result<AgentChunk, AgentError>>,
}

impl AgentStream {
    /// Create a channel pair for building an agent stream
    pub fn channel(buffer: usize) -> (AgentStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (AgentStreamSender { sender: tx }, Self { receiver: rx })
    }

    /// Drain the stream into a final response
    pub async fn collect(mut self) -> Result<AgentResponse, AgentError> {
        let mut final_response: Option<AgentResponse> = None;
        let mut tool_calls = Vec::new();

        while let Some(result) = self.receiver.recv().await {
            match result? {
                AgentChunk::ToolResult {
                    tool_call_id,
                    name,
                    result,
                    success,
                } => {
                    tool_calls.push(ToolCallResult {
                        tool_call_id,
                        tool_name: name,
                        output: result,
                        success,
                        error: None,
                    });
                }
                AgentChunk::Complete { response } => {
                    final_response = Some(response);
                }
                AgentChunk::Error { message } => {
                    return Err(AgentError::Execution(message));
                }
                _ => {}
            }
        }

        let mut response = final_response.unwrap_or_default();
        if response.tool_calls.is_empty() {
            response.tool_calls = tool_calls;
        }
        Ok(response)
    }
}

impl Stream for AgentStream {
    type Item = Result<AgentChunk, AgentError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half for building an agent stream
pub struct AgentStreamSender {
    sender: mpsc::Sender<Result<AgentChunk, AgentError>>,
}

impl AgentStreamSender {
    /// Send a chunk
    pub async fn send(
        &self,
        chunk: AgentChunk,
    ) -> Result<(), mpsc::error::SendError<Result<AgentChunk, AgentError>>> {
        self.sender.send(Ok(chunk)).await
    }

    /// Send an error
    pub async fn send_error(
        &self,
        error: AgentError,
    ) -> Result<(), mpsc::error::SendError<Result<AgentChunk, AgentError>>> {
        self.sender.send(Err(error)).await
    }
}
