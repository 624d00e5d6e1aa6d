//! Core domain types for the agent system

mod context;
mod event;
mod message;
mod response;
mod tool_call;

pub use context::RunContext;
pub use event::{EventStream, PipelineEvent};
pub use message::{ConversationMessage, Message, Role, SessionState};
pub use response::{AgentChunk, AgentResponse, AgentStream, AgentStreamSender};
pub use tool_call::{ToolCall, ToolCallResult, ToolDefinition};

pub(crate) use message::epoch_millis;
