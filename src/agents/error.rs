//! Error types for the agent system

use thiserror::Error;

/// Errors that can occur during agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent not found
    #[error("Agent not found: {0}")]
    NotFound(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Tool server unreachable; aborts the invocation
    #[error("Tool connection error: {0}")]
    ToolConnection(String),

    /// Execution error
    #[error("Execution error: {0}")]
    Execution(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors specific to LLM provider operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider not found
    #[error("LLM provider not found: {0}")]
    ProviderNotFound(String),

    /// API error
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Network(format!("Connection error: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

/// Result type alias for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
