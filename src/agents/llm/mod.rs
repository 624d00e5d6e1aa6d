//! LLM provider implementations with streaming support
//!
//! A unified interface over the hosted chat-completion APIs used by the
//! agents: OpenAI and Google Gemini.

mod gemini;
mod openai;
mod stream;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use stream::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::domain::{Message, ToolDefinition};
use crate::agents::error::{LlmError, LlmResult};

/// Trait for LLM providers
///
/// Providers are streaming-only; callers that need a single response
/// collect the stream via [`LlmStream::collect`].
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the default model
    fn model(&self) -> &str;

    /// Complete a request with streaming
    fn complete_stream(&self, request: CompletionRequest) -> LlmStream;
}

/// Request for LLM completion
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompletionRequest {
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Model to use (overrides provider default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Tools available for calling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
}

/// Response from LLM completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated message
    pub message: Message,
    /// Reason the completion stopped
    pub finish_reason: FinishReason,
}

/// Reason completion stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop
    Stop,
    /// Hit max tokens
    Length,
    /// Tool call requested
    ToolCalls,
    /// Content filtered
    ContentFilter,
}

/// Registry of configured providers, keyed by name
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// Register a provider under a name
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Look up a provider by name
    pub fn get(&self, name: &str) -> LlmResult<Arc<dyn LlmProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::ProviderNotFound(name.to_string()))
    }

    /// Names of all registered providers
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}
