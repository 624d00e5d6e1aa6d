//! Agent execution core

mod simple;

pub use simple::SimpleAgent;

use crate::agents::config::AgentConfig;
use crate::agents::domain::{AgentStream, Message, RunContext};

/// One request to an agent: the immediate input plus everything the
/// pipeline has accumulated so far
#[derive(Debug, Clone, Default)]
pub struct AgentInvocation {
    /// The immediate input text
    pub prompt: String,
    /// Prior conversation turns the agent should see
    pub history: Vec<Message>,
    /// Values produced by earlier stages, available to instruction templates
    pub context: RunContext,
}

impl AgentInvocation {
    /// Create an invocation with a prompt only
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            history: Vec::new(),
            context: RunContext::new(),
        }
    }

    /// Attach history
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Attach a run context
    pub fn with_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }
}

/// Trait for executable agents
pub trait Agent: Send + Sync {
    /// Get the agent's configuration
    fn config(&self) -> &AgentConfig;

    /// Execute the agent, streaming chunks as they are produced
    fn execute(&self, invocation: AgentInvocation) -> AgentStream;
}

/// Reduce per-iteration outputs to the final text: the last non-empty
/// candidate wins, or the empty string when every candidate is empty
pub fn last_non_empty(candidates: &[String]) -> String {
    candidates
        .iter()
        .rev()
        .find(|c| !c.trim().is_empty())
        .cloned()
        .unwrap_or_default()
}
