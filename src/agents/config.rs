//! Agent and pipeline configuration types

use serde::{Deserialize, Serialize};

/// How much session history an agent sees when it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Prepend the full rendered session history
    #[default]
    Full,
    /// Run on the immediate input only
    None,
}

/// Configuration for a single agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// LLM provider name (e.g. "openai", "gemini")
    pub provider: String,
    /// Model identifier
    pub model: String,
    /// System instructions; may contain `{{placeholder}}` references that
    /// are interpolated from the run context
    pub instructions: String,
    /// Names of tools this agent may call
    #[serde(default)]
    pub tools: Vec<String>,
    /// How much session history this agent sees
    #[serde(default)]
    pub include_history: HistoryMode,
    /// Maximum model round-trips in the tool loop
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum output tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_max_iterations() -> u32 {
    10
}

impl AgentConfig {
    /// Create a minimal config with defaults
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            provider: provider.into(),
            model: model.into(),
            instructions: instructions.into(),
            tools: Vec::new(),
            include_history: HistoryMode::default(),
            max_iterations: default_max_iterations(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Attach tool names
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the history mode
    pub fn with_history(mut self, mode: HistoryMode) -> Self {
        self.include_history = mode;
        self
    }
}

/// One stage of a pipeline: an agent plus the context key its output is
/// written to before the next stage runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Name of the agent executing this stage
    pub agent: String,
    /// Run-context key the stage's output is stored under
    pub output_key: String,
    /// Message announced when the stage starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce: Option<String>,
}

impl StageConfig {
    /// Create a stage config
    pub fn new(agent: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            output_key: output_key.into(),
            announce: None,
        }
    }

    /// Set the announcement message
    pub fn with_announce(mut self, message: impl Into<String>) -> Self {
        self.announce = Some(message.into());
        self
    }
}

/// Configuration for a sequential pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Unique pipeline name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Ordered stages; each stage's output feeds the next stage's input
    pub stages: Vec<StageConfig>,
    /// Session used when the request names none
    pub default_session: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_mode_defaults_to_full() {
        let config: AgentConfig = serde_json::from_value(serde_json::json!({
            "name": "a",
            "provider": "openai",
            "model": "gpt-4o",
            "instructions": "be helpful"
        }))
        .unwrap();
        assert_eq!(config.include_history, HistoryMode::Full);
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn history_mode_none_deserializes() {
        let config: AgentConfig = serde_json::from_value(serde_json::json!({
            "name": "a",
            "provider": "openai",
            "model": "gpt-4o",
            "instructions": "be helpful",
            "include_history": "none"
        }))
        .unwrap();
        assert_eq!(config.include_history, HistoryMode::None);
    }
}
