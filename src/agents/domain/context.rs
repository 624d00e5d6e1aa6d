//! Per-run key/value context threaded through pipeline stages
//!
//! Stages communicate forward only: each stage's output is written under a
//! stage-specific key before the next stage starts, and instruction
//! templates interpolate these values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Mutable context shared across the stages of one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunContext {
    values: HashMap<String, Value>,
}

impl RunContext {
    /// Create an empty run context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value under `key`, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Set a string value under `key`
    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), Value::String(value.into()));
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a value as a string slice, if it is one
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Whether the context holds no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
