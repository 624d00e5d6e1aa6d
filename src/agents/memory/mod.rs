//! Session storage for conversation history
//!
//! Pipelines read and write history through the `SessionStore` trait so the
//! backend can be swapped without touching orchestration code. The default
//! backend keeps everything in process memory and is lost on restart.

mod in_memory;

pub use in_memory::InMemoryStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::agents::domain::{ConversationMessage, SessionState};
use crate::agents::error::AgentResult;
use crate::config::MemorySettings;

/// Trait for session storage backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session by ID
    async fn get(&self, session_id: &str) -> AgentResult<Option<SessionState>>;

    /// Get an existing session or create an empty one
    ///
    /// Idempotent: calling twice with the same ID returns the same session.
    async fn create_if_absent(&self, session_id: &str) -> AgentResult<SessionState>;

    /// Append a message to an existing session
    ///
    /// Fails with `SessionNotFound` if the session has not been created.
    async fn append(&self, session_id: &str, message: ConversationMessage) -> AgentResult<()>;

    /// Render a session's history as `"role: content"` lines
    ///
    /// An unknown or empty session renders as an empty string.
    async fn render_context(&self, session_id: &str) -> AgentResult<String>;

    /// Remove one session
    async fn clear(&self, session_id: &str) -> AgentResult<()>;

    /// Remove every session
    async fn clear_all(&self) -> AgentResult<()>;
}

/// Create a session store from configuration
pub fn create_store(config: &MemorySettings) -> Arc<dyn SessionStore> {
    Arc::new(InMemoryStore::new(config.max_messages))
}
