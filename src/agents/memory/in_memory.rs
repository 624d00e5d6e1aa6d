//! In-memory session store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::SessionStore;
use crate::agents::domain::{epoch_millis, ConversationMessage, SessionState};
use crate::agents::error::{AgentError, AgentResult};

/// In-memory session store
///
/// Each session keeps at most `max_messages_per_session` entries; appending
/// beyond the bound evicts the oldest message first.
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<String, SessionState>>>,
    max_messages_per_session: usize,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new(max_messages_per_session: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_messages_per_session,
        }
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get(&self, session_id: &str) -> AgentResult<Option<SessionState>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn create_if_absent(&self, session_id: &str) -> AgentResult<SessionState> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(session_id.to_string()));
        Ok(session.clone())
    }

    async fn append(&self, session_id: &str, message: ConversationMessage) -> AgentResult<()> {
        let mut sessions = self.sessions.write().await;

        let Some(session) = sessions.get_mut(session_id) else {
            return Err(AgentError::SessionNotFound(session_id.to_string()));
        };

        session.messages.push(message);
        session.updated_at = epoch_millis();

        if session.messages.len() > self.max_messages_per_session {
            let remove_count = session.messages.len() - self.max_messages_per_session;
            session.messages.drain(0..remove_count);
        }

        Ok(())
    }

    async fn render_context(&self, session_id: &str) -> AgentResult<String> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(SessionState::render_context)
            .unwrap_or_default())
    }

    async fn clear(&self, session_id: &str) -> AgentResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }

    async fn clear_all(&self) -> AgentResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::domain::Role;

    #[tokio::test]
    async fn create_if_absent_is_idempotent() {
        let store = InMemoryStore::new(50);
        let first = store.create_if_absent("s1").await.unwrap();
        store
            .append("s1", ConversationMessage::new(Role::User, "hi"))
            .await
            .unwrap();
        let second = store.create_if_absent("s1").await.unwrap();
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(second.message_count(), 1);
    }

    #[tokio::test]
    async fn append_to_missing_session_fails() {
        let store = InMemoryStore::new(50);
        let err = store
            .append("nope", ConversationMessage::new(Role::User, "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_bound() {
        let store = InMemoryStore::new(3);
        store.create_if_absent("s1").await.unwrap();
        for i in 0..5 {
            store
                .append("s1", ConversationMessage::new(Role::User, format!("m{}", i)))
                .await
                .unwrap();
        }
        let session = store.get("s1").await.unwrap().unwrap();
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.messages[0].content, "m2");
        assert_eq!(session.messages[2].content, "m4");
    }

    #[tokio::test]
    async fn render_context_preserves_order_and_roles() {
        let store = InMemoryStore::new(50);
        store.create_if_absent("s1").await.unwrap();
        store
            .append("s1", ConversationMessage::new(Role::User, "what is EURUSD"))
            .await
            .unwrap();
        store
            .append("s1", ConversationMessage::new(Role::Assistant, "a pair"))
            .await
            .unwrap();
        let rendered = store.render_context("s1").await.unwrap();
        assert_eq!(rendered, "user: what is EURUSD\nassistant: a pair");
    }

    #[tokio::test]
    async fn render_context_for_unknown_session_is_empty() {
        let store = InMemoryStore::new(50);
        assert_eq!(store.render_context("ghost").await.unwrap(), "");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemoryStore::new(50);
        store.create_if_absent("a").await.unwrap();
        store.create_if_absent("b").await.unwrap();
        store
            .append("a", ConversationMessage::new(Role::User, "only in a"))
            .await
            .unwrap();
        assert_eq!(store.get("b").await.unwrap().unwrap().message_count(), 0);
        store.clear("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_some());
    }
}
