//! Session store — in-memory survey state per chat.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::questionnaire::Session;

/// Owns every chat's [`Session`] for the lifetime of the process.
///
/// There is no delete: a chat that never started has no entry, and a
/// finished survey is written back in its idle form. The store itself
/// does not order writes per chat; [`crate::survey::SurveyBot`] serializes
/// all events of one chat before they reach it.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the chat's session, if it ever started.
    pub async fn get(&self, chat_id: &str) -> Option<Session> {
        self.sessions.read().await.get(chat_id).cloned()
    }

    /// Replace the chat's session.
    pub async fn set(&self, chat_id: &str, session: Session) {
        tracing::debug!(chat_id, step = %session.step, "Session stored");
        self.sessions
            .write()
            .await
            .insert(chat_id.to_string(), session);
    }

    /// Number of chats that have ever started the survey.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
