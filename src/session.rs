//! Conversation history for display.
//!
//! Sessions belong to the presentation layer only. The query pipeline never
//! sees them: every question is answered on its own.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Sessions kept by [`SessionStore::new`] before the oldest is dropped.
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// The turns of one conversation, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatSession {
    pub turns: Vec<ConversationTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a question and the response shown for it.
    pub fn record(&mut self, question: &str, response: &str) {
        self.turns.push(ConversationTurn {
            role: Role::User,
            content: question.to_string(),
        });
        self.turns.push(ConversationTurn {
            role: Role::Assistant,
            content: response.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Sessions keyed by id, shared across HTTP handlers.
///
/// Holds at most `max_sessions`; creating one more evicts the session that
/// was created first.
#[derive(Debug)]
pub struct SessionStore {
    inner: RwLock<Sessions>,
    max_sessions: usize,
}

#[derive(Debug, Default)]
struct Sessions {
    by_id: HashMap<String, ChatSession>,
    /// Ids in creation order, oldest first.
    order: VecDeque<String>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_max_sessions(DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self {
            inner: RwLock::new(Sessions::default()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Record a turn pair under `id`, or under a fresh id when `id` is
    /// `None`. Returns the id used.
    pub async fn record(&self, id: Option<String>, question: &str, response: &str) -> String {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut inner = self.inner.write().await;

        if !inner.by_id.contains_key(&id) {
            while inner.order.len() >= self.max_sessions {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                inner.by_id.remove(&oldest);
            }
            inner.order.push_back(id.clone());
        }
        inner
            .by_id
            .entry(id.clone())
            .or_default()
            .record(question, response);
        id
    }

    pub async fn get(&self, id: &str) -> Option<ChatSession> {
        self.inner.read().await.by_id.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }
}
