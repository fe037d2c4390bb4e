use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::{ChatTurn, Role};

/// How many recent turns feed back into the prompt for a session.
const MAX_HISTORY_TURNS: usize = 20;

/// In-process conversation state for the standalone server. Each session id
/// owns its own turn list; nothing is shared across sessions and nothing is
/// persisted.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Vec<ChatTurn>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recent turns for a session, oldest first. Unknown
    /// session ids read as an empty history.
    pub fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        let Ok(guard) = self.sessions.lock() else {
            return Vec::new();
        };
        guard
            .get(session_id)
            .map(|turns| {
                let start = turns.len().saturating_sub(MAX_HISTORY_TURNS);
                turns[start..].to_vec()
            })
            .unwrap_or_default()
    }

    pub fn append_exchange(&self, session_id: &str, question: &str, answer: &str) {
        let Ok(mut guard) = self.sessions.lock() else {
            return;
        };
        let turns = guard.entry(session_id.to_string()).or_default();
        turns.push(ChatTurn {
            role: Role::User,
            content: question.to_string(),
        });
        turns.push(ChatTurn {
            role: Role::Assistant,
            content: answer.to_string(),
        });
    }
}
