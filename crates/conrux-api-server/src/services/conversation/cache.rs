use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info};

use super::types::{ConversationMessage, HistoryTurn, Role, SessionBuffer};

/// Memory settings fixed at startup
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub ttl: Duration,
    pub max_messages: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(3600),
            max_messages: 50,
        }
    }
}

/// Thread-safe registry of session buffers.
///
/// Expired sessions are swept on every `add_message`, under the same lock as
/// the write. Nothing is reclaimed while the store sees no writes unless a
/// caller runs `evict_expired` explicitly.
pub struct MemoryManager {
    sessions: Mutex<HashMap<String, SessionBuffer>>,
    config: MemoryConfig,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig) -> Self {
        info!(
            "Initializing conversation memory: ttl={}s, max_messages={}",
            config.ttl.num_seconds(),
            config.max_messages
        );
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> ConversationMessage {
        let mut sessions = self.sessions.lock();
        Self::sweep(&mut sessions);

        let buffer = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!("Creating conversation buffer for session {}", session_id);
            SessionBuffer::new(session_id, self.config.ttl, self.config.max_messages)
        });
        buffer.add_message(role, content)
    }

    /// `None` when the session was never created (or was evicted),
    /// `Some(vec![])` when it exists but holds no messages.
    pub fn get_history(&self, session_id: &str) -> Option<Vec<ConversationMessage>> {
        let mut sessions = self.sessions.lock();
        sessions.get_mut(session_id).map(SessionBuffer::history)
    }

    pub fn get_model_history(&self, session_id: &str, last_n: Option<usize>) -> Vec<HistoryTurn> {
        let mut sessions = self.sessions.lock();
        sessions
            .get_mut(session_id)
            .map(|buffer| buffer.model_history(last_n))
            .unwrap_or_default()
    }

    /// Drop a session's messages, keeping the (empty) buffer. No-op for unknown sessions.
    pub fn clear(&self, session_id: &str) {
        if let Some(buffer) = self.sessions.lock().get_mut(session_id) {
            buffer.clear();
            debug!("Cleared conversation buffer for session {}", session_id);
        }
    }

    pub fn delete_session(&self, session_id: &str) {
        if self.sessions.lock().remove(session_id).is_some() {
            debug!("Deleted conversation buffer for session {}", session_id);
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Explicit sweep, used by the optional background sweeper
    pub fn evict_expired(&self) -> usize {
        let mut sessions = self.sessions.lock();
        Self::sweep(&mut sessions)
    }

    // Caller holds the lock
    fn sweep(sessions: &mut HashMap<String, SessionBuffer>) -> usize {
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|session_id, buffer| {
            let expired = buffer.is_expired_at(now);
            if expired {
                debug!("Evicting expired session: {}", session_id);
            }
            !expired
        });
        before - sessions.len()
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}
