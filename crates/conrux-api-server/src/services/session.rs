use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Session lifecycle metadata, independent of stored message content
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub message_count: u64,
    pub ttl: Duration,
}

impl Session {
    pub fn new(session_id: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            last_active: now,
            message_count: 0,
            ttl,
        }
    }

    /// One completed turn
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
        self.message_count += 1;
    }

    pub fn reset(&mut self) {
        self.message_count = 0;
        self.touch();
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.last_active > self.ttl
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let remaining = self.ttl - (now - self.last_active);
        SessionSnapshot {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            last_active: self.last_active,
            message_count: self.message_count,
            ttl_remaining: remaining.num_seconds().max(0) as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub message_count: u64,
    pub ttl_remaining: u64,
}

/// Thread-safe session lifecycle registry.
///
/// Keyed by the same ids as `MemoryManager` but kept as a separate store:
/// eviction here only runs through `evict_expired`.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Register a session, replacing any existing record with the same id
    pub fn create_session(&self, session_id: Option<String>) -> String {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.sessions
            .lock()
            .insert(session_id.clone(), Session::new(session_id.clone(), self.ttl));

        info!("Session created: {}", session_id);
        session_id
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().get(session_id).cloned()
    }

    /// Record a completed turn, creating the session if it is unknown
    pub fn touch(&self, session_id: &str) {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Auto-creating session record for {}", session_id);
                Session::new(session_id, self.ttl)
            })
            .touch();
    }

    pub fn reset(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().get_mut(session_id) {
            session.reset();
        }
    }

    pub fn delete(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn list_sessions(&self) -> Vec<SessionSnapshot> {
        let now = Utc::now();
        self.sessions
            .lock()
            .values()
            .map(|session| session.snapshot_at(now))
            .collect()
    }

    /// Remove expired sessions, returning how many were dropped
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        let evicted = before - sessions.len();

        if evicted > 0 {
            info!("Evicted {} expired sessions", evicted);
        }
        evicted
    }
}
