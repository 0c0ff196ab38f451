use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Author of a stored conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role label the model expects in chat history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        }
    }
}

impl From<Role> for TurnRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => TurnRole::User,
            Role::Assistant => TurnRole::Model,
        }
    }
}

/// One entry of model-ready chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryTurn {
    pub role: TurnRole,
    pub text: String,
}

/// One stored turn half. Fields are private so a message can't change after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
    message_id: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            message_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn to_history_turn(&self) -> HistoryTurn {
        HistoryTurn {
            role: self.role.into(),
            text: self.content.clone(),
        }
    }
}

/// Rolling message window for a single session
#[derive(Debug, Clone)]
pub struct SessionBuffer {
    pub session_id: String,
    pub ttl: Duration,
    pub max_messages: usize,
    pub created_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
    messages: VecDeque<ConversationMessage>,
}

impl SessionBuffer {
    pub fn new(session_id: impl Into<String>, ttl: Duration, max_messages: usize) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            ttl,
            max_messages,
            created_at: now,
            last_access: now,
            messages: VecDeque::with_capacity(max_messages.min(64)),
        }
    }

    /// Append and drop the oldest entries beyond `max_messages`
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) -> ConversationMessage {
        let message = ConversationMessage::new(role, content);
        self.messages.push_back(message.clone());
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
        self.touch();
        message
    }

    pub fn history(&mut self) -> Vec<ConversationMessage> {
        self.touch();
        self.messages.iter().cloned().collect()
    }

    /// Model-format history, bounded to the last `last_n` messages. `None` or 0 means all.
    pub fn model_history(&mut self, last_n: Option<usize>) -> Vec<HistoryTurn> {
        self.touch();
        let skip = match last_n {
            Some(n) if n > 0 => self.messages.len().saturating_sub(n),
            _ => 0,
        };
        self.messages
            .iter()
            .skip(skip)
            .map(ConversationMessage::to_history_turn)
            .collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.touch();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        self.last_access
    }

    pub fn touch(&mut self) {
        self.last_access = Utc::now();
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.last_access > self.ttl
    }
}
