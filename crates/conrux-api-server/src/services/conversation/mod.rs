//! Conversation memory management module
//!
//! Provides in-memory conversation content per session with:
//! - Thread-safe session registry (one mutex for the whole map)
//! - Rolling message window per session
//! - TTL eviction swept on every write
//! - Conversion to model-ready chat history

mod cache;
pub mod types;

pub use cache::{MemoryConfig, MemoryManager};
pub use types::{ConversationMessage, HistoryTurn, Role, SessionBuffer, TurnRole};
