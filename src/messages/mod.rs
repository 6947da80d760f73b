//! Conversation history shared between the orchestrator and its callers

pub mod storage;
pub mod types;

pub use storage::ConversationLog;
pub use types::{LogEntry, Role};
