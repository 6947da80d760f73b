//! Structured results produced by task-performing agents

pub mod types;

pub use types::{ActionKind, Payload, TaskResult};
