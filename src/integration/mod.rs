//! Integration layer
//!
//! The orchestrator facade, its configuration and the outbound event topics.

pub mod config;
pub mod events;
pub mod orchestrator;

pub use config::{OrchestratorConfig, DEFAULT_CANCEL_KEYWORDS};
pub use events::{
    CancelReason, EventBus, OperationCancelled, OrchestratorEvent, ResponseEvent, SpeechFailure,
    Topic,
};
pub use orchestrator::{
    CancelMatcher, CommandRouter, Orchestrator, OrchestratorBuilder, OrchestratorCommand,
    OrchestratorHandle,
};
