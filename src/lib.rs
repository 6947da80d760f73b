//! Voxop - spoken feedback for autonomous testing agents
//!
//! Turns structured task results into natural-language responses, tracks the
//! single long-running operation with throttled progress announcements, and
//! streams synthesized speech back to any listener.

pub mod integration;
pub mod messages;
pub mod progress;
pub mod response;
pub mod results;
pub mod speech;

use thiserror::Error;

pub use integration::{
    EventBus, Orchestrator, OrchestratorBuilder, OrchestratorCommand, OrchestratorConfig,
    OrchestratorHandle,
};
pub use progress::{ProgressTracker, ProgressUpdate, TrackerConfig, TrackerStatus};
pub use response::{generate_response, normalize_error, NormalizedError};
pub use results::{ActionKind, Payload, TaskResult};
pub use speech::{SpeechChannel, SpeechConfig, SpeechProvider, ToneProvider};

#[derive(Error, Debug, Clone)]
pub enum VoxopError {
    #[error("Speech error: {0}")]
    SpeechError(String),

    #[error("Speech delivery failed: {0}")]
    SpeechDeliveryError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Invalid task result: {0}")]
    InvalidResult(String),

    #[error("Orchestrator error: {0}")]
    OrchestratorError(String),
}

impl From<std::io::Error> for VoxopError {
    fn from(e: std::io::Error) -> Self {
        VoxopError::IOError(e.to_string())
    }
}

impl VoxopError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // A failed clip leaves the text response usable
            VoxopError::SpeechError(_) => true,
            VoxopError::SpeechDeliveryError(_) => true,
            // The orchestrator loop is gone
            VoxopError::ChannelError(_) => false,
            VoxopError::ConfigError(_) => false,
            VoxopError::IOError(_) => false,
            // Answered with a generic response
            VoxopError::InvalidResult(_) => true,
            VoxopError::OrchestratorError(_) => true,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            VoxopError::SpeechError(_) => {
                "Speech synthesis is unavailable. Responses will be shown as text.".to_string()
            }
            VoxopError::SpeechDeliveryError(_) => {
                "Audio for this response could not be delivered. The text is still available."
                    .to_string()
            }
            VoxopError::ChannelError(_) => {
                "Internal communication error. Please restart the orchestrator.".to_string()
            }
            VoxopError::ConfigError(_) => "Configuration error. Please check settings.".to_string(),
            VoxopError::IOError(_) => "File system error occurred.".to_string(),
            VoxopError::InvalidResult(_) => {
                "An agent sent a result that could not be read.".to_string()
            }
            VoxopError::OrchestratorError(_) => "System error occurred. Please try again.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VoxopError>;
