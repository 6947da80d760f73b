//! Configuration for the orchestrator
//!
//! Every field has a default, so a TOML file only needs the values it
//! overrides.

use crate::progress::TrackerConfig;
use crate::speech::SpeechConfig;
use crate::{Result, VoxopError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Phrases treated as a request to cancel the running operation
pub const DEFAULT_CANCEL_KEYWORDS: &[&str] =
    &["cancel", "stop", "abort", "halt", "nevermind", "never mind"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub tracker: TrackerConfig,

    pub speech: SpeechConfig,

    /// Capacity of the command channel
    pub channel_buffer_size: usize,

    /// How long shutdown waits for the speech worker
    pub shutdown_timeout_ms: u64,

    /// Whole words or phrases matched case-insensitively
    pub cancel_keywords: Vec<String>,

    /// Entries kept in the conversation log
    pub conversation_log_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            speech: SpeechConfig::default(),
            channel_buffer_size: 100,
            shutdown_timeout_ms: 5000,
            cancel_keywords: DEFAULT_CANCEL_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            conversation_log_limit: 500,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_speech(mut self, speech: SpeechConfig) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    pub fn with_shutdown_timeout_ms(mut self, timeout: u64) -> Self {
        self.shutdown_timeout_ms = timeout;
        self
    }

    pub fn with_cancel_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cancel_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_conversation_log_limit(mut self, limit: usize) -> Self {
        self.conversation_log_limit = limit;
        self
    }

    /// Load and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            VoxopError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| VoxopError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: OrchestratorConfig = toml::from_str(content)
            .map_err(|e| VoxopError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        self.speech.validate()?;

        if self.channel_buffer_size == 0 {
            return Err(VoxopError::ConfigError(
                "Channel buffer size must be positive".into(),
            ));
        }
        if self.conversation_log_limit == 0 {
            return Err(VoxopError::ConfigError(
                "Conversation log limit must be positive".into(),
            ));
        }
        if self.cancel_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(VoxopError::ConfigError(
                "Cancel keywords must not be blank".into(),
            ));
        }
        Ok(())
    }
}
