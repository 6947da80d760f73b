//! Progress tracking for the single long-running operation
//!
//! The tracker samples elapsed time every `check_interval_ms` but only marks an
//! update as spoken once per `speak_interval_ms`. Short operations are never
//! tracked. Every transition bumps a generation counter; ticks armed under an
//! older generation are dropped, so nothing fires after `stop()`/`cancel()`.

use crate::progress::timer::{Clock, Scheduler, TimerHandle, TimerTick};
use crate::speech::text::{describe_remaining, format_duration_ms};
use crate::{Result, VoxopError};
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Tracker timing configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Operations expected to finish within this are not tracked
    pub short_threshold_ms: u64,

    /// Period of the recurring check
    pub check_interval_ms: u64,

    /// Minimum spacing between spoken updates
    pub speak_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            short_threshold_ms: 10_000,
            check_interval_ms: 15_000,
            speak_interval_ms: 30_000,
        }
    }
}

impl TrackerConfig {
    pub fn with_check_interval_ms(mut self, ms: u64) -> Self {
        self.check_interval_ms = ms;
        self
    }

    pub fn with_speak_interval_ms(mut self, ms: u64) -> Self {
        self.speak_interval_ms = ms;
        self
    }

    pub fn with_short_threshold_ms(mut self, ms: u64) -> Self {
        self.short_threshold_ms = ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_ms == 0 {
            return Err(VoxopError::ConfigError(
                "check_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.speak_interval_ms < self.check_interval_ms {
            return Err(VoxopError::ConfigError(format!(
                "speak_interval_ms ({}) must not be shorter than check_interval_ms ({})",
                self.speak_interval_ms, self.check_interval_ms
            )));
        }
        Ok(())
    }
}

/// Lifecycle state of an operation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum OperationState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationState::Idle => write!(f, "Idle"),
            OperationState::Running => write!(f, "Running"),
            OperationState::Completed => write!(f, "Completed"),
            OperationState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// The tracked unit of work
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Operation {
    pub name: String,
    /// Clock reading at start
    pub started_at_ms: u64,
    pub started_at: DateTime<Utc>,
    pub expected_duration_ms: u64,
    pub state: OperationState,
}

/// A computed progress message
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub operation: String,
    pub elapsed_ms: u64,
    pub expected_ms: u64,
    pub message: String,
    /// Whether this update should be read aloud
    pub spoken: bool,
    /// 0 for the starting announcement, then 1, 2, ... per check
    pub sequence: u32,
}

impl ProgressUpdate {
    pub fn is_check(&self) -> bool {
        self.sequence > 0
    }
}

/// Read-only snapshot of the tracker
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    pub active: bool,
    pub operation_name: Option<String>,
    pub elapsed_ms: u64,
    pub expected_ms: u64,
}

/// What `start` did
#[derive(Clone, Debug, Default)]
pub struct StartOutcome {
    /// Operation implicitly cancelled to make room for the new one
    pub replaced: Option<Operation>,
    /// Starting announcement; `None` when the operation is too short to track
    pub update: Option<ProgressUpdate>,
}

/// Thread-safe view of the tracker's status
///
/// Cloned out to handles so status can be read without going through the
/// orchestrator loop. Never mutates tracker state.
#[derive(Clone)]
pub struct StatusReader {
    active: Arc<RwLock<Option<Operation>>>,
    clock: Arc<dyn Clock>,
}

impl StatusReader {
    pub fn status(&self) -> TrackerStatus {
        match self.active.read().as_ref() {
            Some(op) => TrackerStatus {
                active: true,
                operation_name: Some(op.name.clone()),
                elapsed_ms: self.clock.now_ms().saturating_sub(op.started_at_ms),
                expected_ms: op.expected_duration_ms,
            },
            None => TrackerStatus::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.read().is_some()
    }
}

struct ActiveOperation {
    operation: Operation,
    timer: TimerHandle,
    /// Elapsed time at the last spoken update
    last_spoken_ms: u64,
    checks: u32,
}

/// Message for an operation at `elapsed_ms` of `expected_ms`
pub fn progress_message(name: &str, elapsed_ms: u64, expected_ms: u64) -> String {
    if elapsed_ms == 0 {
        return format!(
            "Starting {}. This should take about {}.",
            name,
            format_duration_ms(expected_ms)
        );
    }

    let remaining = expected_ms.saturating_sub(elapsed_ms);
    if elapsed_ms.saturating_mul(4) < expected_ms {
        format!("Just started {}. I'll keep you posted.", name)
    } else if elapsed_ms.saturating_mul(4) <= expected_ms.saturating_mul(3) {
        format!(
            "Still working on {}, {} remaining.",
            name,
            describe_remaining(remaining)
        )
    } else {
        format!("Almost done with {}.", name)
    }
}

/// Fixed acknowledgement spoken after a cancellation
pub fn cancellation_message(name: &str) -> String {
    format!("Okay, I've cancelled {}.", name)
}

/// Owner of the single active operation
pub struct ProgressTracker {
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    tick_tx: Sender<TimerTick>,
    current: Option<ActiveOperation>,
    generation: u64,
    shared: Arc<RwLock<Option<Operation>>>,
}

impl ProgressTracker {
    /// Create a tracker whose timers deliver ticks on `tick_tx`
    pub fn new(
        config: TrackerConfig,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
        tick_tx: Sender<TimerTick>,
    ) -> Self {
        Self {
            config,
            clock,
            scheduler,
            tick_tx,
            current: None,
            generation: 0,
            shared: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> OperationState {
        if self.current.is_some() {
            OperationState::Running
        } else {
            OperationState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Generation that live timers must carry
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Checks performed for the current operation
    pub fn checks(&self) -> u32 {
        self.current.as_ref().map_or(0, |a| a.checks)
    }

    pub fn status_reader(&self) -> StatusReader {
        StatusReader {
            active: Arc::clone(&self.shared),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn status(&self) -> TrackerStatus {
        self.status_reader().status()
    }

    /// Begin tracking `name`, replacing any running operation
    pub fn start(&mut self, name: impl Into<String>, expected_duration_ms: u64) -> StartOutcome {
        let name = name.into();
        let replaced = self.teardown(OperationState::Cancelled);
        if let Some(previous) = &replaced {
            info!("Operation '{}' replaced by '{}'", previous.name, name);
        }

        if expected_duration_ms <= self.config.short_threshold_ms {
            debug!(
                "Not tracking '{}': expected {}ms is within the {}ms threshold",
                name, expected_duration_ms, self.config.short_threshold_ms
            );
            return StartOutcome {
                replaced,
                update: None,
            };
        }

        // Read the clock before arming; ticks are measured from this point
        let operation = Operation {
            name: name.clone(),
            started_at_ms: self.clock.now_ms(),
            started_at: Utc::now(),
            expected_duration_ms,
            state: OperationState::Running,
        };

        self.generation += 1;
        let timer = self.scheduler.schedule_repeating(
            Duration::from_millis(self.config.check_interval_ms),
            self.generation,
            self.tick_tx.clone(),
        );

        *self.shared.write() = Some(operation.clone());
        self.current = Some(ActiveOperation {
            operation,
            timer,
            last_spoken_ms: 0,
            checks: 0,
        });

        info!(
            "Tracking '{}' (expected {}ms, generation {})",
            name, expected_duration_ms, self.generation
        );

        StartOutcome {
            replaced,
            update: Some(ProgressUpdate {
                message: progress_message(&name, 0, expected_duration_ms),
                operation: name,
                elapsed_ms: 0,
                expected_ms: expected_duration_ms,
                spoken: true,
                sequence: 0,
            }),
        }
    }

    /// Handle a timer tick; `None` when the tick is stale
    pub fn on_tick(&mut self, tick: TimerTick) -> Option<ProgressUpdate> {
        if tick.generation != self.generation {
            debug!(
                "Dropping stale tick (generation {}, current {})",
                tick.generation, self.generation
            );
            return None;
        }

        let now = self.clock.now_ms();
        let speak_interval = self.config.speak_interval_ms;
        let active = self.current.as_mut()?;

        let elapsed_ms = now.saturating_sub(active.operation.started_at_ms);
        let expected_ms = active.operation.expected_duration_ms;
        active.checks += 1;

        let spoken = elapsed_ms.saturating_sub(active.last_spoken_ms) >= speak_interval;
        if spoken {
            active.last_spoken_ms = elapsed_ms;
        }

        let update = ProgressUpdate {
            operation: active.operation.name.clone(),
            elapsed_ms,
            expected_ms,
            message: progress_message(&active.operation.name, elapsed_ms, expected_ms),
            spoken,
            sequence: active.checks,
        };

        debug!(
            "Check {} for '{}': {}ms of {}ms (spoken: {})",
            update.sequence, update.operation, elapsed_ms, expected_ms, spoken
        );

        Some(update)
    }

    /// Mark the operation completed; no-op when idle
    pub fn stop(&mut self) -> Option<Operation> {
        let completed = self.teardown(OperationState::Completed);
        if let Some(op) = &completed {
            info!("Operation '{}' completed", op.name);
        }
        completed
    }

    /// Cancel the running operation; no-op when idle
    pub fn cancel(&mut self) -> Option<Operation> {
        let cancelled = self.teardown(OperationState::Cancelled);
        match &cancelled {
            Some(op) => info!("Operation '{}' cancelled", op.name),
            None => debug!("Cancel requested with no active operation"),
        }
        cancelled
    }

    /// Disarm the timer, invalidate in-flight ticks and reset to idle
    fn teardown(&mut self, terminal: OperationState) -> Option<Operation> {
        let mut active = self.current.take()?;
        self.generation += 1;
        active.timer.cancel();
        *self.shared.write() = None;

        let mut operation = active.operation;
        operation.state = terminal;
        Some(operation)
    }
}
