//! Progress tracking for long-running operations
//!
//! This module provides:
//! - The single-operation state machine with throttled spoken updates
//! - Clocks and cancellable repeating timers, real and simulated

pub mod timer;
pub mod tracker;

pub use timer::{
    Clock, ManualClock, ManualScheduler, Scheduler, SystemClock, ThreadScheduler, TimerHandle,
    TimerTick,
};
pub use tracker::{
    cancellation_message, progress_message, Operation, OperationState, ProgressTracker,
    ProgressUpdate, StartOutcome, StatusReader, TrackerConfig, TrackerStatus,
};
