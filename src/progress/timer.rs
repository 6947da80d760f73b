//! Clocks and repeating timers
//!
//! Timers never call back into the tracker directly. Each armed timer carries
//! the generation it was armed under and delivers `TimerTick`s over a channel
//! to whoever owns the tracker; the owner drops ticks whose generation is no
//! longer current.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Monotonic millisecond clock
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by `Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ms(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// One firing of a repeating timer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerTick {
    /// Generation the timer was armed under
    pub generation: u64,
}

/// Cancellation handle for an armed timer; dropping it cancels too
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
}

impl TimerHandle {
    fn new(cancelled: Arc<AtomicBool>, stop_tx: Option<Sender<()>>) -> Self {
        Self { cancelled, stop_tx }
    }

    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Disconnecting wakes a sleeping timer thread
        self.stop_tx.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Source of repeating timers
pub trait Scheduler: Send + Sync {
    /// Deliver `TimerTick { generation }` on `ticks` every `period` until the
    /// returned handle is cancelled or dropped
    fn schedule_repeating(
        &self,
        period: Duration,
        generation: u64,
        ticks: Sender<TimerTick>,
    ) -> TimerHandle;
}

/// Scheduler running each timer on its own thread
#[derive(Debug, Default, Clone)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule_repeating(
        &self,
        period: Duration,
        generation: u64,
        ticks: Sender<TimerTick>,
    ) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let flag = Arc::clone(&cancelled);

        let spawned = thread::Builder::new()
            .name(format!("progress-timer-{}", generation))
            .spawn(move || {
                debug!("Timer {} armed ({:?})", generation, period);
                loop {
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            if flag.load(Ordering::SeqCst) {
                                break;
                            }
                            if ticks.send(TimerTick { generation }).is_err() {
                                break;
                            }
                        }
                        // Stop signal or handle dropped
                        _ => break,
                    }
                }
                debug!("Timer {} stopped", generation);
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn timer thread: {}", e);
            cancelled.store(true, Ordering::SeqCst);
        }

        TimerHandle::new(cancelled, Some(stop_tx))
    }
}

struct ManualTimer {
    period_ms: u64,
    next_due_ms: u64,
    generation: u64,
    ticks: Sender<TimerTick>,
    cancelled: Arc<AtomicBool>,
}

/// Deterministic scheduler driven by a `ManualClock`
///
/// `advance` moves the clock forward and fires every due timer in deadline
/// order, leaving the clock at each deadline while that tick is sent.
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    timers: Mutex<Vec<ManualTimer>>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            timers: Mutex::new(Vec::new()),
        }
    }

    pub fn clock(&self) -> Arc<ManualClock> {
        Arc::clone(&self.clock)
    }

    /// Number of timers still armed
    pub fn armed(&self) -> usize {
        let mut timers = self.timers.lock();
        timers.retain(|t| !t.cancelled.load(Ordering::SeqCst));
        timers.len()
    }

    /// Advance the clock, firing due timers; returns the number of ticks sent
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.clock.now_ms() + by.as_millis() as u64;
        let mut fired = 0;

        loop {
            let mut timers = self.timers.lock();
            timers.retain(|t| !t.cancelled.load(Ordering::SeqCst));

            let Some(timer) = timers
                .iter_mut()
                .filter(|t| t.next_due_ms <= target)
                .min_by_key(|t| t.next_due_ms)
            else {
                break;
            };

            self.clock.set_ms(timer.next_due_ms);
            timer.next_due_ms += timer.period_ms;
            if timer
                .ticks
                .send(TimerTick {
                    generation: timer.generation,
                })
                .is_ok()
            {
                fired += 1;
            }
        }

        self.clock.set_ms(target);
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(
        &self,
        period: Duration,
        generation: u64,
        ticks: Sender<TimerTick>,
    ) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let period_ms = (period.as_millis() as u64).max(1);

        self.timers.lock().push(ManualTimer {
            period_ms,
            next_due_ms: self.clock.now_ms() + period_ms,
            generation,
            ticks,
            cancelled: Arc::clone(&cancelled),
        });

        TimerHandle::new(cancelled, None)
    }
}
