//! Orchestrator tying results, progress and speech together
//!
//! One loop thread owns the progress tracker and reacts to three sources:
//! commands from handles, timer ticks, and events from the speech worker.
//! Every tracker transition therefore happens on that single thread.

use crate::integration::config::OrchestratorConfig;
use crate::integration::events::{
    CancelReason, EventBus, OperationCancelled, OrchestratorEvent, ResponseEvent, SpeechFailure,
};
use crate::messages::{ConversationLog, LogEntry};
use crate::progress::{
    cancellation_message, Clock, ManualScheduler, Operation, ProgressTracker, ProgressUpdate,
    Scheduler, StatusReader, SystemClock, ThreadScheduler, TimerTick, TrackerStatus,
};
use crate::response::generate_response;
use crate::results::{ActionKind, Payload, TaskResult};
use crate::speech::{SpeechChannel, SpeechEvent, SpeechProvider, ToneProvider};
use crate::{Result, VoxopError};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Commands that can be sent to the orchestrator
#[derive(Debug, Clone)]
pub enum OrchestratorCommand {
    /// Answer a completed task
    HandleResult(TaskResult),

    /// Process transcribed user speech
    HandleTranscription(String),

    /// Start tracking a long-running operation
    BeginOperation {
        name: String,
        expected_duration_ms: u64,
    },

    /// Cancel the running operation, if any
    CancelOperation,

    /// Shutdown the orchestrator
    Shutdown,
}

/// Receives transcriptions that are not cancellation requests
pub trait CommandRouter: Send + Sync {
    fn route(&self, text: &str);
}

/// Whole-word, case-insensitive matching of cancellation phrases
#[derive(Clone, Debug)]
pub struct CancelMatcher {
    phrases: Vec<Vec<String>>,
}

impl CancelMatcher {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let phrases = keywords
            .iter()
            .map(|k| words(k.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// Whether `text` contains any phrase as a run of whole words
    pub fn is_cancel(&self, text: &str) -> bool {
        let words = words(text);
        self.phrases.iter().any(|phrase| {
            words
                .windows(phrase.len())
                .any(|window| window == phrase.as_slice())
        })
    }
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        // Transcribers add trailing punctuation
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Handle for driving a running orchestrator
#[derive(Clone)]
pub struct OrchestratorHandle {
    command_tx: Sender<OrchestratorCommand>,
    events: Arc<EventBus>,
    status: StatusReader,
    log: ConversationLog,
}

impl OrchestratorHandle {
    pub fn send_command(&self, cmd: OrchestratorCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| VoxopError::ChannelError(format!("Failed to send command: {}", e)))
    }

    pub fn handle_result(&self, result: TaskResult) -> Result<()> {
        self.send_command(OrchestratorCommand::HandleResult(result))
    }

    /// Decode a JSON task result and answer it
    ///
    /// Undecodable input is still answered, with the generic acknowledgement
    /// for an unknown kind.
    pub fn handle_result_json(&self, json: &str) -> Result<()> {
        let result = TaskResult::from_json(json).unwrap_or_else(|e| {
            warn!("Answering undecodable result generically: {}", e);
            TaskResult::succeeded(ActionKind::Unknown, Payload::new())
        });
        self.handle_result(result)
    }

    pub fn handle_transcription(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(OrchestratorCommand::HandleTranscription(text.into()))
    }

    pub fn begin_long_operation(
        &self,
        name: impl Into<String>,
        expected_duration_ms: u64,
    ) -> Result<()> {
        self.send_command(OrchestratorCommand::BeginOperation {
            name: name.into(),
            expected_duration_ms,
        })
    }

    pub fn cancel_operation(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::CancelOperation)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::Shutdown)
    }

    /// Snapshot of the tracked operation; never changes tracker state
    pub fn status(&self) -> TrackerStatus {
        self.status.status()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn conversation(&self) -> &ConversationLog {
        &self.log
    }
}

/// Main orchestrator; consumed by `start`
pub struct Orchestrator {
    config: OrchestratorConfig,
    command_rx: Receiver<OrchestratorCommand>,
    tick_rx: Receiver<TimerTick>,
    tracker: ProgressTracker,
    speech: SpeechChannel,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    log: ConversationLog,
    router: Option<Arc<dyn CommandRouter>>,
}

impl Orchestrator {
    /// Create an orchestrator on wall-clock time with the tone provider
    pub fn new(config: OrchestratorConfig) -> Result<(Self, OrchestratorHandle)> {
        OrchestratorBuilder::new().with_config(config).build()
    }

    /// Start the speech worker and the orchestrator loop
    ///
    /// Returns join handles for both threads.
    pub fn start(self) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        handles.push(self.speech.start_worker()?);
        info!("Speech worker started");

        let handle = thread::Builder::new()
            .name("orchestrator".into())
            .spawn(move || self.run())
            .map_err(|e| {
                VoxopError::OrchestratorError(format!("Failed to spawn orchestrator: {}", e))
            })?;
        handles.push(handle);
        info!("Orchestrator loop started");

        Ok(handles)
    }

    fn run(self) {
        let Orchestrator {
            config,
            command_rx,
            tick_rx,
            tracker,
            speech,
            clock,
            events,
            log,
            router,
        } = self;

        let speech_rx = speech.event_receiver();
        let shutdown_timeout = Duration::from_millis(config.shutdown_timeout_ms);
        let mut session = Session {
            matcher: CancelMatcher::new(config.cancel_keywords.as_slice()),
            tracker,
            speech,
            clock,
            events,
            log,
            router,
        };

        info!("Orchestrator main loop starting");

        loop {
            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(OrchestratorCommand::Shutdown) => {
                        info!("Shutdown requested");
                        session.shutdown(&speech_rx, shutdown_timeout);
                        break;
                    }
                    Ok(cmd) => session.handle_command(cmd),
                    Err(_) => {
                        warn!("Command channel disconnected");
                        session.shutdown(&speech_rx, shutdown_timeout);
                        break;
                    }
                },

                recv(tick_rx) -> tick => {
                    if let Ok(tick) = tick {
                        session.on_tick(tick);
                    }
                }

                recv(speech_rx) -> event => {
                    if let Ok(event) = event {
                        session.on_speech_event(event);
                    }
                }
            }
        }

        info!("Orchestrator stopped");
    }
}

/// State owned by the loop thread
struct Session {
    tracker: ProgressTracker,
    speech: SpeechChannel,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    log: ConversationLog,
    router: Option<Arc<dyn CommandRouter>>,
    matcher: CancelMatcher,
}

impl Session {
    fn handle_command(&mut self, cmd: OrchestratorCommand) {
        match cmd {
            OrchestratorCommand::HandleResult(result) => self.handle_result(result),
            OrchestratorCommand::HandleTranscription(text) => self.handle_transcription(&text),
            OrchestratorCommand::BeginOperation {
                name,
                expected_duration_ms,
            } => self.begin_long_operation(name, expected_duration_ms),
            OrchestratorCommand::CancelOperation => self.cancel_operation(),
            OrchestratorCommand::Shutdown => {}
        }
    }

    fn handle_result(&mut self, result: TaskResult) {
        if let Err(e) = result.validate() {
            warn!("Answering inconsistent result: {}", e);
        }

        if let Some(op) = self.tracker.stop() {
            debug!("Result closed operation '{}'", op.name);
        }

        let text = generate_response(&result);
        let request_id = self.speak(&text);
        self.log
            .add(LogEntry::assistant(text.as_str()).with_request_id(request_id));

        self.events
            .publish(OrchestratorEvent::Response(ResponseEvent {
                text,
                request_id,
                action_kind: result.action_kind,
                success: result.success,
            }));
    }

    fn handle_transcription(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty transcription");
            return;
        }

        self.log.add(LogEntry::user(text));
        self.events
            .publish(OrchestratorEvent::Transcription(text.to_string()));

        if self.matcher.is_cancel(text) {
            debug!("Cancel intent: {}", text);
            self.cancel_operation();
            return;
        }

        match &self.router {
            Some(router) => router.route(text),
            None => debug!("No command router for: {}", text),
        }
    }

    fn begin_long_operation(&mut self, name: String, expected_duration_ms: u64) {
        let outcome = self.tracker.start(name, expected_duration_ms);

        if let Some(previous) = outcome.replaced {
            self.announce_cancelled(previous, CancelReason::Replaced);
        }
        if let Some(update) = outcome.update {
            self.publish_progress(update);
        }
    }

    fn cancel_operation(&mut self) {
        match self.tracker.cancel() {
            Some(op) => self.announce_cancelled(op, CancelReason::UserRequest),
            None => debug!("Nothing to cancel"),
        }
    }

    fn on_tick(&mut self, tick: TimerTick) {
        if let Some(update) = self.tracker.on_tick(tick) {
            self.publish_progress(update);
        }
    }

    fn on_speech_event(&mut self, event: SpeechEvent) {
        match event {
            SpeechEvent::Chunk(chunk) => {
                self.events.publish(OrchestratorEvent::AudioDelta(chunk));
            }
            SpeechEvent::Complete(audio) => {
                self.events.publish(OrchestratorEvent::AudioComplete(audio));
            }
            SpeechEvent::Failed { request_id, error } => {
                error!("Speech delivery failed for {}: {}", request_id, error);
                self.events
                    .publish(OrchestratorEvent::SpeechFailed(SpeechFailure {
                        request_id: Some(request_id),
                        error,
                    }));
            }
            SpeechEvent::Shutdown => debug!("Speech worker reported shutdown"),
        }
    }

    fn publish_progress(&mut self, update: ProgressUpdate) {
        if update.spoken {
            let request_id = self.speak(&update.message);
            self.log
                .add(LogEntry::progress(update.message.as_str()).with_request_id(request_id));
        }
        self.events.publish(OrchestratorEvent::Progress(update));
    }

    fn announce_cancelled(&mut self, op: Operation, reason: CancelReason) {
        let elapsed_ms = self.clock.now_ms().saturating_sub(op.started_at_ms);

        // A replacement announces itself with its own starting update
        if reason == CancelReason::UserRequest {
            let message = cancellation_message(&op.name);
            let request_id = self.speak(&message);
            self.log
                .add(LogEntry::progress(message).with_request_id(request_id));
        }

        self.events
            .publish(OrchestratorEvent::Cancelled(OperationCancelled {
                operation: op.name,
                elapsed_ms,
                reason,
            }));
    }

    /// Queue text for speech; failures leave the text usable
    fn speak(&mut self, text: &str) -> Option<Uuid> {
        match self.speech.speak(text) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to queue speech: {}", e);
                self.events
                    .publish(OrchestratorEvent::SpeechFailed(SpeechFailure {
                        request_id: None,
                        error: e.to_string(),
                    }));
                None
            }
        }
    }

    fn shutdown(&mut self, speech_rx: &Receiver<SpeechEvent>, timeout: Duration) {
        if let Some(op) = self.tracker.cancel() {
            info!("Abandoning '{}' at shutdown", op.name);
        }

        if let Err(e) = self.speech.shutdown() {
            warn!("Failed to stop speech worker: {}", e);
        }

        // In-flight speech finishes and its events still go out
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!("Shutdown timeout reached, forcing exit");
                break;
            }
            match speech_rx.recv_timeout(deadline - now) {
                Ok(SpeechEvent::Shutdown) => {
                    debug!("Speech shutdown confirmed");
                    break;
                }
                Ok(event) => self.on_speech_event(event),
                Err(_) => {
                    warn!("Speech worker did not confirm shutdown");
                    break;
                }
            }
        }

        self.events.publish(OrchestratorEvent::Shutdown);
        info!("Orchestrator shutdown complete");
    }
}

/// Builder for an orchestrator with injectable time, speech and routing
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    clock: Option<Arc<dyn Clock>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    provider: Option<Arc<dyn SpeechProvider>>,
    router: Option<Arc<dyn CommandRouter>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            clock: None,
            scheduler: None,
            provider: None,
            router: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Drive timers and the clock from a manual scheduler
    pub fn with_manual_time(self, scheduler: Arc<ManualScheduler>) -> Self {
        let clock: Arc<dyn Clock> = scheduler.clock();
        self.with_clock(clock).with_scheduler(scheduler)
    }

    pub fn with_provider(mut self, provider: Arc<dyn SpeechProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_router(mut self, router: Arc<dyn CommandRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn build(self) -> Result<(Orchestrator, OrchestratorHandle)> {
        self.config.validate()?;

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new()),
        };
        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(ThreadScheduler::new()),
        };
        let provider: Arc<dyn SpeechProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(ToneProvider::new()),
        };

        let (command_tx, command_rx) = bounded(self.config.channel_buffer_size);
        let (tick_tx, tick_rx) = unbounded();

        let tracker = ProgressTracker::new(
            self.config.tracker.clone(),
            Arc::clone(&clock),
            scheduler,
            tick_tx,
        );
        let speech = SpeechChannel::new(self.config.speech.clone(), provider);
        let events = Arc::new(EventBus::new());
        let log = ConversationLog::new(self.config.conversation_log_limit);

        let handle = OrchestratorHandle {
            command_tx,
            events: Arc::clone(&events),
            status: tracker.status_reader(),
            log: log.clone(),
        };

        let orchestrator = Orchestrator {
            config: self.config,
            command_rx,
            tick_rx,
            tracker,
            speech,
            clock,
            events,
            log,
            router: self.router,
        };

        Ok((orchestrator, handle))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
