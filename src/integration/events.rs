//! Outbound event topics
//!
//! Each topic fans out to any number of subscribers over unbounded crossbeam
//! channels. Subscribers that drop their receiver are pruned on the next
//! publish. The `all` topic sees every event, in publish order.

use crate::progress::ProgressUpdate;
use crate::results::ActionKind;
use crate::speech::{AssembledAudio, AudioChunk};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

/// Why an operation stopped without completing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The user asked to cancel
    UserRequest,
    /// A new long operation took its place
    Replaced,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationCancelled {
    pub operation: String,
    pub elapsed_ms: u64,
    pub reason: CancelReason,
}

/// Natural-language answer to a task result
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEvent {
    pub text: String,
    /// Speech request carrying the text; `None` if it could not be queued
    pub request_id: Option<Uuid>,
    pub action_kind: ActionKind,
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechFailure {
    pub request_id: Option<Uuid>,
    pub error: String,
}

/// Every event the orchestrator emits
#[derive(Clone, Debug)]
pub enum OrchestratorEvent {
    AudioDelta(AudioChunk),
    AudioComplete(AssembledAudio),
    Progress(ProgressUpdate),
    Cancelled(OperationCancelled),
    Transcription(String),
    Response(ResponseEvent),
    SpeechFailed(SpeechFailure),
    /// Orchestrator loop has exited
    Shutdown,
}

impl OrchestratorEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            OrchestratorEvent::AudioDelta(_) => "audioDelta",
            OrchestratorEvent::AudioComplete(_) => "audioComplete",
            OrchestratorEvent::Progress(_) => "progressUpdate",
            OrchestratorEvent::Cancelled(_) => "operationCancelled",
            OrchestratorEvent::Transcription(_) => "transcription",
            OrchestratorEvent::Response(_) => "response",
            OrchestratorEvent::SpeechFailed(_) => "speechFailed",
            OrchestratorEvent::Shutdown => "shutdown",
        }
    }
}

/// One typed publish/subscribe channel
pub struct Topic<T> {
    subscribers: RwLock<Vec<Sender<T>>>,
}

impl<T: Clone> Topic<T> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.subscribers.write().push(tx);
        rx
    }

    /// Deliver to every live subscriber; returns how many received it
    pub fn publish(&self, value: T) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<T: Clone> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// All outbound topics of an orchestrator
#[derive(Default)]
pub struct EventBus {
    pub audio_delta: Topic<AudioChunk>,
    pub audio_complete: Topic<AssembledAudio>,
    pub progress: Topic<ProgressUpdate>,
    pub cancelled: Topic<OperationCancelled>,
    pub transcription: Topic<String>,
    pub response: Topic<ResponseEvent>,
    pub speech_failed: Topic<SpeechFailure>,
    pub all: Topic<OrchestratorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `event` to its typed topic and to `all`
    pub fn publish(&self, event: OrchestratorEvent) {
        match &event {
            OrchestratorEvent::AudioDelta(chunk) => {
                self.audio_delta.publish(chunk.clone());
            }
            OrchestratorEvent::AudioComplete(audio) => {
                self.audio_complete.publish(audio.clone());
            }
            OrchestratorEvent::Progress(update) => {
                self.progress.publish(update.clone());
            }
            OrchestratorEvent::Cancelled(cancelled) => {
                self.cancelled.publish(cancelled.clone());
            }
            OrchestratorEvent::Transcription(text) => {
                self.transcription.publish(text.clone());
            }
            OrchestratorEvent::Response(response) => {
                self.response.publish(response.clone());
            }
            OrchestratorEvent::SpeechFailed(failure) => {
                self.speech_failed.publish(failure.clone());
            }
            OrchestratorEvent::Shutdown => {}
        }
        self.all.publish(event);
    }
}
