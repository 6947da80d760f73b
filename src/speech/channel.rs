//! Speech channel adapter
//!
//! Owns a worker thread that takes text requests in order, streams them
//! through a `SpeechProvider`, re-emits every chunk as it arrives and, once
//! the provider reports completion, emits a single assembled buffer for the
//! request. Provider failures are reported once and never retried.

use crate::speech::provider::{AudioFormat, ProviderFrame, SpeechProvider, SpeechRequest};
use crate::speech::text::normalize_text_for_speech;
use crate::speech::wav::{encode_wav, pcm16_samples};
use crate::{Result, VoxopError};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Configuration for the speech channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Output sample rate requested from the provider
    pub sample_rate: u32,

    /// Output channel count
    pub channels: u16,

    /// Maximum number of pending speak requests
    pub queue_size: usize,

    /// Longest silence tolerated between two provider frames
    pub chunk_timeout_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
            queue_size: 100,
            chunk_timeout_ms: 10_000,
        }
    }
}

impl SpeechConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_chunk_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.chunk_timeout_ms = timeout_ms;
        self
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(VoxopError::ConfigError("Sample rate must be positive".into()));
        }
        if self.channels == 0 {
            return Err(VoxopError::ConfigError("Channel count must be positive".into()));
        }
        if self.queue_size == 0 {
            return Err(VoxopError::ConfigError("Speech queue size must be positive".into()));
        }
        if self.chunk_timeout_ms == 0 {
            return Err(VoxopError::ConfigError("Chunk timeout must be positive".into()));
        }
        Ok(())
    }
}

/// One streamed piece of audio
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    pub request_id: Uuid,
    /// Position within the request, starting at 0
    pub index: usize,
    pub data: Vec<u8>,
}

/// All audio of one request, in arrival order
#[derive(Clone, Debug, PartialEq)]
pub struct AssembledAudio {
    pub request_id: Uuid,
    pub data: Vec<u8>,
    pub format: AudioFormat,
    pub chunk_count: usize,
}

impl AssembledAudio {
    pub fn duration_ms(&self) -> u64 {
        let rate = self.format.byte_rate();
        if rate == 0 {
            return 0;
        }
        self.data.len() as u64 * 1000 / rate
    }

    pub fn samples(&self) -> Vec<i16> {
        pcm16_samples(&self.data)
    }

    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        encode_wav(&self.data, self.format)
    }
}

/// Command sent to the speech worker
#[derive(Clone, Debug)]
pub enum SpeechCommand {
    Speak(SpeechRequest),
    Shutdown,
}

/// Event emitted by the speech worker
#[derive(Clone, Debug)]
pub enum SpeechEvent {
    Chunk(AudioChunk),

    /// Emitted exactly once per successful request, after its last chunk
    Complete(AssembledAudio),

    /// Delivery failed; no `Complete` follows for this request
    Failed { request_id: Uuid, error: String },

    Shutdown,
}

/// Per-request chunk buffers
///
/// Buffers are keyed by request id so audio from one request can never leak
/// into another's assembled output.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    pending: HashMap<Uuid, Vec<Vec<u8>>>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, request_id: Uuid) {
        self.pending.insert(request_id, Vec::new());
    }

    /// Buffer a chunk, returning its index within the request
    pub fn push(&mut self, request_id: Uuid, data: Vec<u8>) -> usize {
        let chunks = self.pending.entry(request_id).or_default();
        chunks.push(data);
        chunks.len() - 1
    }

    /// Concatenate and release the buffer for `request_id`
    pub fn finish(&mut self, request_id: Uuid, format: AudioFormat) -> Option<AssembledAudio> {
        let chunks = self.pending.remove(&request_id)?;
        Some(AssembledAudio {
            request_id,
            chunk_count: chunks.len(),
            data: chunks.concat(),
            format,
        })
    }

    pub fn discard(&mut self, request_id: Uuid) {
        self.pending.remove(&request_id);
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

/// Speech channel with a dedicated worker thread
pub struct SpeechChannel {
    config: SpeechConfig,
    provider: Arc<dyn SpeechProvider>,
    command_tx: Sender<SpeechCommand>,
    command_rx: Receiver<SpeechCommand>,
    event_tx: Sender<SpeechEvent>,
    event_rx: Receiver<SpeechEvent>,
}

impl SpeechChannel {
    pub fn new(config: SpeechConfig, provider: Arc<dyn SpeechProvider>) -> Self {
        let (command_tx, command_rx) = bounded(config.queue_size.max(1));
        // Chunk volume per request is unbounded
        let (event_tx, event_rx) = unbounded();

        Self {
            config,
            provider,
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    pub fn command_sender(&self) -> Sender<SpeechCommand> {
        self.command_tx.clone()
    }

    pub fn event_receiver(&self) -> Receiver<SpeechEvent> {
        self.event_rx.clone()
    }

    /// Queue `text` for synthesis and return the request id its events carry
    ///
    /// Never blocks; a full queue is reported as an error.
    pub fn speak(&self, text: &str) -> Result<Uuid> {
        let request = SpeechRequest::new(text, self.config.format());
        let id = request.id;

        self.command_tx
            .try_send(SpeechCommand::Speak(request))
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    VoxopError::SpeechDeliveryError("Speech queue is full".into())
                }
                TrySendError::Disconnected(_) => {
                    VoxopError::ChannelError("Speech worker is not running".into())
                }
            })?;

        debug!("Queued speech request {}", id);
        Ok(id)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(SpeechCommand::Shutdown)
            .map_err(|e| VoxopError::ChannelError(format!("Failed to send shutdown: {}", e)))
    }

    /// Start the worker thread
    pub fn start_worker(&self) -> Result<thread::JoinHandle<()>> {
        let config = self.config.clone();
        let provider = Arc::clone(&self.provider);
        let command_rx = self.command_rx.clone();
        let event_tx = self.event_tx.clone();

        thread::Builder::new()
            .name("speech-worker".into())
            .spawn(move || run_worker(config, provider, command_rx, event_tx))
            .map_err(|e| VoxopError::SpeechError(format!("Failed to spawn speech worker: {}", e)))
    }
}

fn run_worker(
    config: SpeechConfig,
    provider: Arc<dyn SpeechProvider>,
    command_rx: Receiver<SpeechCommand>,
    event_tx: Sender<SpeechEvent>,
) {
    info!("Speech worker starting with {} provider", provider.name());
    let mut assembler = ChunkAssembler::new();

    loop {
        match command_rx.recv() {
            Ok(SpeechCommand::Speak(request)) => {
                deliver(&config, provider.as_ref(), &mut assembler, request, &event_tx);
            }
            Ok(SpeechCommand::Shutdown) => {
                info!("Speech worker shutting down");
                let _ = event_tx.send(SpeechEvent::Shutdown);
                break;
            }
            Err(e) => {
                error!("Speech command channel error: {}", e);
                break;
            }
        }
    }

    info!("Speech worker stopped");
}

fn deliver(
    config: &SpeechConfig,
    provider: &dyn SpeechProvider,
    assembler: &mut ChunkAssembler,
    request: SpeechRequest,
    event_tx: &Sender<SpeechEvent>,
) {
    let request = SpeechRequest {
        text: normalize_text_for_speech(&request.text),
        ..request
    };
    let id = request.id;
    assembler.begin(id);

    if request.text.is_empty() {
        debug!("Nothing to say for {}", id);
        if let Some(audio) = assembler.finish(id, request.format) {
            let _ = event_tx.send(SpeechEvent::Complete(audio));
        }
        return;
    }

    debug!(
        "Synthesizing {}: {}",
        id,
        request.text.chars().take(50).collect::<String>()
    );

    let frames = match provider.synthesize(&request) {
        Ok(frames) => frames,
        Err(e) => return fail(assembler, id, e.to_string(), event_tx),
    };

    let timeout = Duration::from_millis(config.chunk_timeout_ms);
    loop {
        match frames.recv_timeout(timeout) {
            Ok(ProviderFrame::Audio(data)) => {
                if data.is_empty() {
                    continue;
                }
                let index = assembler.push(id, data.clone());
                let _ = event_tx.send(SpeechEvent::Chunk(AudioChunk {
                    request_id: id,
                    index,
                    data,
                }));
            }
            Ok(ProviderFrame::Complete) => {
                if let Some(audio) = assembler.finish(id, request.format) {
                    debug!(
                        "Request {} complete: {} chunks, {}ms",
                        id,
                        audio.chunk_count,
                        audio.duration_ms()
                    );
                    let _ = event_tx.send(SpeechEvent::Complete(audio));
                }
                return;
            }
            Ok(ProviderFrame::Failed(reason)) => return fail(assembler, id, reason, event_tx),
            Err(RecvTimeoutError::Timeout) => {
                let reason = format!("provider stalled for {}ms", config.chunk_timeout_ms);
                return fail(assembler, id, reason, event_tx);
            }
            Err(RecvTimeoutError::Disconnected) => {
                let reason = "provider stream ended without completion".to_string();
                return fail(assembler, id, reason, event_tx);
            }
        }
    }
}

fn fail(assembler: &mut ChunkAssembler, id: Uuid, reason: String, event_tx: &Sender<SpeechEvent>) {
    assembler.discard(id);
    warn!("Speech delivery failed for {}: {}", id, reason);
    let _ = event_tx.send(SpeechEvent::Failed {
        request_id: id,
        error: reason,
    });
}
