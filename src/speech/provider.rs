//! Speech synthesis providers
//!
//! A provider accepts a request and streams raw PCM frames back over a
//! channel, finishing with `Complete` or `Failed`. Frames for one request
//! arrive in emission order.

use crate::{Result, VoxopError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::thread;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Linear PCM layout agreed with the provider (16-bit little-endian samples)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes per second of audio
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * Self::BYTES_PER_SAMPLE as u64
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(24_000, 1)
    }
}

/// Text submitted for synthesis
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechRequest {
    pub id: Uuid,
    pub text: String,
    pub format: AudioFormat,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            format,
        }
    }
}

/// One item of a provider's output stream
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderFrame {
    /// Raw PCM bytes
    Audio(Vec<u8>),
    /// All audio for the request has been sent
    Complete,
    /// Synthesis broke off; no more frames follow
    Failed(String),
}

/// External text-to-speech capability
pub trait SpeechProvider: Send + Sync {
    /// Start synthesizing `request`; frames arrive on the returned receiver
    fn synthesize(&self, request: &SpeechRequest) -> Result<Receiver<ProviderFrame>>;

    fn name(&self) -> &str {
        "provider"
    }
}

/// Built-in provider rendering one short tone per word
///
/// Deterministic and dependency-free, so the orchestrator can run end to end
/// without a real voice.
#[derive(Clone, Debug)]
pub struct ToneProvider {
    ms_per_word: u32,
    samples_per_chunk: usize,
    chunk_delay: Option<Duration>,
}

impl Default for ToneProvider {
    fn default() -> Self {
        Self {
            ms_per_word: 120,
            samples_per_chunk: 1024,
            chunk_delay: None,
        }
    }
}

impl ToneProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream from a background thread, pausing between chunks
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn with_samples_per_chunk(mut self, samples: usize) -> Self {
        self.samples_per_chunk = samples.max(1);
        self
    }

    pub fn with_ms_per_word(mut self, ms: u32) -> Self {
        self.ms_per_word = ms.max(1);
        self
    }

    /// Render `text` into PCM chunks
    pub fn render(&self, text: &str, format: AudioFormat) -> Vec<Vec<u8>> {
        let per_word = (format.sample_rate as u64 * self.ms_per_word as u64 / 1000) as usize;
        let channels = format.channels.max(1) as usize;
        let mut pcm: Vec<u8> = Vec::new();

        for word in text.split_whitespace() {
            let freq = 220.0 + (word.len() % 8) as f32 * 55.0;
            for i in 0..per_word {
                let t = i as f32 / format.sample_rate as f32;
                // Short fade in and out per word
                let envelope = (i.min(per_word - i) as f32 / 240.0).min(1.0);
                let value = (2.0 * PI * freq * t).sin() * 0.3 * envelope;
                let sample = (value * i16::MAX as f32) as i16;
                for _ in 0..channels {
                    pcm.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }

        let chunk_bytes = self.samples_per_chunk * channels * AudioFormat::BYTES_PER_SAMPLE;
        pcm.chunks(chunk_bytes).map(<[u8]>::to_vec).collect()
    }
}

impl SpeechProvider for ToneProvider {
    fn synthesize(&self, request: &SpeechRequest) -> Result<Receiver<ProviderFrame>> {
        let chunks = self.render(&request.text, request.format);
        debug!("Tone provider rendering {} chunks for {}", chunks.len(), request.id);

        let (tx, rx) = unbounded();
        match self.chunk_delay {
            None => send_all(&tx, chunks, None),
            Some(delay) => {
                thread::Builder::new()
                    .name(format!("tone-{}", request.id))
                    .spawn(move || send_all(&tx, chunks, Some(delay)))
                    .map_err(|e| VoxopError::SpeechError(format!("Failed to spawn: {}", e)))?;
            }
        }
        Ok(rx)
    }

    fn name(&self) -> &str {
        "tone"
    }
}

fn send_all(tx: &Sender<ProviderFrame>, chunks: Vec<Vec<u8>>, delay: Option<Duration>) {
    for chunk in chunks {
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        if tx.send(ProviderFrame::Audio(chunk)).is_err() {
            return;
        }
    }
    let _ = tx.send(ProviderFrame::Complete);
}
