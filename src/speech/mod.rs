//! Speech output
//!
//! - `provider`: the synthesis capability and the built-in tone provider
//! - `channel`: worker that streams chunks and assembles per-request buffers
//! - `text`: spoken formatting and provider text cleanup
//! - `wav`: WAV export of assembled audio

pub mod channel;
pub mod provider;
pub mod text;
pub mod wav;

pub use channel::{
    AssembledAudio, AudioChunk, ChunkAssembler, SpeechChannel, SpeechCommand, SpeechConfig,
    SpeechEvent,
};
pub use provider::{AudioFormat, ProviderFrame, SpeechProvider, SpeechRequest, ToneProvider};
pub use text::{count_phrase, describe_remaining, format_duration_ms, normalize_text_for_speech};
pub use wav::encode_wav;
