//! WAV export of assembled speech audio

use crate::speech::provider::AudioFormat;
use crate::{Result, VoxopError};
use std::io::Cursor;

/// Decode little-endian PCM16 bytes; a trailing odd byte is ignored
pub fn pcm16_samples(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Wrap raw PCM16 bytes in a WAV container
pub fn encode_wav(data: &[u8], format: AudioFormat) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoxopError::SpeechError(format!("Failed to create WAV writer: {}", e)))?;

        for sample in pcm16_samples(data) {
            writer
                .write_sample(sample)
                .map_err(|e| VoxopError::SpeechError(format!("Failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| VoxopError::SpeechError(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(cursor.into_inner())
}
