//! WAV container encode/decode via hound

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use multitracker_core::AudioBuffer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("WAV error: {0}")]
    Hound(#[from] hound::Error),
    #[error("Unsupported WAV format: {0:?} {1}-bit")]
    Unsupported(SampleFormat, u16),
    #[error("Cannot encode a buffer with {0} channels")]
    ChannelCount(usize),
}

/// 16-bit signed PCM, interleaved. Samples are clamped to [-1, 1] and scaled
/// by 32767 with truncation toward zero.
pub fn encode(buffer: &AudioBuffer) -> Result<Vec<u8>, WavError> {
    let channels = u16::try_from(buffer.channel_count())
        .map_err(|_| WavError::ChannelCount(buffer.channel_count()))?;
    let spec = WavSpec {
        channels,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for sample in buffer.to_interleaved() {
            writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Decode PCM (8/16/24/32-bit) or 32-bit float WAV bytes into a buffer.
pub fn decode(bytes: &[u8]) -> Result<AudioBuffer, WavError> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let full_scale = ((1i64 << (bits - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v as f32 / full_scale).clamp(-1.0, 1.0)))
                .collect::<Result<_, _>>()?
        }
        (format, bits) => return Err(WavError::Unsupported(format, bits)),
    };

    Ok(AudioBuffer::from_interleaved(&samples, spec.channels, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_within_quantization() {
        let left: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.013).sin() * 0.9).collect();
        let right: Vec<f32> = left.iter().map(|s| -s * 0.5).collect();
        let buffer = AudioBuffer::from_channels(vec![left, right], 22050);

        let bytes = encode(&buffer).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 1000 * 2 * 2);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.sample_rate(), 22050);
        assert_eq!(decoded.channel_count(), 2);
        for ch in 0..2 {
            for (a, b) in buffer.channel(ch).unwrap().iter().zip(decoded.channel(ch).unwrap()) {
                assert!((a - b).abs() <= 1.0 / 32767.0 + 1e-7);
            }
        }
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let buffer = AudioBuffer::from_channels(vec![vec![1.8, -2.5, 1.0, -1.0]], 8000);
        let decoded = decode(&encode(&buffer).unwrap()).unwrap();
        assert_eq!(decoded.channel(0).unwrap(), &[1.0, -1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_encoding_truncates_toward_zero() {
        let buffer = AudioBuffer::from_channels(vec![vec![0.5, -0.5]], 8000);
        let bytes = encode(&buffer).unwrap();
        let first = i16::from_le_bytes([bytes[44], bytes[45]]);
        let second = i16::from_le_bytes([bytes[46], bytes[47]]);
        assert_eq!((first, second), (16383, -16383));
    }

    #[test]
    fn test_decodes_float_wav() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0.25f32, -0.75, 0.0] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let decoded = decode(&cursor.into_inner()).unwrap();
        assert_eq!(decoded.channel(0).unwrap(), &[0.25, -0.75, 0.0]);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode(b"definitely not a wav file").is_err());
    }
}
