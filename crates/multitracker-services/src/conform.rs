//! Copying foreign buffers into the engine's working format

use multitracker_core::AudioBuffer;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;

/// Upper bound on zero-fed passes when draining the resampler
const MAX_FLUSH_PASSES: usize = 16;

#[derive(Debug, Error)]
pub enum ConformError {
    #[error("Resample init error: {0}")]
    Init(String),
    #[error("Resample error: {0}")]
    Process(String),
}

/// Fresh engine-owned copy of `buffer` at `sample_rate`. Equal rates take a
/// per-channel sample copy; other rates are resampled.
pub fn conform(buffer: &AudioBuffer, sample_rate: u32) -> Result<AudioBuffer, ConformError> {
    if buffer.sample_rate() == sample_rate {
        return Ok(buffer.copy_channels());
    }
    if buffer.is_empty() {
        return Ok(AudioBuffer::silent(buffer.channel_count(), 0, sample_rate));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = sample_rate as f64 / buffer.sample_rate() as f64;
    let target = (buffer.frames() as f64 * ratio).round() as usize;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0,
        params,
        buffer.frames(),
        buffer.channel_count(),
    )
    .map_err(|e| ConformError::Init(e.to_string()))?;

    let mut output = resampler
        .process(buffer.channels(), None)
        .map_err(|e| ConformError::Process(e.to_string()))?;

    // The filter holds back the last few frames until it is fed past them.
    let mut passes = 0;
    while output.first().is_some_and(|ch| ch.len() < target) && passes < MAX_FLUSH_PASSES {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| ConformError::Process(e.to_string()))?;
        for (channel, rest) in output.iter_mut().zip(tail) {
            channel.extend(rest);
        }
        passes += 1;
    }
    for channel in &mut output {
        channel.resize(target, 0.0);
    }

    Ok(AudioBuffer::from_channels(output, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_an_exact_copy() {
        let source = AudioBuffer::from_channels(vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]], 44100);
        let copy = conform(&source, 44100).unwrap();
        assert_eq!(copy, source);
    }

    #[test]
    fn test_resampling_scales_length() {
        let frames = 4800;
        let tone: Vec<f32> = (0..frames).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let source = AudioBuffer::from_channels(vec![tone], 48000);
        let out = conform(&source, 24000).unwrap();
        assert_eq!(out.sample_rate(), 24000);
        assert_eq!(out.channel_count(), 1);
        assert_eq!(out.frames(), frames / 2);
    }

    #[test]
    fn test_resampling_keeps_the_tail() {
        let mut samples = vec![0.0f32; 4800];
        samples[4500] = 1.0;
        let source = AudioBuffer::from_channels(vec![samples.clone(), samples], 48000);
        let out = conform(&source, 24000).unwrap();
        assert_eq!(out.frames(), 2400);
        for channel in out.channels() {
            let peak = channel
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
                .map(|(i, _)| i)
                .unwrap();
            assert!(peak.abs_diff(2250) <= 2, "impulse landed at {}", peak);
        }
    }

    #[test]
    fn test_upsampling_short_clip_is_full_length() {
        let source = AudioBuffer::from_channels(vec![vec![0.25; 300]], 22050);
        let out = conform(&source, 44100).unwrap();
        assert_eq!(out.frames(), 600);
        assert!(out.channels()[0][300].abs() > 0.1);
    }
}
