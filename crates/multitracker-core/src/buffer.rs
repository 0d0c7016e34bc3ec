//! Planar PCM buffers shared by tracks, capture and mixdown

/// A block of planar f32 audio.
///
/// Every channel holds the same number of frames. Buffers handed to the
/// engine are treated as immutable once attached to a track.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Silent buffer with `channels` channels of `frames` frames each.
    pub fn silent(channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channels.max(1)],
        }
    }

    /// Build from per-channel sample vectors. Shorter channels are padded
    /// with silence so every channel has the same length.
    pub fn from_channels(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        if channels.is_empty() {
            channels.push(Vec::new());
        }
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(frames, 0.0);
        }
        Self { sample_rate, channels }
    }

    /// Build from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channel_count: u16, sample_rate: u32) -> Self {
        let count = channel_count.max(1) as usize;
        let frames = samples.len() / count;
        let mut channels = vec![Vec::with_capacity(frames); count];
        for frame in samples.chunks_exact(count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Self { sample_rate, channels }
    }

    /// Interleave all channels into one vector.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for i in 0..frames {
            out.extend(self.channels.iter().map(|c| c[i]));
        }
        out
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Length in frames
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        self.channels.get_mut(index).map(Vec::as_mut_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Stereo view of one frame. Mono is duplicated to both sides and
    /// channels past the second are ignored.
    #[inline]
    pub fn stereo_frame(&self, index: usize) -> [f32; 2] {
        let left = self.channels[0].get(index).copied().unwrap_or(0.0);
        let right = self
            .channels
            .get(1)
            .and_then(|c| c.get(index).copied())
            .unwrap_or(left);
        [left, right]
    }

    /// Fresh buffer with the same format and a per-channel copy of the data.
    pub fn copy_channels(&self) -> Self {
        let mut copy = Self::silent(self.channel_count(), self.frames(), self.sample_rate);
        for (dst, src) in copy.channels.iter_mut().zip(&self.channels) {
            dst.copy_from_slice(src);
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave_round_trip() {
        let buffer = AudioBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 48000);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(1), Some(&[-0.1, -0.2, -0.3][..]));
        assert_eq!(buffer.to_interleaved(), vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }

    #[test]
    fn test_mono_frame_is_duplicated() {
        let buffer = AudioBuffer::from_channels(vec![vec![0.5, 0.25]], 44100);
        assert_eq!(buffer.stereo_frame(1), [0.25, 0.25]);
    }

    #[test]
    fn test_from_channels_pads_short_channels() {
        let buffer = AudioBuffer::from_channels(vec![vec![1.0, 1.0, 1.0], vec![1.0]], 44100);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(1), Some(&[1.0, 0.0, 0.0][..]));
    }

    #[test]
    fn test_copy_channels_is_independent() {
        let original = AudioBuffer::from_channels(vec![vec![0.5; 4]], 22050);
        let mut copy = original.copy_channels();
        copy.channel_mut(0).unwrap()[0] = 0.0;
        assert_eq!(original.channel(0).unwrap()[0], 0.5);
        assert_eq!(copy.sample_rate(), 22050);
    }
}
