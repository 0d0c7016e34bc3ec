//! One track's live processing: source, gain, effects, pan and tap

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use multitracker_core::{AudioBuffer, EffectParam, EngineConfig, Track};

use crate::audio_effects::EffectChain;
use crate::level_tap::LevelTap;
use crate::smoothing::SmoothedParam;

/// A cursor reading one buffer from a start frame. Sources are never paused;
/// transport changes drop them and start fresh ones at the new offset.
#[derive(Debug, Clone)]
pub struct PlaybackSource {
    buffer: Arc<AudioBuffer>,
    frame: usize,
}

impl PlaybackSource {
    /// `None` when the offset is at or past the end of the buffer.
    pub fn start(buffer: Arc<AudioBuffer>, offset_frames: usize) -> Option<Self> {
        (offset_frames < buffer.frames()).then_some(Self { buffer, frame: offset_frames })
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn reads(&self, buffer: &Arc<AudioBuffer>) -> bool {
        Arc::ptr_eq(&self.buffer, buffer)
    }

    #[inline]
    fn next(&mut self) -> Option<[f32; 2]> {
        if self.frame >= self.buffer.frames() {
            return None;
        }
        let out = self.buffer.stereo_frame(self.frame);
        self.frame += 1;
        Some(out)
    }
}

/// Equal-power stereo pan of a stereo frame
#[inline]
pub fn pan_frame(frame: [f32; 2], pan: f32) -> [f32; 2] {
    if pan == 0.0 {
        return frame;
    }
    let [l, r] = frame;
    if pan < 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        [l + r * x.cos(), r * x.sin()]
    } else {
        let x = pan * FRAC_PI_2;
        [l * x.cos(), r + l * x.sin()]
    }
}

/// A track as it exists in the signal graph.
///
/// Chain order: gain, EQ, chorus, delay, reverb, compressor, pan, tap.
#[derive(Debug)]
pub struct TrackStrip {
    pub meta: Track,
    chain: EffectChain,
    gain: SmoothedParam,
    pan: SmoothedParam,
    tap: Arc<LevelTap>,
    buffer: Option<Arc<AudioBuffer>>,
    source: Option<PlaybackSource>,
    scratch: Vec<f32>,
}

impl TrackStrip {
    pub fn new(meta: Track, sample_rate: u32, config: &EngineConfig) -> Self {
        let ramp = config.smoothing_frames(sample_rate);
        let chain = EffectChain::new(&meta.effects, sample_rate, ramp, config.reverb_room_size);
        let pan = SmoothedParam::new(meta.pan, ramp);
        Self {
            meta,
            chain,
            gain: SmoothedParam::new(0.0, ramp),
            pan,
            tap: Arc::new(LevelTap::new(config.tap_size)),
            buffer: None,
            source: None,
            scratch: Vec::new(),
        }
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub fn tap(&self) -> Arc<LevelTap> {
        self.tap.clone()
    }

    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    pub fn source(&self) -> Option<&PlaybackSource> {
        self.source.as_ref()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Target gain after mute/solo resolution
    pub fn set_effective_gain(&mut self, gain: f32) {
        self.gain.set_target(gain);
    }

    pub fn effective_gain(&self) -> f32 {
        self.gain.target()
    }

    /// Jump to the resolved gain without a ramp, for strips that have not
    /// been rendered yet.
    pub fn snap_gain(&mut self) {
        self.gain.set_immediate(self.gain.target());
    }

    pub fn set_pan(&mut self, pan: f32) {
        if self.meta.set_pan(pan) {
            self.pan.set_target(self.meta.pan);
        }
    }

    /// Store the edit on the track and forward it to the live unit. Returns
    /// the stored value, or `None` for a rejected non-finite edit.
    pub fn apply_effect(&mut self, param: EffectParam) -> Option<EffectParam> {
        let stored = self.meta.apply_effect(param)?;
        self.chain.apply(stored);
        Some(stored)
    }

    /// Swap the buffer. Any source reading the old one is dropped first.
    pub fn replace_buffer(&mut self, buffer: Option<Arc<AudioBuffer>>) {
        self.stop_source();
        self.buffer = buffer;
    }

    /// Begin playback at `offset_frames`, replacing any running source.
    pub fn start_source(&mut self, offset_frames: usize) -> bool {
        self.stop_source();
        self.source = self
            .buffer
            .clone()
            .and_then(|buffer| PlaybackSource::start(buffer, offset_frames));
        self.source.is_some()
    }

    pub fn stop_source(&mut self) {
        self.source = None;
    }

    /// Render `left.len()` frames, adding the strip's output into the mix.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.scratch.clear();
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let input = match self.source.as_mut().map(PlaybackSource::next) {
                Some(Some(frame)) => frame,
                Some(None) => {
                    self.source = None;
                    [0.0; 2]
                }
                None => [0.0; 2],
            };
            let g = self.gain.next();
            let frame = self.chain.process([input[0] * g, input[1] * g]);
            let [out_l, out_r] = pan_frame(frame, self.pan.next());
            self.scratch.push((out_l + out_r) * 0.5);
            *l += out_l;
            *r += out_r;
        }
        self.tap.push(&self.scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multitracker_core::TrackId;

    const SR: u32 = 1000;

    fn strip_with(samples: Vec<f32>) -> TrackStrip {
        let mut strip = TrackStrip::new(Track::new(TrackId(1), "t"), SR, &EngineConfig::default());
        strip.set_effective_gain(1.0);
        strip.snap_gain();
        strip.replace_buffer(Some(Arc::new(AudioBuffer::from_channels(vec![samples], SR))));
        strip
    }

    fn render(strip: &mut TrackStrip, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        strip.render(&mut l, &mut r);
        (l, r)
    }

    #[test]
    fn test_pan_law() {
        assert_eq!(pan_frame([0.3, 0.6], 0.0), [0.3, 0.6]);
        let [l, r] = pan_frame([1.0, 1.0], 1.0);
        assert!(l.abs() < 1e-6 && (r - 2.0).abs() < 1e-6);
        let [l, r] = pan_frame([1.0, 0.0], -1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
    }

    #[test]
    fn test_source_plays_from_offset_then_ends() {
        let mut strip = strip_with((0..10).map(|i| i as f32 / 10.0).collect());
        assert!(strip.start_source(6));
        let (l, r) = render(&mut strip, 6);
        assert_eq!(l, vec![0.6, 0.7, 0.8, 0.9, 0.0, 0.0]);
        assert_eq!(l, r);
        assert!(!strip.has_source());
    }

    #[test]
    fn test_offset_past_end_starts_nothing() {
        let mut strip = strip_with(vec![0.5; 4]);
        assert!(!strip.start_source(4));
    }

    #[test]
    fn test_replacing_buffer_stops_source() {
        let mut strip = strip_with(vec![0.5; 100]);
        strip.start_source(0);
        render(&mut strip, 10);
        strip.replace_buffer(Some(Arc::new(AudioBuffer::from_channels(vec![vec![0.25; 100]], SR))));
        assert!(!strip.has_source());
        let (l, _) = render(&mut strip, 5);
        assert!(l.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_tap_sees_post_pan_signal() {
        let mut strip = strip_with(vec![0.5; 50]);
        strip.start_source(0);
        render(&mut strip, 50);
        assert!((strip.tap().peak() - 0.5).abs() < 1e-6);
    }
}
