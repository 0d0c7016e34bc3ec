//! Chorus: one LFO-modulated delay line per channel

use std::f32::consts::TAU;

use multitracker_core::effects::{ChorusParam, ChorusSettings};

use super::AudioEffect;
use crate::smoothing::SmoothedParam;

const BASE_DELAY_SECS: f32 = 0.02;
/// Modulation swing in seconds at depth 1.0
const DEPTH_SCALE_SECS: f32 = 0.01;

#[derive(Debug)]
pub struct ChorusEffect {
    depth: f32,
    rate: f32,
    mix: SmoothedParam,
    phase: f32,
    buffer: [Vec<f32>; 2],
    write_pos: usize,
    sample_rate: f32,
}

impl ChorusEffect {
    pub fn new(settings: &ChorusSettings, sample_rate: f32, ramp_frames: usize) -> Self {
        let len = ((BASE_DELAY_SECS + DEPTH_SCALE_SECS) * sample_rate) as usize + 4;
        Self {
            depth: settings.depth,
            rate: settings.rate,
            mix: SmoothedParam::new(settings.mix, ramp_frames),
            phase: 0.0,
            buffer: [vec![0.0; len], vec![0.0; len]],
            write_pos: 0,
            sample_rate,
        }
    }

    pub fn set(&mut self, param: ChorusParam) {
        match param {
            ChorusParam::Depth(depth) => self.depth = depth,
            ChorusParam::Rate(rate) => self.rate = rate,
            ChorusParam::Mix(mix) => self.mix.set_target(mix),
            ChorusParam::Enabled(_) => {}
        }
    }

    pub fn mix(&self) -> f32 {
        self.mix.target()
    }

    /// Fractional read, `delay` samples behind the write head
    fn read(&self, channel: usize, delay: f32) -> f32 {
        let buf = &self.buffer[channel];
        let len = buf.len();
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;
        let a = buf[(self.write_pos + len - whole) % len];
        let b = buf[(self.write_pos + len - whole - 1) % len];
        a + (b - a) * frac
    }
}

impl AudioEffect for ChorusEffect {
    fn name(&self) -> &str { "Chorus" }

    fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let swing = self.depth * DEPTH_SCALE_SECS * self.phase.sin();
        let delay = ((BASE_DELAY_SECS + swing) * self.sample_rate).max(1.0);
        let mix = self.mix.next();

        let mut out = [0.0; 2];
        for ch in 0..2 {
            self.buffer[ch][self.write_pos] = frame[ch];
            let wet = self.read(ch, delay);
            out[ch] = frame[ch] * (1.0 - mix) + wet * mix;
        }

        self.write_pos = (self.write_pos + 1) % self.buffer[0].len();
        self.phase = (self.phase + TAU * self.rate / self.sample_rate) % TAU;
        out
    }

    fn reset(&mut self) {
        for buf in &mut self.buffer {
            buf.fill(0.0);
        }
        self.phase = 0.0;
    }
}
