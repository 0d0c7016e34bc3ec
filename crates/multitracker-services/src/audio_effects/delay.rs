//! Feedback delay, one ring buffer per channel

use std::fmt;

use multitracker_core::effects::{DelayParam, DelaySettings, DELAY_TIME_RANGE};

use super::AudioEffect;
use crate::smoothing::SmoothedParam;

pub struct DelayEffect {
    time_secs: f32,
    feedback: f32,
    mix: SmoothedParam,
    buffer: [Vec<f32>; 2],
    write_pos: usize,
    sample_rate: f32,
}

impl DelayEffect {
    pub fn new(settings: &DelaySettings, sample_rate: f32, ramp_frames: usize) -> Self {
        let max_samples = (DELAY_TIME_RANGE.1 * sample_rate) as usize + 1;
        Self {
            time_secs: settings.time,
            feedback: settings.feedback,
            mix: SmoothedParam::new(settings.mix, ramp_frames),
            buffer: [vec![0.0; max_samples], vec![0.0; max_samples]],
            write_pos: 0,
            sample_rate,
        }
    }

    pub fn set(&mut self, param: DelayParam) {
        match param {
            DelayParam::Time(secs) => self.time_secs = secs,
            DelayParam::Feedback(feedback) => self.feedback = feedback,
            DelayParam::Mix(mix) => self.mix.set_target(mix),
            DelayParam::Enabled(_) => {}
        }
    }

    pub fn time_secs(&self) -> f32 {
        self.time_secs
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }
}

impl fmt::Debug for DelayEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayEffect")
            .field("time_secs", &self.time_secs)
            .field("feedback", &self.feedback)
            .field("mix", &self.mix.target())
            .finish()
    }
}

impl AudioEffect for DelayEffect {
    fn name(&self) -> &str { "Delay" }

    fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let len = self.buffer[0].len();
        let delay_samples = ((self.time_secs * self.sample_rate) as usize).clamp(1, len - 1);
        let read_pos = (self.write_pos + len - delay_samples) % len;
        let mix = self.mix.next();

        let mut out = [0.0; 2];
        for ch in 0..2 {
            let delayed = self.buffer[ch][read_pos];
            self.buffer[ch][self.write_pos] = frame[ch] + delayed * self.feedback;
            out[ch] = frame[ch] * (1.0 - mix) + delayed * mix;
        }
        self.write_pos = (self.write_pos + 1) % len;
        out
    }

    fn reset(&mut self) {
        for buf in &mut self.buffer {
            buf.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_response(settings: &DelaySettings, frames: usize) -> Vec<f32> {
        let mut delay = DelayEffect::new(settings, 100.0, 1);
        (0..frames)
            .map(|i| delay.process(if i == 0 { [1.0, 1.0] } else { [0.0, 0.0] })[1])
            .collect()
    }

    #[test]
    fn test_echoes_decay_by_feedback() {
        let settings = DelaySettings { enabled: true, time: 0.1, feedback: 0.5, mix: 1.0 };
        let out = impulse_response(&settings, 35);
        assert_eq!(out[10], 1.0);
        assert_eq!(out[20], 0.5);
        assert_eq!(out[30], 0.25);
        assert_eq!(out[15], 0.0);
    }

    #[test]
    fn test_half_mix_keeps_dry_signal() {
        let settings = DelaySettings { enabled: true, time: 0.1, feedback: 0.0, mix: 0.5 };
        let out = impulse_response(&settings, 12);
        assert_eq!(out[0], 0.5);
        assert_eq!(out[10], 0.5);
    }

    #[test]
    fn test_longest_time_fits_buffer() {
        let settings = DelaySettings { enabled: true, time: 2.0, feedback: 0.0, mix: 1.0 };
        let out = impulse_response(&settings, 205);
        assert_eq!(out[200], 1.0);
    }
}
