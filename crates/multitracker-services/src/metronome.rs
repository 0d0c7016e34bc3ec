//! Click track locked to the transport position

use std::f32::consts::TAU;

const CLICK_HZ: f32 = 800.0;
const CLICK_SECS: f32 = 0.1;
const CLICK_START: f32 = 0.1;
const CLICK_END: f32 = 0.01;

#[derive(Debug, Clone)]
pub struct Metronome {
    enabled: bool,
    bpm: f64,
    sample_rate: u32,
    last_beat: Option<u64>,
    /// Frames into the current click, if one is sounding
    click_frame: Option<usize>,
}

impl Metronome {
    pub fn new(bpm: f64, sample_rate: u32) -> Self {
        Self { enabled: false, bpm, sample_rate, last_beat: None, click_frame: None }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.rewind();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm.max(1.0);
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Forget the beat phase so the next position triggers afresh.
    pub fn rewind(&mut self) {
        self.last_beat = None;
        self.click_frame = None;
    }

    /// Click sample for the frame at transport position `position_frames`.
    #[inline]
    pub fn sample_at(&mut self, position_frames: u64) -> f32 {
        if !self.enabled {
            return 0.0;
        }
        let frames_per_beat = self.sample_rate as f64 * 60.0 / self.bpm;
        let beat = (position_frames as f64 / frames_per_beat).floor() as u64;
        if self.last_beat != Some(beat) {
            self.last_beat = Some(beat);
            self.click_frame = Some(0);
        }

        let Some(n) = self.click_frame else { return 0.0 };
        let t = n as f32 / self.sample_rate as f32;
        if t >= CLICK_SECS {
            self.click_frame = None;
            return 0.0;
        }
        self.click_frame = Some(n + 1);
        let amp = CLICK_START * (CLICK_END / CLICK_START).powf(t / CLICK_SECS);
        amp * (TAU * CLICK_HZ * t).sin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_silent() {
        let mut m = Metronome::new(120.0, 8000);
        assert!((0..8000).all(|i| m.sample_at(i) == 0.0));
    }

    #[test]
    fn test_clicks_on_every_beat() {
        let sr = 8000;
        let mut m = Metronome::new(120.0, sr);
        m.set_enabled(true);
        let out: Vec<f32> = (0..sr as u64 * 2).map(|i| m.sample_at(i)).collect();
        // Four beats in two seconds, each click 0.1 s long.
        let click = (sr as f32 * CLICK_SECS) as usize;
        for beat in 0..4 {
            let start = beat * 4000;
            let energy: f32 = out[start..start + click].iter().map(|s| s.abs()).sum();
            assert!(energy > 1.0);
            let gap: f32 = out[start + click + 10..start + 3900].iter().map(|s| s.abs()).sum();
            assert_eq!(gap, 0.0);
        }
    }

    #[test]
    fn test_click_decays() {
        let sr = 48000;
        let mut m = Metronome::new(60.0, sr);
        m.set_enabled(true);
        let out: Vec<f32> = (0..4800).map(|i| m.sample_at(i)).collect();
        let head = out[..480].iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        let tail = out[4320..].iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        assert!(head > 0.05);
        assert!(tail < 0.015);
    }
}
