//! Engine configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Working sample rate used for detached rendering and offline mixdown
    pub sample_rate: u32,
    /// Length of gain and bypass ramps in milliseconds
    pub smoothing_ms: f32,
    /// Samples of history kept by each level tap
    pub tap_size: usize,
    /// Reverb impulse length is `room_size * 4` seconds
    pub reverb_room_size: f32,
    /// Lower bound on project length used by mix export
    pub min_project_secs: f64,
    pub metronome_bpm: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            smoothing_ms: 10.0,
            tap_size: 2048,
            reverb_room_size: 0.5,
            min_project_secs: 60.0,
            metronome_bpm: 120.0,
        }
    }
}

impl EngineConfig {
    pub fn smoothing_frames(&self, sample_rate: u32) -> usize {
        ((self.smoothing_ms / 1000.0) * sample_rate as f32).round().max(1.0) as usize
    }
}
