//! Transport state and controls
//!
//! Position is derived from a clock supplied by the caller (the engine passes
//! its audio clock), so the state machine itself holds no timers.

use serde::{Deserialize, Serialize};

use crate::conversions;

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    /// Clock reading at the last start, and the position at that moment
    Playing { anchor: f64, elapsed: f64 },
    Paused { elapsed: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transport {
    pub state: TransportState,
    /// Tempo in BPM
    pub bpm: f64,
}

impl Default for Transport {
    fn default() -> Self {
        Self { state: TransportState::Stopped, bpm: 120.0 }
    }
}

impl Transport {
    pub fn new(bpm: f64) -> Self {
        Self { bpm, ..Default::default() }
    }

    /// Start from the stored position. Returns false if already playing.
    pub fn play(&mut self, now: f64) -> bool {
        if self.is_playing() {
            return false;
        }
        let elapsed = self.position(now);
        self.state = TransportState::Playing { anchor: now, elapsed };
        true
    }

    /// Snap the running position, then hold it. Returns false if not playing.
    pub fn pause(&mut self, now: f64) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.state = TransportState::Paused { elapsed: self.position(now) };
        true
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    /// Move to `secs`. Playing stays playing, re-anchored at `now`; a stopped
    /// transport becomes paused so the position is kept.
    pub fn seek(&mut self, secs: f64, now: f64) {
        let elapsed = secs.max(0.0);
        self.state = match self.state {
            TransportState::Playing { .. } => TransportState::Playing { anchor: now, elapsed },
            TransportState::Paused { .. } | TransportState::Stopped => {
                TransportState::Paused { elapsed }
            }
        };
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, TransportState::Playing { .. })
    }

    /// Position in seconds at clock reading `now`
    pub fn position(&self, now: f64) -> f64 {
        match self.state {
            TransportState::Stopped => 0.0,
            TransportState::Playing { anchor, elapsed } => elapsed + (now - anchor).max(0.0),
            TransportState::Paused { elapsed } => elapsed,
        }
    }

    /// Format position as MM:SS.cc
    pub fn format_time(&self, now: f64) -> String {
        conversions::format_time(self.position(now))
    }

    /// Samples per beat at current tempo
    pub fn samples_per_beat(&self, sample_rate: u32) -> f64 {
        sample_rate as f64 * 60.0 / self.bpm
    }

    /// Current beat number (0-indexed)
    pub fn current_beat(&self, now: f64) -> f64 {
        conversions::time_to_beats(self.position(now), self.bpm)
    }
}
