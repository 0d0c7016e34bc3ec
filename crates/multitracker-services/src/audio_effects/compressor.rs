//! Feed-forward compressor with a soft knee

use multitracker_core::conversions::{db_to_gain, gain_to_db};
use multitracker_core::effects::{CompressorParam, CompressorSettings};

use super::AudioEffect;

const KNEE_DB: f32 = 30.0;

#[derive(Debug)]
pub struct CompressorEffect {
    threshold_db: f32,
    ratio: f32,
    attack_secs: f32,
    release_secs: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Smoothed gain reduction in dB (<= 0)
    envelope_db: f32,
    sample_rate: f32,
}

fn time_coeff(secs: f32, sample_rate: f32) -> f32 {
    if secs <= 0.0 { 0.0 } else { (-1.0 / (secs * sample_rate)).exp() }
}

impl CompressorEffect {
    pub fn new(settings: &CompressorSettings, sample_rate: f32) -> Self {
        Self {
            threshold_db: settings.threshold,
            ratio: settings.ratio,
            attack_secs: settings.attack,
            release_secs: settings.release,
            attack_coeff: time_coeff(settings.attack, sample_rate),
            release_coeff: time_coeff(settings.release, sample_rate),
            envelope_db: 0.0,
            sample_rate,
        }
    }

    pub fn set(&mut self, param: CompressorParam) {
        match param {
            CompressorParam::Threshold(db) => self.threshold_db = db,
            CompressorParam::Ratio(ratio) => self.ratio = ratio,
            CompressorParam::Attack(secs) => {
                self.attack_secs = secs;
                self.attack_coeff = time_coeff(secs, self.sample_rate);
            }
            CompressorParam::Release(secs) => {
                self.release_secs = secs;
                self.release_coeff = time_coeff(secs, self.sample_rate);
            }
            CompressorParam::Enabled(_) => {}
        }
    }

    /// Static curve: output level for an input level, both in dB
    pub fn curve(&self, input_db: f32) -> f32 {
        let over = input_db - self.threshold_db;
        let slope = 1.0 / self.ratio - 1.0;
        if 2.0 * over < -KNEE_DB {
            input_db
        } else if 2.0 * over.abs() <= KNEE_DB {
            input_db + slope * (over + KNEE_DB / 2.0).powi(2) / (2.0 * KNEE_DB)
        } else {
            self.threshold_db + over / self.ratio
        }
    }

    pub fn gain_reduction_db(&self) -> f32 {
        self.envelope_db
    }
}

impl AudioEffect for CompressorEffect {
    fn name(&self) -> &str { "Compressor" }

    fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let level_db = gain_to_db(frame[0].abs().max(frame[1].abs()));
        let target = self.curve(level_db) - level_db;
        let coeff = if target < self.envelope_db { self.attack_coeff } else { self.release_coeff };
        self.envelope_db = coeff * self.envelope_db + (1.0 - coeff) * target;
        let gain = db_to_gain(self.envelope_db);
        [frame[0] * gain, frame[1] * gain]
    }

    fn reset(&mut self) {
        self.envelope_db = 0.0;
    }
}
