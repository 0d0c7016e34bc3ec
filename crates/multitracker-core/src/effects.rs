//! Per-track effect parameters
//!
//! Parameters are stored here as plain data so they can be persisted with the
//! track record. The signal-processing units that consume them live in the
//! services crate; edits are expressed as tagged [`EffectParam`] values so
//! every band and unit is covered by exhaustive matching.

use serde::{Deserialize, Serialize};

pub const EQ_GAIN_LIMIT_DB: f32 = 24.0;
pub const CHORUS_RATE_RANGE: (f32, f32) = (0.1, 5.0);
pub const DELAY_TIME_RANGE: (f32, f32) = (0.01, 2.0);
/// Feedback stays strictly below 0.9 so the loop can never run away
pub const MAX_DELAY_FEEDBACK: f32 = 0.89;
pub const COMPRESSOR_THRESHOLD_RANGE: (f32, f32) = (-100.0, 0.0);
pub const COMPRESSOR_RATIO_RANGE: (f32, f32) = (1.0, 20.0);
pub const COMPRESSOR_TIME_RANGE: (f32, f32) = (0.0, 1.0);

/// EQ band selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    pub const ALL: [EqBand; 3] = [EqBand::Low, EqBand::Mid, EqBand::High];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EqParam {
    Low(f32),
    Mid(f32),
    High(f32),
    Enabled(bool),
}

impl EqParam {
    pub fn gain(band: EqBand, db: f32) -> Self {
        match band {
            EqBand::Low => Self::Low(db),
            EqBand::Mid => Self::Mid(db),
            EqBand::High => Self::High(db),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChorusParam {
    Depth(f32),
    Rate(f32),
    Mix(f32),
    Enabled(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DelayParam {
    Time(f32),
    Feedback(f32),
    Mix(f32),
    Enabled(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReverbParam {
    Mix(f32),
    Enabled(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CompressorParam {
    Threshold(f32),
    Ratio(f32),
    Attack(f32),
    Release(f32),
    Enabled(bool),
}

/// A single parameter edit addressed to one unit of a track's chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EffectParam {
    Eq(EqParam),
    Chorus(ChorusParam),
    Delay(DelayParam),
    Reverb(ReverbParam),
    Compressor(CompressorParam),
}

impl EffectParam {
    /// False when the edit carries NaN or an infinity.
    pub fn is_finite(&self) -> bool {
        let value = match *self {
            Self::Eq(EqParam::Low(v) | EqParam::Mid(v) | EqParam::High(v)) => v,
            Self::Chorus(ChorusParam::Depth(v) | ChorusParam::Rate(v) | ChorusParam::Mix(v)) => v,
            Self::Delay(DelayParam::Time(v) | DelayParam::Feedback(v) | DelayParam::Mix(v)) => v,
            Self::Reverb(ReverbParam::Mix(v)) => v,
            Self::Compressor(
                CompressorParam::Threshold(v)
                | CompressorParam::Ratio(v)
                | CompressorParam::Attack(v)
                | CompressorParam::Release(v),
            ) => v,
            Self::Eq(EqParam::Enabled(_))
            | Self::Chorus(ChorusParam::Enabled(_))
            | Self::Delay(DelayParam::Enabled(_))
            | Self::Reverb(ReverbParam::Enabled(_))
            | Self::Compressor(CompressorParam::Enabled(_)) => return true,
        };
        value.is_finite()
    }

    /// Same edit with its value forced into the unit's legal range
    pub fn clamped(self) -> Self {
        let unit = |v: f32| v.clamp(0.0, 1.0);
        match self {
            Self::Eq(p) => Self::Eq(match p {
                EqParam::Low(db) => EqParam::Low(db.clamp(-EQ_GAIN_LIMIT_DB, EQ_GAIN_LIMIT_DB)),
                EqParam::Mid(db) => EqParam::Mid(db.clamp(-EQ_GAIN_LIMIT_DB, EQ_GAIN_LIMIT_DB)),
                EqParam::High(db) => EqParam::High(db.clamp(-EQ_GAIN_LIMIT_DB, EQ_GAIN_LIMIT_DB)),
                EqParam::Enabled(on) => EqParam::Enabled(on),
            }),
            Self::Chorus(p) => Self::Chorus(match p {
                ChorusParam::Depth(v) => ChorusParam::Depth(unit(v)),
                ChorusParam::Rate(hz) => {
                    ChorusParam::Rate(hz.clamp(CHORUS_RATE_RANGE.0, CHORUS_RATE_RANGE.1))
                }
                ChorusParam::Mix(v) => ChorusParam::Mix(unit(v)),
                ChorusParam::Enabled(on) => ChorusParam::Enabled(on),
            }),
            Self::Delay(p) => Self::Delay(match p {
                DelayParam::Time(s) => DelayParam::Time(s.clamp(DELAY_TIME_RANGE.0, DELAY_TIME_RANGE.1)),
                DelayParam::Feedback(v) => DelayParam::Feedback(v.clamp(0.0, MAX_DELAY_FEEDBACK)),
                DelayParam::Mix(v) => DelayParam::Mix(unit(v)),
                DelayParam::Enabled(on) => DelayParam::Enabled(on),
            }),
            Self::Reverb(p) => Self::Reverb(match p {
                ReverbParam::Mix(v) => ReverbParam::Mix(unit(v)),
                ReverbParam::Enabled(on) => ReverbParam::Enabled(on),
            }),
            Self::Compressor(p) => Self::Compressor(match p {
                CompressorParam::Threshold(db) => CompressorParam::Threshold(
                    db.clamp(COMPRESSOR_THRESHOLD_RANGE.0, COMPRESSOR_THRESHOLD_RANGE.1),
                ),
                CompressorParam::Ratio(r) => {
                    CompressorParam::Ratio(r.clamp(COMPRESSOR_RATIO_RANGE.0, COMPRESSOR_RATIO_RANGE.1))
                }
                CompressorParam::Attack(s) => {
                    CompressorParam::Attack(s.clamp(COMPRESSOR_TIME_RANGE.0, COMPRESSOR_TIME_RANGE.1))
                }
                CompressorParam::Release(s) => {
                    CompressorParam::Release(s.clamp(COMPRESSOR_TIME_RANGE.0, COMPRESSOR_TIME_RANGE.1))
                }
                CompressorParam::Enabled(on) => CompressorParam::Enabled(on),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqSettings {
    pub enabled: bool,
    pub low_gain: f32,
    pub mid_gain: f32,
    pub high_gain: f32,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self { enabled: true, low_gain: 0.0, mid_gain: 0.0, high_gain: 0.0 }
    }
}

impl EqSettings {
    pub fn gain(&self, band: EqBand) -> f32 {
        match band {
            EqBand::Low => self.low_gain,
            EqBand::Mid => self.mid_gain,
            EqBand::High => self.high_gain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChorusSettings {
    pub enabled: bool,
    /// Modulation depth, 0..1 (1.0 swings the delay by 10 ms)
    pub depth: f32,
    /// LFO rate in Hz
    pub rate: f32,
    pub mix: f32,
}

impl Default for ChorusSettings {
    fn default() -> Self {
        Self { enabled: false, depth: 0.5, rate: 0.5, mix: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelaySettings {
    pub enabled: bool,
    /// Delay time in seconds
    pub time: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self { enabled: false, time: 0.5, feedback: 0.3, mix: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverbSettings {
    pub enabled: bool,
    pub mix: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self { enabled: false, mix: 0.3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressorSettings {
    pub enabled: bool,
    /// Threshold in dBFS
    pub threshold: f32,
    pub ratio: f32,
    /// Attack in seconds
    pub attack: f32,
    /// Release in seconds
    pub release: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self { enabled: false, threshold: -24.0, ratio: 12.0, attack: 0.003, release: 0.25 }
    }
}

/// Complete effect parameter set of one track
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub eq: EqSettings,
    pub chorus: ChorusSettings,
    pub delay: DelaySettings,
    pub reverb: ReverbSettings,
    pub compressor: CompressorSettings,
}

impl EffectSettings {
    /// Store an edit, returning the clamped value that was stored. Non-finite
    /// edits are rejected and leave the settings untouched.
    pub fn apply(&mut self, param: EffectParam) -> Option<EffectParam> {
        if !param.is_finite() {
            return None;
        }
        let param = param.clamped();
        match param {
            EffectParam::Eq(p) => match p {
                EqParam::Low(db) => self.eq.low_gain = db,
                EqParam::Mid(db) => self.eq.mid_gain = db,
                EqParam::High(db) => self.eq.high_gain = db,
                EqParam::Enabled(on) => self.eq.enabled = on,
            },
            EffectParam::Chorus(p) => match p {
                ChorusParam::Depth(v) => self.chorus.depth = v,
                ChorusParam::Rate(v) => self.chorus.rate = v,
                ChorusParam::Mix(v) => self.chorus.mix = v,
                ChorusParam::Enabled(on) => self.chorus.enabled = on,
            },
            EffectParam::Delay(p) => match p {
                DelayParam::Time(v) => self.delay.time = v,
                DelayParam::Feedback(v) => self.delay.feedback = v,
                DelayParam::Mix(v) => self.delay.mix = v,
                DelayParam::Enabled(on) => self.delay.enabled = on,
            },
            EffectParam::Reverb(p) => match p {
                ReverbParam::Mix(v) => self.reverb.mix = v,
                ReverbParam::Enabled(on) => self.reverb.enabled = on,
            },
            EffectParam::Compressor(p) => match p {
                CompressorParam::Threshold(v) => self.compressor.threshold = v,
                CompressorParam::Ratio(v) => self.compressor.ratio = v,
                CompressorParam::Attack(v) => self.compressor.attack = v,
                CompressorParam::Release(v) => self.compressor.release = v,
                CompressorParam::Enabled(on) => self.compressor.enabled = on,
            },
        }
        Some(param)
    }

    /// Every stored value expressed as edits, in chain order
    pub fn as_params(&self) -> Vec<EffectParam> {
        let EffectSettings { eq, chorus, delay, reverb, compressor } = *self;
        vec![
            EffectParam::Eq(EqParam::Low(eq.low_gain)),
            EffectParam::Eq(EqParam::Mid(eq.mid_gain)),
            EffectParam::Eq(EqParam::High(eq.high_gain)),
            EffectParam::Eq(EqParam::Enabled(eq.enabled)),
            EffectParam::Chorus(ChorusParam::Depth(chorus.depth)),
            EffectParam::Chorus(ChorusParam::Rate(chorus.rate)),
            EffectParam::Chorus(ChorusParam::Mix(chorus.mix)),
            EffectParam::Chorus(ChorusParam::Enabled(chorus.enabled)),
            EffectParam::Delay(DelayParam::Time(delay.time)),
            EffectParam::Delay(DelayParam::Feedback(delay.feedback)),
            EffectParam::Delay(DelayParam::Mix(delay.mix)),
            EffectParam::Delay(DelayParam::Enabled(delay.enabled)),
            EffectParam::Reverb(ReverbParam::Mix(reverb.mix)),
            EffectParam::Reverb(ReverbParam::Enabled(reverb.enabled)),
            EffectParam::Compressor(CompressorParam::Threshold(compressor.threshold)),
            EffectParam::Compressor(CompressorParam::Ratio(compressor.ratio)),
            EffectParam::Compressor(CompressorParam::Attack(compressor.attack)),
            EffectParam::Compressor(CompressorParam::Release(compressor.release)),
            EffectParam::Compressor(CompressorParam::Enabled(compressor.enabled)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_is_capped_below_runaway() {
        let mut settings = EffectSettings::default();
        let stored = settings.apply(EffectParam::Delay(DelayParam::Feedback(1.5)));
        assert_eq!(stored, Some(EffectParam::Delay(DelayParam::Feedback(MAX_DELAY_FEEDBACK))));
        assert!(settings.delay.feedback < 0.9);
    }

    #[test]
    fn test_non_finite_edit_is_rejected() {
        let mut settings = EffectSettings::default();
        settings.apply(EffectParam::Eq(EqParam::Mid(3.0)));
        assert_eq!(settings.apply(EffectParam::Eq(EqParam::Mid(f32::NAN))), None);
        assert_eq!(settings.apply(EffectParam::Delay(DelayParam::Time(f32::INFINITY))), None);
        assert_eq!(settings.eq.mid_gain, 3.0);
        assert_eq!(settings.delay, DelaySettings::default());
        assert!(EffectParam::Reverb(ReverbParam::Enabled(true)).is_finite());
    }

    #[test]
    fn test_disable_keeps_band_gains() {
        let mut settings = EffectSettings::default();
        settings.apply(EffectParam::Eq(EqParam::Low(6.0)));
        settings.apply(EffectParam::Eq(EqParam::Enabled(false)));
        assert_eq!(settings.eq.gain(EqBand::Low), 6.0);
        settings.apply(EffectParam::Eq(EqParam::Enabled(true)));
        assert_eq!(settings.eq.gain(EqBand::Low), 6.0);
    }

    #[test]
    fn test_as_params_replays_to_same_settings() {
        let mut source = EffectSettings::default();
        source.apply(EffectParam::Chorus(ChorusParam::Rate(2.0)));
        source.apply(EffectParam::Compressor(CompressorParam::Enabled(true)));
        source.apply(EffectParam::Eq(EqParam::gain(EqBand::High, -3.0)));

        let mut replayed = EffectSettings::default();
        for param in source.as_params() {
            replayed.apply(param);
        }
        assert_eq!(replayed, source);
    }
}
