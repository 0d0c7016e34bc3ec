//! Track metadata and its persisted record shape

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::effects::{EffectParam, EffectSettings};

/// Unique identifier for tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Control-side state of one track. Audio buffers and processing units are
/// owned by the engine, keyed by the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    /// Volume (0.0 to 1.0)
    pub volume: f32,
    /// Pan (-1.0 left, 0.0 center, 1.0 right)
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub effects: EffectSettings,
}

impl Track {
    pub fn new(id: TrackId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            volume: 1.0,
            pan: 0.0,
            muted: false,
            solo: false,
            effects: EffectSettings::default(),
        }
    }

    /// Returns false, leaving the volume unchanged, for a non-finite value.
    pub fn set_volume(&mut self, volume: f32) -> bool {
        if !volume.is_finite() {
            return false;
        }
        self.volume = volume.clamp(0.0, 1.0);
        true
    }

    /// Returns false, leaving the pan unchanged, for a non-finite value.
    pub fn set_pan(&mut self, pan: f32) -> bool {
        if !pan.is_finite() {
            return false;
        }
        self.pan = pan.clamp(-1.0, 1.0);
        true
    }

    pub fn apply_effect(&mut self, param: EffectParam) -> Option<EffectParam> {
        self.effects.apply(param)
    }

    pub fn to_record(&self, has_audio: bool) -> TrackRecord {
        TrackRecord {
            id: self.id,
            name: self.name.clone(),
            volume: self.volume,
            pan: self.pan,
            muted: self.muted,
            solo: self.solo,
            effects: self.effects,
            has_audio,
        }
    }

    pub fn from_record(record: &TrackRecord) -> Self {
        let mut track = Self::new(record.id, record.name.clone());
        track.set_volume(record.volume);
        track.set_pan(record.pan);
        track.muted = record.muted;
        track.solo = record.solo;
        for param in record.effects.as_params() {
            track.apply_effect(param);
        }
        track
    }
}

/// Persisted track metadata. Audio is never embedded; `has_audio` tells the
/// loader whether a clip keyed by `id` should be fetched and decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    pub id: TrackId,
    pub name: String,
    pub volume: f32,
    pub pan: f32,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub effects: EffectSettings,
    #[serde(default)]
    pub has_audio: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub name: String,
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub tracks: Vec<TrackRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{DelayParam, EqParam};

    #[test]
    fn test_volume_and_pan_are_clamped() {
        let mut track = Track::new(TrackId(1), "Vox");
        track.set_volume(1.7);
        track.set_pan(-3.0);
        assert_eq!(track.volume, 1.0);
        assert_eq!(track.pan, -1.0);
    }

    #[test]
    fn test_non_finite_volume_and_pan_are_ignored() {
        let mut track = Track::new(TrackId(1), "Vox");
        track.set_volume(0.6);
        track.set_pan(0.25);
        assert!(!track.set_volume(f32::NAN));
        assert!(!track.set_pan(f32::NEG_INFINITY));
        assert_eq!(track.volume, 0.6);
        assert_eq!(track.pan, 0.25);
    }

    #[test]
    fn test_record_uses_persisted_field_names() {
        let mut track = Track::new(TrackId(7), "Bass");
        track.muted = true;
        let json = serde_json::to_value(track.to_record(true)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["hasAudio"], true);
        assert_eq!(json["muted"], true);
        assert!(json["effects"]["eq"]["lowGain"].is_number());
    }

    #[test]
    fn test_from_record_restores_parameters() {
        let mut track = Track::new(TrackId(3), "Keys");
        track.set_volume(0.4);
        track.solo = true;
        track.apply_effect(EffectParam::Eq(EqParam::Mid(-4.5)));
        track.apply_effect(EffectParam::Delay(DelayParam::Enabled(true)));

        let json = serde_json::to_string(&track.to_record(false)).unwrap();
        let record: TrackRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(Track::from_record(&record), track);
    }

    #[test]
    fn test_minimal_record_gets_defaults() {
        let record: TrackRecord =
            serde_json::from_str(r#"{"id":2,"name":"Drums","volume":0.8,"pan":0}"#).unwrap();
        assert!(!record.has_audio);
        assert_eq!(record.effects, EffectSettings::default());
    }
}
