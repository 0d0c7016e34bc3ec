//! Mute/solo resolution
//!
//! Effective gain is recomputed for every track in one pass whenever any
//! track's mute, solo or volume changes. If any track is soloed only soloed
//! tracks are heard; otherwise every unmuted track is.

use std::collections::HashMap;

use crate::track::{Track, TrackId};

pub fn any_solo<'a>(tracks: impl IntoIterator<Item = &'a Track>) -> bool {
    tracks.into_iter().any(|t| t.solo)
}

pub fn is_audible(track: &Track, any_solo: bool) -> bool {
    if any_solo { track.solo } else { !track.muted }
}

pub fn effective_gain(track: &Track, any_solo: bool) -> f32 {
    if is_audible(track, any_solo) { track.volume } else { 0.0 }
}

/// Effective gain of every track
pub fn resolve_gains<'a, I>(tracks: I) -> HashMap<TrackId, f32>
where
    I: IntoIterator<Item = &'a Track>,
    I::IntoIter: Clone,
{
    let iter = tracks.into_iter();
    let solo = any_solo(iter.clone());
    iter.map(|t| (t.id, effective_gain(t, solo))).collect()
}

/// Flip solo on `target`, clearing it everywhere else. Returns the new solo
/// state of the target, or `None` if it is not in the set.
pub fn toggle_solo<'a>(
    tracks: impl IntoIterator<Item = &'a mut Track>,
    target: TrackId,
) -> Option<bool> {
    let mut tracks: Vec<&mut Track> = tracks.into_iter().collect();
    let now_solo = !tracks.iter().find(|t| t.id == target)?.solo;
    for track in tracks.iter_mut() {
        track.solo = track.id == target && now_solo;
    }
    Some(now_solo)
}
