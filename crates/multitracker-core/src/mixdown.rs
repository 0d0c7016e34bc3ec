//! Offline additive mixdown

use crate::buffer::AudioBuffer;
use crate::mixing;
use crate::track::Track;

/// Sum every audible track into a stereo buffer of
/// `ceil(duration_secs * sample_rate)` frames.
///
/// Each track contributes `volume * sample` for as many frames as both it and
/// the output have. Mono sources feed both channels. Nothing is limited here;
/// out-of-range sums are left for the encoder to clamp.
pub fn mixdown<'a>(
    tracks: &[(&'a Track, Option<&'a AudioBuffer>)],
    duration_secs: f64,
    sample_rate: u32,
) -> AudioBuffer {
    let frames = (duration_secs.max(0.0) * sample_rate as f64).ceil() as usize;
    let mut out = AudioBuffer::silent(2, frames, sample_rate);
    let solo = mixing::any_solo(tracks.iter().map(|(t, _)| *t));

    for (track, buffer) in tracks {
        let Some(buffer) = buffer else { continue };
        if !mixing::is_audible(track, solo) || buffer.channel_count() == 0 {
            continue;
        }
        let len = buffer.frames().min(frames);
        for ch in 0..2 {
            let src_ch = ch.min(buffer.channel_count() - 1);
            let (Some(src), Some(dst)) = (buffer.channel(src_ch), out.channel_mut(ch)) else {
                continue;
            };
            for (d, s) in dst[..len].iter_mut().zip(&src[..len]) {
                *d += track.volume * s;
            }
        }
    }
    out
}
