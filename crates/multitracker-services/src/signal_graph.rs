//! The live mixer graph: every track strip, the master bus and the transport
//!
//! The graph is owned by the engine behind one mutex, so every control edit
//! (including the all-track mute/solo pass) is atomic with respect to the
//! render callback. Time is the audio clock: frames rendered so far divided
//! by the sample rate.

use std::collections::HashMap;
use std::sync::Arc;

use multitracker_core::{mixing, AudioBuffer, EngineConfig, Track, TrackId, Transport};
use tracing::debug;

use crate::level_tap::LevelTap;
use crate::metronome::Metronome;
use crate::smoothing::SmoothedParam;
use crate::track_strip::TrackStrip;

pub struct SignalGraph {
    sample_rate: u32,
    config: EngineConfig,
    strips: HashMap<TrackId, TrackStrip>,
    /// Insertion order, for display and export
    order: Vec<TrackId>,
    master_volume: f32,
    master_gain: SmoothedParam,
    master_tap: Arc<LevelTap>,
    transport: Transport,
    clock_frames: u64,
    metronome: Metronome,
    mix_l: Vec<f32>,
    mix_r: Vec<f32>,
    tap_scratch: Vec<f32>,
}

impl SignalGraph {
    pub fn new(sample_rate: u32, config: &EngineConfig) -> Self {
        let ramp = config.smoothing_frames(sample_rate);
        Self {
            sample_rate,
            config: config.clone(),
            strips: HashMap::new(),
            order: Vec::new(),
            master_volume: 1.0,
            master_gain: SmoothedParam::new(1.0, ramp),
            master_tap: Arc::new(LevelTap::new(config.tap_size)),
            transport: Transport::new(config.metronome_bpm),
            clock_frames: 0,
            metronome: Metronome::new(config.metronome_bpm, sample_rate),
            mix_l: Vec::new(),
            mix_r: Vec::new(),
            tap_scratch: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Audio clock in seconds
    pub fn now(&self) -> f64 {
        self.clock_frames as f64 / self.sample_rate as f64
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Transport position in seconds
    pub fn position(&self) -> f64 {
        self.transport.position(self.now())
    }

    pub fn track_ids(&self) -> &[TrackId] {
        &self.order
    }

    pub fn strip(&self, id: TrackId) -> Option<&TrackStrip> {
        self.strips.get(&id)
    }

    pub fn strip_mut(&mut self, id: TrackId) -> Option<&mut TrackStrip> {
        self.strips.get_mut(&id)
    }

    pub fn strips(&self) -> impl Iterator<Item = &TrackStrip> {
        self.order.iter().filter_map(|id| self.strips.get(id))
    }

    pub fn master_tap(&self) -> Arc<LevelTap> {
        self.master_tap.clone()
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn metronome_mut(&mut self) -> &mut Metronome {
        &mut self.metronome
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.metronome.set_bpm(bpm);
        self.transport.bpm = self.metronome.bpm();
    }

    /// Add a strip built with [`TrackStrip::new`]. Building allocates the
    /// reverb and delay lines, so callers sharing the graph with the audio
    /// callback build strips before taking the lock. A strip already registered under the same id is
    /// handed back so it can be dropped outside the lock.
    pub fn insert(&mut self, strip: TrackStrip) -> Option<TrackStrip> {
        let id = strip.meta.id;
        let replaced = self.strips.insert(id, strip);
        if replaced.is_none() {
            self.order.push(id);
        }
        self.resolve_gains();
        if let Some(strip) = self.strips.get_mut(&id) {
            strip.snap_gain();
        }
        replaced
    }

    /// Drop a track, silencing its source first.
    pub fn remove(&mut self, id: TrackId) -> Option<TrackStrip> {
        let mut strip = self.strips.remove(&id)?;
        strip.stop_source();
        self.order.retain(|t| *t != id);
        self.resolve_gains();
        Some(strip)
    }

    /// Remove every strip, returning them so they can be dropped outside
    /// the lock.
    pub fn clear(&mut self) -> Vec<TrackStrip> {
        self.order.clear();
        self.strips
            .drain()
            .map(|(_, mut strip)| {
                strip.stop_source();
                strip
            })
            .collect()
    }

    /// Recompute every track's effective gain from the current mute/solo
    /// state. While playing, a track that has become audible without a live
    /// source gets one at the current position.
    pub fn resolve_gains(&mut self) {
        let solo = mixing::any_solo(self.strips.values().map(|s| &s.meta));
        let offset = self.offset_frames();
        let playing = self.transport.is_playing();
        for strip in self.strips.values_mut() {
            strip.set_effective_gain(mixing::effective_gain(&strip.meta, solo));
            let audible = mixing::is_audible(&strip.meta, solo);
            if playing && audible && !strip.has_source() && strip.buffer().is_some() {
                strip.start_source(offset);
            }
        }
    }

    pub fn set_volume(&mut self, id: TrackId, volume: f32) -> bool {
        let Some(strip) = self.strips.get_mut(&id) else { return false };
        if strip.meta.set_volume(volume) {
            self.resolve_gains();
        }
        true
    }

    pub fn set_muted(&mut self, id: TrackId, muted: bool) -> bool {
        let Some(strip) = self.strips.get_mut(&id) else { return false };
        strip.meta.muted = muted;
        self.resolve_gains();
        true
    }

    /// Toggle solo on `id`, clearing it on every other track.
    pub fn toggle_solo(&mut self, id: TrackId) -> Option<bool> {
        let soloed = mixing::toggle_solo(self.strips.values_mut().map(|s| &mut s.meta), id)?;
        self.resolve_gains();
        Some(soloed)
    }

    /// Returns false, leaving the level unchanged, for a non-finite value.
    pub fn set_master_volume(&mut self, volume: f32) -> bool {
        if !volume.is_finite() {
            return false;
        }
        self.master_volume = volume.clamp(0.0, 1.0);
        self.master_gain.set_target(self.master_volume);
        true
    }

    /// Transport position as a buffer offset. The position comes from the
    /// frame clock, so rounding recovers the exact frame.
    fn offset_frames(&self) -> usize {
        (self.position().max(0.0) * self.sample_rate as f64).round() as usize
    }

    fn start_sources(&mut self) {
        let solo = mixing::any_solo(self.strips.values().map(|s| &s.meta));
        let offset = self.offset_frames();
        for strip in self.strips.values_mut() {
            if mixing::is_audible(&strip.meta, solo) {
                strip.start_source(offset);
            } else {
                strip.stop_source();
            }
        }
        self.metronome.rewind();
    }

    fn stop_sources(&mut self) {
        for strip in self.strips.values_mut() {
            strip.stop_source();
        }
    }

    /// Returns false if already playing.
    pub fn play(&mut self) -> bool {
        if !self.transport.play(self.now()) {
            return false;
        }
        self.start_sources();
        debug!(position = self.position(), "Transport playing");
        true
    }

    /// Returns false if not playing.
    pub fn pause(&mut self) -> bool {
        if !self.transport.pause(self.now()) {
            return false;
        }
        self.stop_sources();
        debug!(position = self.position(), "Transport paused");
        true
    }

    pub fn stop(&mut self) {
        self.transport.stop();
        self.stop_sources();
        self.metronome.rewind();
        debug!("Transport stopped");
    }

    /// Move the transport. While playing, every source is stopped and
    /// restarted at the new offset.
    pub fn seek(&mut self, secs: f64) {
        self.transport.seek(secs, self.now());
        if self.transport.is_playing() {
            self.stop_sources();
            self.start_sources();
        }
        self.metronome.rewind();
        debug!(position = self.position(), "Transport seek");
    }

    /// Swap a track's buffer. The old source is stopped before the swap; if
    /// playing and audible, the new buffer starts at the current position.
    pub fn set_buffer(&mut self, id: TrackId, buffer: Option<Arc<AudioBuffer>>) -> bool {
        let solo = mixing::any_solo(self.strips.values().map(|s| &s.meta));
        let offset = self.offset_frames();
        let playing = self.transport.is_playing();
        let Some(strip) = self.strips.get_mut(&id) else { return false };
        strip.replace_buffer(buffer);
        if playing && mixing::is_audible(&strip.meta, solo) {
            strip.start_source(offset);
        }
        true
    }

    /// Longest attached buffer, but never less than the configured minimum
    pub fn project_duration(&self) -> f64 {
        self.strips
            .values()
            .filter_map(|s| s.buffer().map(|b| b.duration_secs()))
            .fold(self.config.min_project_secs, f64::max)
    }

    /// Render one device period of interleaved audio and advance the clock.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        self.mix_l.clear();
        self.mix_l.resize(frames, 0.0);
        self.mix_r.clear();
        self.mix_r.resize(frames, 0.0);
        for id in &self.order {
            if let Some(strip) = self.strips.get_mut(id) {
                strip.render(&mut self.mix_l, &mut self.mix_r);
            }
        }

        let playing = self.transport.is_playing();
        let start = self.offset_frames() as u64;
        self.tap_scratch.clear();
        for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
            let g = self.master_gain.next();
            let click = if playing { self.metronome.sample_at(start + i as u64) } else { 0.0 };
            let l = self.mix_l[i] * g + click;
            let r = self.mix_r[i] * g + click;
            self.tap_scratch.push((l + r) * 0.5);
            match frame {
                [mono] => *mono = (l + r) * 0.5,
                [left, right, rest @ ..] => {
                    *left = l;
                    *right = r;
                    rest.fill(0.0);
                }
                [] => {}
            }
        }
        self.master_tap.push(&self.tap_scratch);
        self.clock_frames += frames as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 1000;

    fn graph() -> SignalGraph {
        SignalGraph::new(SR, &EngineConfig::default())
    }

    fn add(graph: &mut SignalGraph, id: u64) {
        let strip = TrackStrip::new(Track::new(TrackId(id), "t"), SR, &EngineConfig::default());
        graph.insert(strip);
    }

    /// Mono buffer whose sample `i` is `i / 10_000`, so the value encodes
    /// the frame it came from.
    fn ramp(frames: usize) -> Arc<AudioBuffer> {
        let samples = (0..frames).map(|i| i as f32 / 10_000.0).collect();
        Arc::new(AudioBuffer::from_channels(vec![samples], SR))
    }

    fn render(graph: &mut SignalGraph, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        graph.render(&mut out, 2);
        out.chunks(2).map(|f| f[0]).collect()
    }

    fn frame_of(sample: f32) -> usize {
        (sample * 10_000.0).round() as usize
    }

    #[test]
    fn test_play_is_idempotent() {
        let mut g = graph();
        add(&mut g, 1);
        g.set_buffer(TrackId(1), Some(ramp(5000)));
        assert!(g.play());
        render(&mut g, 100);
        assert!(!g.play());
        let out = render(&mut g, 1);
        assert_eq!(frame_of(out[0]), 100);
    }

    #[test]
    fn test_pause_resume_continues_from_same_frame() {
        let mut g = graph();
        add(&mut g, 1);
        g.set_buffer(TrackId(1), Some(ramp(5000)));
        g.play();
        render(&mut g, 250);
        assert!(g.pause());
        assert!(!g.strip(TrackId(1)).unwrap().has_source());
        let silent = render(&mut g, 300);
        assert!(silent.iter().all(|s| *s == 0.0));
        assert!((g.position() - 0.25).abs() < 1e-9);

        g.play();
        let out = render(&mut g, 1);
        assert_eq!(frame_of(out[0]), 250);
    }

    #[test]
    fn test_seek_while_playing_restarts_single_source() {
        let mut g = graph();
        add(&mut g, 1);
        g.set_buffer(TrackId(1), Some(ramp(5000)));
        g.play();
        render(&mut g, 100);
        g.seek(2.0);
        let source = g.strip(TrackId(1)).unwrap().source().unwrap();
        assert_eq!(source.frame(), 2000);
        let out = render(&mut g, 10);
        let frames: Vec<usize> = out.iter().map(|s| frame_of(*s)).collect();
        assert_eq!(frames, (2000..2010).collect::<Vec<_>>());
    }

    #[test]
    fn test_stop_rewinds() {
        let mut g = graph();
        add(&mut g, 1);
        g.set_buffer(TrackId(1), Some(ramp(5000)));
        g.play();
        render(&mut g, 100);
        g.stop();
        assert_eq!(g.position(), 0.0);
        g.play();
        let out = render(&mut g, 1);
        assert_eq!(frame_of(out[0]), 0);
    }

    #[test]
    fn test_muted_track_starts_no_source_until_unmuted() {
        let mut g = graph();
        add(&mut g, 1);
        g.set_buffer(TrackId(1), Some(ramp(5000)));
        g.set_muted(TrackId(1), true);
        g.play();
        assert!(!g.strip(TrackId(1)).unwrap().has_source());
        render(&mut g, 300);
        g.set_muted(TrackId(1), false);
        assert_eq!(g.strip(TrackId(1)).unwrap().source().unwrap().frame(), 300);
    }

    #[test]
    fn test_solo_mutes_others_in_render() {
        let mut g = graph();
        for id in 1..=2 {
            add(&mut g, id);
            g.set_buffer(TrackId(id), Some(ramp(5000)));
        }
        g.toggle_solo(TrackId(2));
        assert_eq!(g.strip(TrackId(1)).unwrap().effective_gain(), 0.0);
        assert_eq!(g.strip(TrackId(2)).unwrap().effective_gain(), 1.0);
        g.play();
        assert!(!g.strip(TrackId(1)).unwrap().has_source());
        render(&mut g, 50);
        let out = render(&mut g, 1);
        assert_eq!(frame_of(out[0]), 50);
    }

    #[test]
    fn test_buffer_swap_while_playing_restarts_at_position() {
        let mut g = graph();
        add(&mut g, 1);
        let first = ramp(5000);
        g.set_buffer(TrackId(1), Some(first.clone()));
        g.play();
        render(&mut g, 400);

        let second = ramp(3000);
        g.set_buffer(TrackId(1), Some(second.clone()));
        let source = g.strip(TrackId(1)).unwrap().source().unwrap();
        assert!(source.reads(&second));
        assert!(!source.reads(&first));
        assert_eq!(source.frame(), 400);
    }

    #[test]
    fn test_master_volume_and_mono_output() {
        let mut g = graph();
        add(&mut g, 1);
        let buffer = AudioBuffer::from_channels(vec![vec![0.8; 2000], vec![0.4; 2000]], SR);
        g.set_buffer(TrackId(1), Some(Arc::new(buffer)));
        g.set_master_volume(0.5);
        g.play();
        render(&mut g, 100);
        let mut mono = vec![0.0; 4];
        g.render(&mut mono, 1);
        assert!(mono.iter().all(|s| (s - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_project_duration_has_floor() {
        let mut g = graph();
        add(&mut g, 1);
        assert_eq!(g.project_duration(), 60.0);
        let long = AudioBuffer::silent(1, 90 * SR as usize, SR);
        g.set_buffer(TrackId(1), Some(Arc::new(long)));
        assert_eq!(g.project_duration(), 90.0);
    }

    #[test]
    fn test_insert_prebuilt_strip_resolves_all_gains() {
        let mut g = graph();
        add(&mut g, 1);
        let mut soloed = Track::new(TrackId(2), "lead");
        soloed.solo = true;
        soloed.set_volume(0.5);
        assert!(g.insert(TrackStrip::new(soloed, SR, &EngineConfig::default())).is_none());
        assert_eq!(g.strip(TrackId(1)).unwrap().effective_gain(), 0.0);
        assert_eq!(g.strip(TrackId(2)).unwrap().effective_gain(), 0.5);

        let again = TrackStrip::new(Track::new(TrackId(2), "lead"), SR, &EngineConfig::default());
        let replaced = g.insert(again).unwrap();
        assert!(replaced.meta.solo);
        assert_eq!(g.track_ids(), &[TrackId(1), TrackId(2)]);
        assert_eq!(g.strip(TrackId(1)).unwrap().effective_gain(), 1.0);
    }

    #[test]
    fn test_non_finite_master_volume_is_ignored() {
        let mut g = graph();
        g.set_master_volume(0.4);
        assert!(!g.set_master_volume(f32::NAN));
        assert_eq!(g.master_volume(), 0.4);
    }

    #[test]
    fn test_remove_keeps_order_of_others() {
        let mut g = graph();
        for id in 1..=3 {
            add(&mut g, id);
        }
        assert!(g.remove(TrackId(2)).is_some());
        assert!(g.remove(TrackId(2)).is_none());
        assert_eq!(g.track_ids(), &[TrackId(1), TrackId(3)]);
    }
}
