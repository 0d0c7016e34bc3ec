//! Mixer engine: the control surface over the live signal graph

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use multitracker_core::{
    mixdown, AudioBuffer, EffectParam, EngineConfig, EqBand, EqParam, ProjectRecord, StudioError,
    Track, TrackId, TrackRecord,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio_io::{default_output_info, AudioOutputError, RealtimeOutputStream};
use crate::capture::{CaptureSession, CapturedClip};
use crate::conform::{conform, ConformError};
use crate::decode_worker::{DecodeJob, DecodeResult, DecodeWorker};
use crate::level_tap::LevelTap;
use crate::signal_graph::SignalGraph;
use crate::track_strip::TrackStrip;
use crate::wav::{self, WavError};

#[derive(Debug, Error)]
pub enum AudioEngineError {
    #[error(transparent)]
    Studio(#[from] StudioError),
    #[error("Audio output error: {0}")]
    Output(#[from] AudioOutputError),
    #[error("WAV error: {0}")]
    Wav(#[from] WavError),
    #[error("Sample rate conversion error: {0}")]
    Conform(#[from] ConformError),
    #[error("No track is armed for recording")]
    NoArmedTrack,
    #[error("Engine state lock poisoned")]
    Poisoned,
}

impl AudioEngineError {
    fn unknown(id: TrackId) -> Self {
        warn!(track = %id, "Unknown track");
        Self::Studio(StudioError::UnknownTrack(id))
    }
}

pub type EngineResult<T> = Result<T, AudioEngineError>;

fn finite(what: &'static str, value: f32) -> Result<(), StudioError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StudioError::InvalidValue(what))
    }
}

/// State shared between the control thread and the audio callback
pub struct EngineState {
    pub graph: Mutex<SignalGraph>,
}

impl EngineState {
    pub fn new(sample_rate: u32, config: &EngineConfig) -> Self {
        Self { graph: Mutex::new(SignalGraph::new(sample_rate, config)) }
    }
}

enum OutputPath {
    /// Rendered by the device callback
    Device(RealtimeOutputStream),
    /// Rendered only by explicit [`MixerEngine::render`] calls
    Detached,
}

/// The mixer engine. Tracks can only be created once an output path exists.
pub struct MixerEngine {
    config: EngineConfig,
    state: Option<Arc<EngineState>>,
    output: Option<OutputPath>,
    next_id: u64,
    armed: Option<TrackId>,
    decoder: DecodeWorker,
    /// Clip expected for each track with a decode in flight
    pending: HashMap<TrackId, String>,
    loads: u64,
}

impl MixerEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: None,
            output: None,
            next_id: 1,
            armed: None,
            decoder: DecodeWorker::spawn(),
            pending: HashMap::new(),
            loads: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open the default output device and start rendering into it.
    pub fn initialize(&mut self) -> EngineResult<()> {
        if self.output.is_some() {
            return Ok(());
        }
        let (device, sample_rate, _) = default_output_info()?;
        let state = Arc::new(EngineState::new(sample_rate, &self.config));
        let callback_state = state.clone();
        let stream = RealtimeOutputStream::start(move |buffer, _sample_rate, channels| {
            Self::render_audio(&callback_state, buffer, channels as usize);
        })?;
        info!(device = %device, sample_rate = stream.sample_rate(), "Mixer engine started");
        self.state = Some(state);
        self.output = Some(OutputPath::Device(stream));
        Ok(())
    }

    /// Build the graph without a device, at the configured sample rate.
    pub fn initialize_detached(&mut self) {
        if self.output.is_some() {
            return;
        }
        self.state = Some(Arc::new(EngineState::new(self.config.sample_rate, &self.config)));
        self.output = Some(OutputPath::Detached);
        info!(sample_rate = self.config.sample_rate, "Mixer engine started without device");
    }

    pub fn is_initialized(&self) -> bool {
        self.output.is_some()
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.output, Some(OutputPath::Detached))
    }

    /// Shared state for callers that drive their own output
    pub fn state(&self) -> Option<Arc<EngineState>> {
        self.state.clone()
    }

    pub fn sample_rate(&self) -> EngineResult<u32> {
        self.with_graph(|g| g.sample_rate())
    }

    fn render_audio(state: &EngineState, buffer: &mut [f32], channels: usize) {
        let Ok(mut graph) = state.graph.lock() else {
            buffer.fill(0.0);
            return;
        };
        graph.render(buffer, channels);
    }

    /// Render one period of interleaved audio through the graph
    pub fn render(&self, buffer: &mut [f32], channels: usize) -> EngineResult<()> {
        let state = self.state.as_ref().ok_or(StudioError::NotInitialized)?;
        Self::render_audio(state, buffer, channels);
        Ok(())
    }

    fn with_graph<R>(&self, f: impl FnOnce(&mut SignalGraph) -> R) -> EngineResult<R> {
        let state = self.state.as_ref().ok_or(StudioError::NotInitialized)?;
        let mut graph = state.graph.lock().map_err(|_| AudioEngineError::Poisoned)?;
        Ok(f(&mut graph))
    }

    /// Like [`with_graph`](Self::with_graph), failing on an unknown track
    fn with_track<R>(
        &self,
        id: TrackId,
        f: impl FnOnce(&mut SignalGraph) -> Option<R>,
    ) -> EngineResult<R> {
        self.with_graph(f)?.ok_or_else(|| AudioEngineError::unknown(id))
    }

    // Tracks

    /// Build a strip without holding the graph lock; the callback only
    /// waits for the insert.
    fn build_strip(&self, track: Track) -> EngineResult<TrackStrip> {
        let sample_rate = self.sample_rate()?;
        Ok(TrackStrip::new(track, sample_rate, &self.config))
    }

    pub fn create_track(&mut self, name: &str) -> EngineResult<TrackId> {
        let id = TrackId(self.next_id);
        let strip = self.build_strip(Track::new(id, name))?;
        let replaced = self.with_graph(|g| g.insert(strip))?;
        drop(replaced);
        self.next_id += 1;
        info!(track = %id, name, "Track created");
        Ok(id)
    }

    /// Returns false if the track did not exist.
    pub fn remove_track(&mut self, id: TrackId) -> EngineResult<bool> {
        let removed = self.with_graph(|g| g.remove(id))?.is_some();
        if removed {
            if self.armed == Some(id) {
                self.armed = None;
            }
            self.pending.remove(&id);
            info!(track = %id, "Track removed");
        }
        Ok(removed)
    }

    pub fn rename_track(&self, id: TrackId, name: &str) -> EngineResult<()> {
        self.with_track(id, |g| g.strip_mut(id).map(|s| s.meta.name = name.to_string()))
    }

    pub fn track(&self, id: TrackId) -> EngineResult<Option<Track>> {
        self.with_graph(|g| g.strip(id).map(|s| s.meta.clone()))
    }

    /// Track ids in creation order
    pub fn track_ids(&self) -> EngineResult<Vec<TrackId>> {
        self.with_graph(|g| g.track_ids().to_vec())
    }

    // Mixing

    pub fn set_track_volume(&self, id: TrackId, volume: f32) -> EngineResult<()> {
        finite("volume", volume)?;
        self.with_track(id, |g| g.set_volume(id, volume).then_some(()))
    }

    pub fn set_track_pan(&self, id: TrackId, pan: f32) -> EngineResult<()> {
        finite("pan", pan)?;
        self.with_track(id, |g| g.strip_mut(id).map(|s| s.set_pan(pan)))
    }

    /// Apply one effect edit; returns the value actually stored after
    /// clamping.
    pub fn set_track_effect(&self, id: TrackId, param: EffectParam) -> EngineResult<EffectParam> {
        if !param.is_finite() {
            return Err(StudioError::InvalidValue("effect parameter").into());
        }
        let stored = self.with_track(id, |g| g.strip_mut(id).map(|s| s.apply_effect(param)))?;
        let stored = stored.ok_or(StudioError::InvalidValue("effect parameter"))?;
        debug!(track = %id, ?stored, "Effect parameter");
        Ok(stored)
    }

    pub fn set_track_eq(&self, id: TrackId, band: EqBand, gain_db: f32) -> EngineResult<EffectParam> {
        self.set_track_effect(id, EffectParam::Eq(EqParam::gain(band, gain_db)))
    }

    pub fn set_muted(&self, id: TrackId, muted: bool) -> EngineResult<()> {
        self.with_track(id, |g| g.set_muted(id, muted).then_some(()))
    }

    /// Returns the new mute state.
    pub fn toggle_mute(&self, id: TrackId) -> EngineResult<bool> {
        self.with_track(id, |g| {
            let muted = !g.strip(id)?.meta.muted;
            g.set_muted(id, muted);
            Some(muted)
        })
    }

    /// Toggle solo on one track, clearing it everywhere else. Returns the new
    /// solo state of `id`.
    pub fn toggle_solo(&self, id: TrackId) -> EngineResult<bool> {
        self.with_track(id, |g| g.toggle_solo(id))
    }

    pub fn set_master_volume(&self, volume: f32) -> EngineResult<()> {
        finite("master volume", volume)?;
        self.with_graph(|g| g.set_master_volume(volume)).map(|_| ())
    }

    /// Toggle the armed track. Arming one track disarms any other. Returns
    /// the armed track afterwards.
    pub fn arm_track(&mut self, id: TrackId) -> EngineResult<Option<TrackId>> {
        self.with_track(id, |g| g.strip(id).map(|_| ()))?;
        self.armed = if self.armed == Some(id) { None } else { Some(id) };
        debug!(armed = ?self.armed, "Armed track");
        Ok(self.armed)
    }

    pub fn armed_track(&self) -> Option<TrackId> {
        self.armed
    }

    // Transport

    /// Returns false if already playing.
    pub fn play(&self) -> EngineResult<bool> {
        self.with_graph(|g| g.play())
    }

    /// Returns false if not playing.
    pub fn pause(&self) -> EngineResult<bool> {
        self.with_graph(|g| g.pause())
    }

    pub fn stop(&self) -> EngineResult<()> {
        self.with_graph(|g| g.stop())
    }

    pub fn seek(&self, secs: f64) -> EngineResult<()> {
        self.with_graph(|g| g.seek(secs))
    }

    /// Transport position in seconds
    pub fn current_time(&self) -> EngineResult<f64> {
        self.with_graph(|g| g.position())
    }

    pub fn is_playing(&self) -> bool {
        self.with_graph(|g| g.transport().is_playing()).unwrap_or(false)
    }

    pub fn format_time(&self) -> EngineResult<String> {
        self.with_graph(|g| g.transport().format_time(g.now()))
    }

    pub fn set_metronome(&self, enabled: bool) -> EngineResult<()> {
        self.with_graph(|g| g.metronome_mut().set_enabled(enabled))
    }

    pub fn set_bpm(&self, bpm: f64) -> EngineResult<()> {
        self.with_graph(|g| g.set_bpm(bpm))
    }

    // Buffers

    /// Copy `buffer` into an engine-owned buffer at the engine's rate and
    /// attach it, stopping any source reading the previous one.
    pub fn set_track_buffer(&self, id: TrackId, buffer: &AudioBuffer) -> EngineResult<()> {
        let sample_rate = self.sample_rate()?;
        self.with_track(id, |g| g.strip(id).map(|_| ()))?;
        let owned = Arc::new(conform(buffer, sample_rate)?);
        let frames = owned.frames();
        self.with_track(id, |g| g.set_buffer(id, Some(owned)).then_some(()))?;
        info!(track = %id, frames, sample_rate, "Track buffer attached");
        Ok(())
    }

    pub fn clear_track_buffer(&self, id: TrackId) -> EngineResult<()> {
        self.with_track(id, |g| g.set_buffer(id, None).then_some(()))
    }

    /// Decode WAV bytes onto a track. On failure the track is left as it was.
    pub fn import_clip(&self, id: TrackId, bytes: &[u8]) -> EngineResult<()> {
        self.with_track(id, |g| g.strip(id).map(|_| ()))?;
        let buffer = wav::decode(bytes).map_err(|e| {
            warn!(track = %id, "Import failed: {}", e);
            StudioError::Decode { clip: format!("track {}", id), reason: e.to_string() }
        })?;
        self.set_track_buffer(id, &buffer)
    }

    /// Open a capture session on `device`. Nothing is created on failure.
    pub fn start_capture(&self, device: &str) -> EngineResult<CaptureSession> {
        CaptureSession::start(device).map_err(|e| {
            warn!(device, "Capture failed to start: {}", e);
            StudioError::CaptureDevice(e.to_string()).into()
        })
    }

    /// Attach a finished recording to the armed track.
    pub fn finish_capture(&self, clip: &CapturedClip) -> EngineResult<TrackId> {
        let id = self.armed.ok_or(AudioEngineError::NoArmedTrack)?;
        self.set_track_buffer(id, &clip.buffer)?;
        Ok(id)
    }

    /// Encoded WAV of a track's buffer, for persisting separately
    pub fn export_clip(&self, id: TrackId) -> EngineResult<Option<Vec<u8>>> {
        let buffer = self.with_track(id, |g| g.strip(id).map(|s| s.buffer().cloned()))?;
        Ok(buffer.map(|b| wav::encode(&b)).transpose()?)
    }

    /// Longest attached buffer in seconds, with the configured floor
    pub fn project_duration(&self) -> EngineResult<f64> {
        self.with_graph(|g| g.project_duration())
    }

    /// Mix every audible track over the project duration and encode it.
    pub fn export_mix(&self, name: &str) -> EngineResult<Vec<u8>> {
        let (inputs, duration, sample_rate) = self.with_graph(|g| {
            let inputs: Vec<(Track, Option<Arc<AudioBuffer>>)> =
                g.strips().map(|s| (s.meta.clone(), s.buffer().cloned())).collect();
            (inputs, g.project_duration(), g.sample_rate())
        })?;
        let tracks: Vec<(&Track, Option<&AudioBuffer>)> =
            inputs.iter().map(|(t, b)| (t, b.as_deref())).collect();
        let mixed = mixdown(&tracks, duration, sample_rate);
        let bytes = wav::encode(&mixed)?;
        info!(name, duration, bytes = bytes.len(), "Mix exported");
        Ok(bytes)
    }

    // Projects

    /// Track metadata in creation order, without audio
    pub fn export_records(&self) -> EngineResult<Vec<TrackRecord>> {
        self.with_graph(|g| g.strips().map(|s| s.meta.to_record(s.buffer().is_some())).collect())
    }

    /// Replace every track with those described by `project`. Clips for
    /// records with audio are decoded in the background; collect them with
    /// [`poll_decodes`](Self::poll_decodes) or
    /// [`await_decodes`](Self::await_decodes).
    pub fn load_project(
        &mut self,
        project: &ProjectRecord,
        mut clips: HashMap<TrackId, Vec<u8>>,
    ) -> EngineResult<()> {
        let strips = project
            .tracks
            .iter()
            .map(|record| self.build_strip(Track::from_record(record)))
            .collect::<EngineResult<Vec<_>>>()?;
        let previous = self.with_graph(|g| {
            g.stop();
            let previous = g.clear();
            for strip in strips {
                g.insert(strip);
            }
            if let Some(bpm) = project.bpm {
                g.set_bpm(bpm);
            }
            previous
        })?;
        drop(previous);

        self.armed = None;
        self.pending.clear();
        self.loads += 1;
        self.next_id = project.tracks.iter().map(|r| r.id.0 + 1).max().unwrap_or(1);

        for record in project.tracks.iter().filter(|r| r.has_audio) {
            let Some(bytes) = clips.remove(&record.id) else {
                warn!(track = %record.id, "Track has audio but no clip was supplied");
                continue;
            };
            let clip = format!("{}#{}/{}", project.name, self.loads, record.id);
            self.pending.insert(record.id, clip.clone());
            self.decoder.submit(DecodeJob { track: record.id, clip, bytes });
        }
        info!(
            project = %project.name,
            tracks = project.tracks.len(),
            pending = self.pending.len(),
            "Project loaded"
        );
        Ok(())
    }

    /// Number of clip decodes still in flight
    pub fn pending_decodes(&self) -> usize {
        self.pending.len()
    }

    /// Attach every finished decode. Returns the clips that failed.
    pub fn poll_decodes(&mut self) -> EngineResult<Vec<StudioError>> {
        let mut failures = Vec::new();
        for result in self.decoder.try_results() {
            self.finish_decode(result, &mut failures)?;
        }
        Ok(failures)
    }

    /// Wait up to `timeout` for all pending decodes.
    pub fn await_decodes(&mut self, timeout: Duration) -> EngineResult<Vec<StudioError>> {
        let deadline = Instant::now() + timeout;
        let mut failures = Vec::new();
        while !self.pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(pending = self.pending.len(), "Timed out waiting for clip decodes");
                break;
            }
            let Some(result) = self.decoder.recv_timeout(remaining) else { continue };
            self.finish_decode(result, &mut failures)?;
        }
        Ok(failures)
    }

    fn finish_decode(
        &mut self,
        result: DecodeResult,
        failures: &mut Vec<StudioError>,
    ) -> EngineResult<()> {
        if self.pending.get(&result.track) != Some(&result.clip) {
            debug!(track = %result.track, clip = %result.clip, "Dropping stale decode");
            return Ok(());
        }
        self.pending.remove(&result.track);
        match result.result {
            Ok(buffer) => self.set_track_buffer(result.track, &buffer)?,
            Err(e) => {
                warn!(track = %result.track, clip = %result.clip, "Decode failed: {}", e);
                failures.push(StudioError::Decode { clip: result.clip, reason: e.to_string() });
            }
        }
        Ok(())
    }

    // Metering

    /// Post-chain, pre-master tap of one track
    pub fn track_tap(&self, id: TrackId) -> EngineResult<Arc<LevelTap>> {
        self.with_track(id, |g| g.strip(id).map(|s| s.tap()))
    }

    pub fn master_tap(&self) -> EngineResult<Arc<LevelTap>> {
        self.with_graph(|g| g.master_tap())
    }
}

impl Drop for MixerEngine {
    fn drop(&mut self) {
        if let Some(OutputPath::Device(stream)) = self.output.take() {
            stream.stop();
            info!("Mixer engine stopped");
        }
    }
}
