//! multitracker-services: Signal processing, mixer engine and device layer

pub mod audio_effects;
pub mod audio_engine;
pub mod audio_input;
pub mod audio_io;
pub mod capture;
pub mod conform;
pub mod decode_worker;
pub mod level_tap;
pub mod metronome;
pub mod signal_graph;
pub mod smoothing;
pub mod track_strip;
pub mod wav;

pub use audio_effects::{AudioEffect, EffectChain, Stage};
pub use audio_effects::{ChorusEffect, CompressorEffect, DelayEffect, EqEffect, ReverbEffect};
pub use audio_engine::{AudioEngineError, EngineResult, EngineState, MixerEngine};
pub use audio_input::{AudioInputError, AudioInputService, InputDevice, InputStreamHandle};
pub use audio_io::{default_output_info, AudioOutputError, RealtimeOutputStream};
pub use capture::{CaptureError, CaptureSession, CapturedClip};
pub use conform::{conform, ConformError};
pub use decode_worker::{DecodeJob, DecodeResult, DecodeWorker};
pub use level_tap::LevelTap;
pub use metronome::Metronome;
pub use signal_graph::SignalGraph;
pub use track_strip::{PlaybackSource, TrackStrip};
pub use wav::WavError;
