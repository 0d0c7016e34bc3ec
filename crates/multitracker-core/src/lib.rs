//! multitracker-core: Domain types for the multitracker engine

mod buffer;
mod config;
pub mod conversions;
pub mod effects;
mod error;
pub mod mixdown;
pub mod mixing;
mod track;
mod transport;

pub use buffer::AudioBuffer;
pub use config::EngineConfig;
pub use effects::{
    ChorusParam, CompressorParam, DelayParam, EffectParam, EffectSettings, EqBand, EqParam,
    ReverbParam,
};
pub use error::{Result, StudioError};
pub use mixdown::mixdown;
pub use track::{ProjectRecord, Track, TrackId, TrackRecord};
pub use transport::{Transport, TransportState};
