//! Error types for multitracker

use thiserror::Error;

use crate::track::TrackId;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("Audio output not initialized")]
    NotInitialized,
    #[error("Track not found: {0}")]
    UnknownTrack(TrackId),
    #[error("Failed to decode {clip}: {reason}")]
    Decode { clip: String, reason: String },
    #[error("Capture device error: {0}")]
    CaptureDevice(String),
    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}

pub type Result<T> = std::result::Result<T, StudioError>;
