//! Live capture sessions
//!
//! A session owns one input stream and an append-only list of mono chunks.
//! After every chunk the preview buffer is rebuilt from all chunks so far;
//! stopping finalizes whatever has been captured into an encoded clip plus
//! its decoded buffer.

use crossbeam_channel::{unbounded, Receiver, Sender};
use multitracker_core::AudioBuffer;
use thiserror::Error;
use tracing::{info, trace, warn};

use crate::audio_input::{AudioInputError, AudioInputService, InputStreamHandle};
use crate::wav::{self, WavError};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture device error: {0}")]
    Device(#[from] AudioInputError),
    #[error("Failed to finalize clip: {0}")]
    Finalize(#[from] WavError),
}

/// Result of one recording pass
#[derive(Debug, Clone)]
pub struct CapturedClip {
    /// 16-bit PCM WAV bytes
    pub encoded: Vec<u8>,
    /// The encoded clip decoded back to samples
    pub buffer: AudioBuffer,
}

pub struct CaptureSession {
    input: Option<InputStreamHandle>,
    chunk_rx: Option<Receiver<Vec<f32>>>,
    chunks: Vec<Vec<f32>>,
    preview: AudioBuffer,
    sample_rate: u32,
    channels: u16,
}

impl CaptureSession {
    /// Open `device_name` and start accumulating. Nothing is created if the
    /// device cannot be opened.
    pub fn start(device_name: &str) -> Result<Self, CaptureError> {
        let (chunk_tx, chunk_rx) = unbounded::<Vec<f32>>();
        let input = AudioInputService::start_stream(device_name, chunk_tx)?;
        let mut session = Self::detached(input.sample_rate(), input.channels());
        session.input = Some(input);
        session.chunk_rx = Some(chunk_rx);
        info!(device = device_name, sample_rate = session.sample_rate, "Capture started");
        Ok(session)
    }

    /// Session fed only through [`push_chunk`](Self::push_chunk)
    pub fn detached(sample_rate: u32, channels: u16) -> Self {
        Self {
            input: None,
            chunk_rx: None,
            chunks: Vec::new(),
            preview: AudioBuffer::silent(1, 0, sample_rate),
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Session fed through the returned sender, drained by
    /// [`poll`](Self::poll)
    pub fn channel(sample_rate: u32, channels: u16) -> (Self, Sender<Vec<f32>>) {
        let (chunk_tx, chunk_rx) = unbounded();
        let mut session = Self::detached(sample_rate, channels);
        session.chunk_rx = Some(chunk_rx);
        (session, chunk_tx)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Append one interleaved chunk (downmixed to mono) and rebuild the
    /// preview.
    pub fn push_chunk(&mut self, interleaved: Vec<f32>) {
        let channels = self.channels as usize;
        let mono: Vec<f32> = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };
        if mono.is_empty() {
            return;
        }
        trace!(frames = mono.len(), chunks = self.chunks.len() + 1, "Capture chunk");
        self.chunks.push(mono);
        self.preview = AudioBuffer::from_channels(vec![self.chunks.concat()], self.sample_rate);
    }

    /// Take every chunk the device has delivered so far. Returns how many
    /// chunks were appended.
    pub fn poll(&mut self) -> usize {
        let Some(rx) = self.chunk_rx.clone() else { return 0 };
        let mut count = 0;
        while let Ok(chunk) = rx.try_recv() {
            self.push_chunk(chunk);
            count += 1;
        }
        count
    }

    /// Everything captured so far as one contiguous mono buffer
    pub fn preview(&self) -> &AudioBuffer {
        &self.preview
    }

    pub fn captured_frames(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Stop the input and finalize all captured audio.
    pub fn stop(mut self) -> Result<CapturedClip, CaptureError> {
        if let Some(input) = self.input.take() {
            input.stop();
            let dropped = input.dropped_chunks();
            if dropped > 0 {
                warn!(dropped, "Capture lost input chunks");
            }
        }
        self.poll();
        self.chunk_rx = None;

        let captured = AudioBuffer::from_channels(vec![self.chunks.concat()], self.sample_rate);
        let encoded = wav::encode(&captured)?;
        let buffer = wav::decode(&encoded)?;
        info!(frames = buffer.frames(), bytes = encoded.len(), "Capture finalized");
        Ok(CapturedClip { encoded, buffer })
    }
}
