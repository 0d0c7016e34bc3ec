//! Background clip decoding

use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use multitracker_core::{AudioBuffer, TrackId};
use tracing::{debug, warn};

use crate::wav::{self, WavError};

pub struct DecodeJob {
    pub track: TrackId,
    /// Clip identity for error reports
    pub clip: String,
    pub bytes: Vec<u8>,
}

pub struct DecodeResult {
    pub track: TrackId,
    pub clip: String,
    pub result: Result<AudioBuffer, WavError>,
}

impl DecodeJob {
    fn run(self) -> DecodeResult {
        debug!(track = %self.track, clip = %self.clip, bytes = self.bytes.len(), "Decoding clip");
        let result = wav::decode(&self.bytes);
        DecodeResult { track: self.track, clip: self.clip, result }
    }
}

/// One thread decoding WAV bytes off the control thread. The thread exits
/// when the worker is dropped.
pub struct DecodeWorker {
    job_tx: Option<Sender<DecodeJob>>,
    result_tx: Sender<DecodeResult>,
    result_rx: Receiver<DecodeResult>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DecodeWorker {
    pub fn spawn() -> Self {
        let (job_tx, job_rx) = unbounded::<DecodeJob>();
        let (result_tx, result_rx) = unbounded::<DecodeResult>();
        let results = result_tx.clone();
        let handle = thread::Builder::new()
            .name("clip-decoder".into())
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    if results.send(job.run()).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| warn!("Failed to spawn decode thread, decoding inline: {}", e))
            .ok();
        Self { job_tx: handle.as_ref().map(|_| job_tx), result_tx, result_rx, handle }
    }

    pub fn submit(&self, job: DecodeJob) {
        let job = match &self.job_tx {
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                Err(returned) => returned.into_inner(),
            },
            None => job,
        };
        let _ = self.result_tx.send(job.run());
    }

    /// Results that are ready now
    pub fn try_results(&self) -> Vec<DecodeResult> {
        self.result_rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next result.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DecodeResult> {
        self.result_rx.recv_timeout(timeout).ok()
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
