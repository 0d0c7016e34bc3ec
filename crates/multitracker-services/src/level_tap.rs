//! Read-only metering taps
//!
//! A tap sees the signal at one point of the graph without touching it. The
//! render thread pushes one block at a time; readers get lock-free peak/RMS
//! and a short history for waveform and spectrum displays.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use multitracker_core::conversions::gain_to_db;
use realfft::RealFftPlanner;

struct History {
    samples: Vec<f32>,
    write_pos: usize,
}

pub struct LevelTap {
    history: Mutex<History>,
    peak_raw: AtomicU32,
    rms_raw: AtomicU32,
}

impl LevelTap {
    pub fn new(size: usize) -> Self {
        Self {
            history: Mutex::new(History { samples: vec![0.0; size.max(2)], write_pos: 0 }),
            peak_raw: AtomicU32::new(0),
            rms_raw: AtomicU32::new(0),
        }
    }

    /// Block peak of the last pushed block
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_raw.load(Ordering::Relaxed))
    }

    pub fn rms(&self) -> f32 {
        f32::from_bits(self.rms_raw.load(Ordering::Relaxed))
    }

    pub fn size(&self) -> usize {
        self.history.lock().map(|h| h.samples.len()).unwrap_or(0)
    }

    /// Record a block of (mono-summed) samples. Called from the render
    /// path, so a history held by a reader skips this block's samples
    /// instead of waiting.
    pub fn push(&self, block: &[f32]) {
        if block.is_empty() {
            return;
        }
        let peak = block.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        let rms = (block.iter().map(|s| s * s).sum::<f32>() / block.len() as f32).sqrt();
        self.peak_raw.store(peak.to_bits(), Ordering::Relaxed);
        self.rms_raw.store(rms.to_bits(), Ordering::Relaxed);

        let Ok(mut history) = self.history.try_lock() else { return };
        let len = history.samples.len();
        for &s in block {
            let pos = history.write_pos;
            history.samples[pos] = s;
            history.write_pos = (pos + 1) % len;
        }
    }

    /// Most recent samples, oldest first
    pub fn snapshot(&self) -> Vec<f32> {
        let Ok(history) = self.history.lock() else { return Vec::new() };
        let (newer, older) = history.samples.split_at(history.write_pos);
        older.iter().chain(newer).copied().collect()
    }

    /// Hann-windowed magnitude spectrum of the history in dB, one value per
    /// bin from DC to Nyquist.
    pub fn spectrum(&self) -> Vec<f32> {
        let mut frame = self.snapshot();
        let n = frame.len();
        if n < 2 {
            return Vec::new();
        }
        for (i, s) in frame.iter_mut().enumerate() {
            *s *= 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos());
        }
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let mut spectrum = fft.make_output_vec();
        let mut scratch = fft.make_scratch_vec();
        if fft.process_with_scratch(&mut frame, &mut spectrum, &mut scratch).is_err() {
            return Vec::new();
        }
        let norm = 2.0 / n as f32;
        spectrum.iter().map(|c| gain_to_db(c.norm() * norm)).collect()
    }

    pub fn clear(&self) {
        self.peak_raw.store(0, Ordering::Relaxed);
        self.rms_raw.store(0, Ordering::Relaxed);
        if let Ok(mut history) = self.history.lock() {
            history.samples.fill(0.0);
            history.write_pos = 0;
        }
    }
}

impl std::fmt::Debug for LevelTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelTap")
            .field("peak", &self.peak())
            .field("rms", &self.rms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_oldest_first() {
        let tap = LevelTap::new(4);
        tap.push(&[1.0, 2.0, 3.0]);
        tap.push(&[4.0, 5.0]);
        assert_eq!(tap.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(tap.peak(), 5.0);
    }

    #[test]
    fn test_push_does_not_wait_on_reader() {
        let tap = LevelTap::new(4);
        tap.push(&[0.1; 4]);
        let held = tap.history.lock().unwrap();
        tap.push(&[0.9, -0.8]);
        assert_eq!(tap.peak(), 0.9);
        drop(held);
        assert_eq!(tap.snapshot(), vec![0.1; 4]);
    }

    #[test]
    fn test_rms_of_constant_block() {
        let tap = LevelTap::new(8);
        tap.push(&[-0.5; 8]);
        assert!((tap.rms() - 0.5).abs() < 1e-6);
        tap.clear();
        assert_eq!(tap.peak(), 0.0);
        assert!(tap.snapshot().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_spectrum_peaks_at_tone_bin() {
        let n = 256;
        let tap = LevelTap::new(n);
        let bin = 32;
        let tone: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / n as f32).sin())
            .collect();
        tap.push(&tone);
        let spectrum = tap.spectrum();
        assert_eq!(spectrum.len(), n / 2 + 1);
        let loudest = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(bin));
    }
}
