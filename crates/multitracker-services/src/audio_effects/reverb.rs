//! Convolution reverb
//!
//! The impulse response is decaying stereo noise generated once at
//! construction. Convolution is uniformly partitioned overlap-save over
//! realfft, so the wet path lags the dry path by one block.

use std::fmt;
use std::sync::Arc;

use multitracker_core::effects::ReverbParam;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::AudioEffect;
use crate::smoothing::SmoothedParam;

/// Partition and hop size in frames
pub const REVERB_BLOCK: usize = 512;
const IR_SEED: u64 = 0x5eed_0f_1e;

/// Exponentially decaying noise, `sample_rate * room_size * 4` frames long
pub fn impulse_response(room_size: f32, sample_rate: f32, seed: u64) -> [Vec<f32>; 2] {
    let len = ((sample_rate * room_size * 4.0) as usize).max(1);
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut channel = || -> Vec<f32> {
        (0..len)
            .map(|i| {
                let decay = (1.0 - i as f32 / len as f32).powi(2);
                (rng.f32() * 2.0 - 1.0) * decay
            })
            .collect()
    };
    let left = channel();
    let right = channel();
    [left, right]
}

struct Convolver {
    /// Spectra of each IR partition
    partitions: Vec<Vec<Complex<f32>>>,
    /// Frequency-domain delay line of past input blocks
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
    /// Previous block followed by the current one
    window: Vec<f32>,
    accum: Vec<Complex<f32>>,
    time: Vec<f32>,
    forward_scratch: Vec<Complex<f32>>,
    inverse_scratch: Vec<Complex<f32>>,
}

impl Convolver {
    fn new(
        ir: &[f32],
        forward: &Arc<dyn RealToComplex<f32>>,
        inverse: &Arc<dyn ComplexToReal<f32>>,
    ) -> Self {
        let bins = REVERB_BLOCK + 1;
        let mut scratch = forward.make_scratch_vec();
        let partitions: Vec<Vec<Complex<f32>>> = ir
            .chunks(REVERB_BLOCK)
            .map(|segment| {
                let mut padded = vec![0.0; REVERB_BLOCK * 2];
                padded[..segment.len()].copy_from_slice(segment);
                let mut spectrum = forward.make_output_vec();
                forward.process_with_scratch(&mut padded, &mut spectrum, &mut scratch).ok();
                spectrum
            })
            .collect();
        let count = partitions.len();
        Self {
            partitions,
            fdl: vec![vec![Complex::new(0.0, 0.0); bins]; count],
            fdl_pos: 0,
            window: vec![0.0; REVERB_BLOCK * 2],
            accum: vec![Complex::new(0.0, 0.0); bins],
            time: vec![0.0; REVERB_BLOCK * 2],
            forward_scratch: scratch,
            inverse_scratch: inverse.make_scratch_vec(),
        }
    }

    /// Convolve one block of input, writing one block of output.
    fn process_block(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        forward: &Arc<dyn RealToComplex<f32>>,
        inverse: &Arc<dyn ComplexToReal<f32>>,
    ) {
        self.window.copy_within(REVERB_BLOCK.., 0);
        self.window[REVERB_BLOCK..].copy_from_slice(input);

        let count = self.partitions.len();
        self.fdl_pos = (self.fdl_pos + count - 1) % count;
        self.time.copy_from_slice(&self.window);
        let slot = &mut self.fdl[self.fdl_pos];
        if forward.process_with_scratch(&mut self.time, slot, &mut self.forward_scratch).is_err() {
            output.fill(0.0);
            return;
        }

        self.accum.fill(Complex::new(0.0, 0.0));
        for (p, h) in self.partitions.iter().enumerate() {
            let x = &self.fdl[(self.fdl_pos + p) % count];
            for ((acc, xk), hk) in self.accum.iter_mut().zip(x).zip(h) {
                *acc += xk * hk;
            }
        }
        self.accum[0].im = 0.0;
        self.accum[REVERB_BLOCK].im = 0.0;

        if inverse.process_with_scratch(&mut self.accum, &mut self.time, &mut self.inverse_scratch).is_err() {
            output.fill(0.0);
            return;
        }
        let norm = 1.0 / (REVERB_BLOCK * 2) as f32;
        for (out, s) in output.iter_mut().zip(&self.time[REVERB_BLOCK..]) {
            *out = s * norm;
        }
    }

    fn reset(&mut self) {
        for slot in &mut self.fdl {
            slot.fill(Complex::new(0.0, 0.0));
        }
        self.window.fill(0.0);
    }
}

pub struct ReverbEffect {
    room_size: f32,
    mix: SmoothedParam,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    convolvers: [Convolver; 2],
    input: [Vec<f32>; 2],
    output: [Vec<f32>; 2],
    pos: usize,
}

impl ReverbEffect {
    pub fn new(room_size: f32, mix: f32, sample_rate: f32, ramp_frames: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(REVERB_BLOCK * 2);
        let inverse = planner.plan_fft_inverse(REVERB_BLOCK * 2);
        let [left, right] = impulse_response(room_size, sample_rate, IR_SEED);
        let convolvers = [
            Convolver::new(&left, &forward, &inverse),
            Convolver::new(&right, &forward, &inverse),
        ];
        Self {
            room_size,
            mix: SmoothedParam::new(mix, ramp_frames),
            forward,
            inverse,
            convolvers,
            input: [vec![0.0; REVERB_BLOCK], vec![0.0; REVERB_BLOCK]],
            output: [vec![0.0; REVERB_BLOCK], vec![0.0; REVERB_BLOCK]],
            pos: 0,
        }
    }

    pub fn set(&mut self, param: ReverbParam) {
        match param {
            ReverbParam::Mix(mix) => self.mix.set_target(mix),
            ReverbParam::Enabled(_) => {}
        }
    }

    pub fn mix(&self) -> f32 {
        self.mix.target()
    }
}

impl fmt::Debug for ReverbEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReverbEffect")
            .field("room_size", &self.room_size)
            .field("mix", &self.mix.target())
            .field("partitions", &self.convolvers[0].partitions.len())
            .finish()
    }
}

impl AudioEffect for ReverbEffect {
    fn name(&self) -> &str { "Reverb" }

    fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let mix = self.mix.next();
        let mut out = [0.0; 2];
        for ch in 0..2 {
            self.input[ch][self.pos] = frame[ch];
            out[ch] = frame[ch] * (1.0 - mix) + self.output[ch][self.pos] * mix;
        }
        self.pos += 1;
        if self.pos == REVERB_BLOCK {
            self.pos = 0;
            for ch in 0..2 {
                self.convolvers[ch].process_block(
                    &self.input[ch],
                    &mut self.output[ch],
                    &self.forward,
                    &self.inverse,
                );
            }
        }
        out
    }

    fn reset(&mut self) {
        for ch in 0..2 {
            self.convolvers[ch].reset();
            self.input[ch].fill(0.0);
            self.output[ch].fill(0.0);
        }
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_response_shape() {
        let [left, right] = impulse_response(0.5, 1000.0, 9);
        assert_eq!(left.len(), 2000);
        assert_ne!(left, right);
        assert!(left.iter().all(|s| s.abs() <= 1.0));
        let head: f32 = left[..200].iter().map(|s| s.abs()).sum();
        let tail: f32 = left[1800..].iter().map(|s| s.abs()).sum();
        assert!(head > tail * 10.0);
    }

    #[test]
    fn test_wet_path_matches_direct_convolution() {
        let sample_rate = 1000.0;
        let mut reverb = ReverbEffect::new(0.5, 1.0, sample_rate, 1);
        let [ir, _] = impulse_response(0.5, sample_rate, IR_SEED);

        let mut out = Vec::new();
        for i in 0..REVERB_BLOCK * 4 {
            let x = if i == 0 { 1.0 } else { 0.0 };
            out.push(reverb.process([x, 0.0])[0]);
        }
        // An impulse reproduces the IR one block late.
        for n in 0..REVERB_BLOCK * 3 {
            assert!((out[n + REVERB_BLOCK] - ir[n]).abs() < 1e-4, "frame {n}");
        }
        assert!(out[..REVERB_BLOCK].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_dry_mix_is_identity() {
        let mut reverb = ReverbEffect::new(0.25, 0.0, 2000.0, 1);
        for i in 0..1200 {
            let x = (i as f32 * 0.01).sin();
            assert_eq!(reverb.process([x, -x]), [x, -x]);
        }
    }
}
