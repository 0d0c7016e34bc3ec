//! Three-band equalizer using fundsp state-variable filters

use std::fmt;

use fundsp::hacker::*;
use multitracker_core::effects::{EqBand, EqParam, EqSettings};

use super::AudioEffect;

const LOW_SHELF_HZ: f32 = 80.0;
const MID_PEAK_HZ: f32 = 1000.0;
const HIGH_SHELF_HZ: f32 = 8000.0;
const SHELF_Q: f32 = 0.707;
const MID_Q: f32 = 1.0;

struct Band<X: AudioNode> {
    gain_db: f32,
    left: An<X>,
    right: An<X>,
}

impl<X: AudioNode<Inputs = U1, Outputs = U1>> Band<X> {
    fn new(make: impl Fn() -> An<X>, gain_db: f32, sample_rate: f32) -> Self {
        let mut left = make();
        let mut right = make();
        left.set_sample_rate(sample_rate as f64);
        right.set_sample_rate(sample_rate as f64);
        Self { gain_db, left, right }
    }

    fn set_gain(&mut self, center: f32, q: f32, gain_db: f32) {
        self.gain_db = gain_db;
        let amp = db_amp(gain_db) as f32;
        self.left.set(Setting::center_q_gain(center, q, amp));
        self.right.set(Setting::center_q_gain(center, q, amp));
    }

    /// A flat band passes the input through untouched, but its filters keep
    /// running so a later gain change starts from warm state.
    #[inline]
    fn tick(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let l = self.left.tick(&Frame::from([frame[0]]))[0];
        let r = self.right.tick(&Frame::from([frame[1]]))[0];
        if self.gain_db == 0.0 { frame } else { [l, r] }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

type LowShelf = FixedSvf<f64, LowshelfMode<f64>>;
type MidBell = FixedSvf<f64, BellMode<f64>>;
type HighShelf = FixedSvf<f64, HighshelfMode<f64>>;

/// Low shelf at 80 Hz, peaking band at 1 kHz, high shelf at 8 kHz
pub struct EqEffect {
    low: Band<LowShelf>,
    mid: Band<MidBell>,
    high: Band<HighShelf>,
}

impl EqEffect {
    pub fn new(settings: &EqSettings, sample_rate: f32) -> Self {
        let low_db = settings.gain(EqBand::Low);
        let mid_db = settings.gain(EqBand::Mid);
        let high_db = settings.gain(EqBand::High);
        Self {
            low: Band::new(
                || lowshelf_hz(LOW_SHELF_HZ, SHELF_Q, db_amp(low_db) as f32),
                low_db,
                sample_rate,
            ),
            mid: Band::new(
                || bell_hz(MID_PEAK_HZ, MID_Q, db_amp(mid_db) as f32),
                mid_db,
                sample_rate,
            ),
            high: Band::new(
                || highshelf_hz(HIGH_SHELF_HZ, SHELF_Q, db_amp(high_db) as f32),
                high_db,
                sample_rate,
            ),
        }
    }

    pub fn set(&mut self, param: EqParam) {
        match param {
            EqParam::Low(db) => self.low.set_gain(LOW_SHELF_HZ, SHELF_Q, db),
            EqParam::Mid(db) => self.mid.set_gain(MID_PEAK_HZ, MID_Q, db),
            EqParam::High(db) => self.high.set_gain(HIGH_SHELF_HZ, SHELF_Q, db),
            EqParam::Enabled(_) => {}
        }
    }

    pub fn gain(&self, band: EqBand) -> f32 {
        match band {
            EqBand::Low => self.low.gain_db,
            EqBand::Mid => self.mid.gain_db,
            EqBand::High => self.high.gain_db,
        }
    }
}

impl fmt::Debug for EqEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EqEffect")
            .field("low_db", &self.low.gain_db)
            .field("mid_db", &self.mid.gain_db)
            .field("high_db", &self.high.gain_db)
            .finish()
    }
}

impl AudioEffect for EqEffect {
    fn name(&self) -> &str { "EQ" }

    fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let frame = self.low.tick(frame);
        let frame = self.mid.tick(frame);
        self.high.tick(frame)
    }

    fn reset(&mut self) {
        self.low.reset();
        self.mid.reset();
        self.high.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_rms(eq: &mut EqEffect, hz: f32, sample_rate: f32) -> f32 {
        let frames = sample_rate as usize;
        let mut sum = 0.0;
        for i in 0..frames {
            let x = (std::f32::consts::TAU * hz * i as f32 / sample_rate).sin() * 0.5;
            let y = eq.process([x, x])[0];
            // Skip the filter warm-up.
            if i >= frames / 2 {
                sum += y * y;
            }
        }
        (sum / (frames / 2) as f32).sqrt()
    }

    #[test]
    fn test_flat_eq_is_identity() {
        let mut eq = EqEffect::new(&EqSettings::default(), 44100.0);
        for x in [0.3f32, -0.7, 0.0, 1.0] {
            assert_eq!(eq.process([x, -x]), [x, -x]);
        }
    }

    #[test]
    fn test_low_shelf_boosts_bass_only() {
        let sr = 44100.0;
        let flat = sine_rms(&mut EqEffect::new(&EqSettings::default(), sr), 40.0, sr);

        let mut boosted = EqEffect::new(&EqSettings::default(), sr);
        boosted.set(EqParam::Low(12.0));
        assert_eq!(boosted.gain(EqBand::Low), 12.0);
        let low = sine_rms(&mut boosted, 40.0, sr);
        let high = sine_rms(&mut boosted, 5000.0, sr);

        assert!(low > flat * 2.0, "bass gain {low} vs {flat}");
        assert!((high / flat - 1.0).abs() < 0.1);
    }
}
