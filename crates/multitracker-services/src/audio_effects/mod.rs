//! Per-track effect units and the fixed chain that hosts them

mod chorus;
mod compressor;
mod delay;
mod eq;
mod reverb;

pub use chorus::ChorusEffect;
pub use compressor::CompressorEffect;
pub use delay::DelayEffect;
pub use eq::EqEffect;
pub use reverb::{ReverbEffect, REVERB_BLOCK};

use std::fmt::Debug;

use multitracker_core::{
    ChorusParam, CompressorParam, DelayParam, EffectParam, EffectSettings, EqParam, ReverbParam,
};

use crate::smoothing::SmoothedParam;

/// Audio effect that processes one stereo frame at a time
pub trait AudioEffect: Send + Debug {
    fn name(&self) -> &str;
    fn process(&mut self, frame: [f32; 2]) -> [f32; 2];
    /// Clear delay lines, envelopes and filter memory.
    fn reset(&mut self) {}
}

/// A unit that is always present in the chain but can be switched out of the
/// signal path. Switching crossfades between the dry and processed signal over
/// the ramp, and a fully disengaged unit is not run at all.
#[derive(Debug)]
pub struct Stage<E> {
    effect: E,
    engage: SmoothedParam,
    idle: bool,
}

impl<E: AudioEffect> Stage<E> {
    pub fn new(effect: E, enabled: bool, ramp_frames: usize) -> Self {
        let level = if enabled { 1.0 } else { 0.0 };
        Self { effect, engage: SmoothedParam::new(level, ramp_frames), idle: !enabled }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.engage.set_target(if enabled { 1.0 } else { 0.0 });
        if enabled {
            self.idle = false;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.engage.target() > 0.5
    }

    pub fn effect(&self) -> &E {
        &self.effect
    }

    pub fn effect_mut(&mut self) -> &mut E {
        &mut self.effect
    }

    #[inline]
    pub fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        if self.idle {
            return frame;
        }
        let e = self.engage.next();
        if e == 0.0 && self.engage.is_settled() {
            self.idle = true;
            self.effect.reset();
            return frame;
        }
        let wet = self.effect.process(frame);
        if e == 1.0 {
            return wet;
        }
        [
            frame[0] * (1.0 - e) + wet[0] * e,
            frame[1] * (1.0 - e) + wet[1] * e,
        ]
    }
}

/// The five units of a track in signal order. Units are built once with the
/// track and only ever reconfigured.
#[derive(Debug)]
pub struct EffectChain {
    pub eq: Stage<EqEffect>,
    pub chorus: Stage<ChorusEffect>,
    pub delay: Stage<DelayEffect>,
    pub reverb: Stage<ReverbEffect>,
    pub compressor: Stage<CompressorEffect>,
}

impl EffectChain {
    pub fn new(
        settings: &EffectSettings,
        sample_rate: u32,
        ramp_frames: usize,
        room_size: f32,
    ) -> Self {
        let sr = sample_rate as f32;
        Self {
            eq: Stage::new(EqEffect::new(&settings.eq, sr), settings.eq.enabled, ramp_frames),
            chorus: Stage::new(
                ChorusEffect::new(&settings.chorus, sr, ramp_frames),
                settings.chorus.enabled,
                ramp_frames,
            ),
            delay: Stage::new(
                DelayEffect::new(&settings.delay, sr, ramp_frames),
                settings.delay.enabled,
                ramp_frames,
            ),
            reverb: Stage::new(
                ReverbEffect::new(room_size, settings.reverb.mix, sr, ramp_frames),
                settings.reverb.enabled,
                ramp_frames,
            ),
            compressor: Stage::new(
                CompressorEffect::new(&settings.compressor, sr),
                settings.compressor.enabled,
                ramp_frames,
            ),
        }
    }

    /// Route an edit to the unit it addresses.
    pub fn apply(&mut self, param: EffectParam) {
        match param {
            EffectParam::Eq(EqParam::Enabled(on)) => self.eq.set_enabled(on),
            EffectParam::Eq(p) => self.eq.effect_mut().set(p),
            EffectParam::Chorus(ChorusParam::Enabled(on)) => self.chorus.set_enabled(on),
            EffectParam::Chorus(p) => self.chorus.effect_mut().set(p),
            EffectParam::Delay(DelayParam::Enabled(on)) => self.delay.set_enabled(on),
            EffectParam::Delay(p) => self.delay.effect_mut().set(p),
            EffectParam::Reverb(ReverbParam::Enabled(on)) => self.reverb.set_enabled(on),
            EffectParam::Reverb(p) => self.reverb.effect_mut().set(p),
            EffectParam::Compressor(CompressorParam::Enabled(on)) => self.compressor.set_enabled(on),
            EffectParam::Compressor(p) => self.compressor.effect_mut().set(p),
        }
    }

    #[inline]
    pub fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let frame = self.eq.process(frame);
        let frame = self.chorus.process(frame);
        let frame = self.delay.process(frame);
        let frame = self.reverb.process(frame);
        self.compressor.process(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multitracker_core::EqBand;

    const SR: u32 = 8000;

    fn noise(frames: usize, seed: u64) -> Vec<[f32; 2]> {
        let mut rng = fastrand::Rng::with_seed(seed);
        (0..frames)
            .map(|_| {
                let s = rng.f32() * 2.0 - 1.0;
                [s * 0.5, -s * 0.25]
            })
            .collect()
    }

    fn run(chain: &mut EffectChain, input: &[[f32; 2]]) -> Vec<[f32; 2]> {
        input.iter().map(|f| chain.process(*f)).collect()
    }

    #[test]
    fn test_default_chain_is_transparent() {
        let mut chain = EffectChain::new(&EffectSettings::default(), SR, 16, 0.1);
        let input = noise(512, 1);
        assert_eq!(run(&mut chain, &input), input);
    }

    #[test]
    fn test_eq_disable_enable_restores_output() {
        let mut settings = EffectSettings::default();
        settings.apply(EffectParam::Eq(EqParam::gain(EqBand::Low, 9.0)));
        settings.apply(EffectParam::Eq(EqParam::High(-6.0)));
        let input = noise(1024, 7);
        let silence = vec![[0.0f32; 2]; 64];

        let mut reference = EffectChain::new(&settings, SR, 16, 0.1);
        run(&mut reference, &silence);
        run(&mut reference, &silence);
        let expected = run(&mut reference, &input);

        let mut toggled = EffectChain::new(&settings, SR, 16, 0.1);
        toggled.apply(EffectParam::Eq(EqParam::Enabled(false)));
        run(&mut toggled, &silence);
        assert!(!toggled.eq.is_enabled());
        toggled.apply(EffectParam::Eq(EqParam::Enabled(true)));
        run(&mut toggled, &silence);
        assert_eq!(run(&mut toggled, &input), expected);
    }

    #[test]
    fn test_disabled_stage_passes_signal_after_ramp() {
        let mut settings = EffectSettings::default();
        settings.apply(EffectParam::Eq(EqParam::Mid(12.0)));
        let mut chain = EffectChain::new(&settings, SR, 16, 0.1);
        chain.apply(EffectParam::Eq(EqParam::Enabled(false)));
        run(&mut chain, &noise(32, 3));
        let input = noise(256, 4);
        assert_eq!(run(&mut chain, &input), input);
    }

    #[test]
    fn test_enabling_delay_adds_echo() {
        let mut settings = EffectSettings::default();
        settings.apply(EffectParam::Delay(DelayParam::Time(0.01)));
        settings.apply(EffectParam::Delay(DelayParam::Mix(1.0)));
        settings.apply(EffectParam::Delay(DelayParam::Feedback(0.0)));
        settings.apply(EffectParam::Delay(DelayParam::Enabled(true)));
        let mut chain = EffectChain::new(&settings, SR, 1, 0.1);

        let mut input = vec![[0.0f32; 2]; 200];
        input[0] = [1.0, 1.0];
        let out = run(&mut chain, &input);
        // 10 ms at 8 kHz
        assert!(out[80][0] > 0.9);
        assert!(out[0][0].abs() < 1e-6);
    }
}
