//! Linear parameter ramps for click-free gain changes

/// A value that glides linearly to its target over a fixed number of frames.
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    step: f32,
    remaining: usize,
    ramp_frames: usize,
}

impl SmoothedParam {
    pub fn new(value: f32, ramp_frames: usize) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
            ramp_frames: ramp_frames.max(1),
        }
    }

    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;
        self.remaining = self.ramp_frames;
        self.step = (target - self.current) / self.ramp_frames as f32;
    }

    /// Jump straight to `value`, cancelling any ramp in flight.
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.remaining = 0;
    }

    /// Advance one frame and return the value for that frame.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 { self.target } else { self.current + self.step };
        }
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_lands_exactly_on_target() {
        let mut p = SmoothedParam::new(0.0, 4);
        p.set_target(1.0);
        let values: Vec<f32> = (0..6).map(|_| p.next()).collect();
        assert_eq!(values, vec![0.25, 0.5, 0.75, 1.0, 1.0, 1.0]);
        assert!(p.is_settled());
    }

    #[test]
    fn test_retarget_mid_ramp_is_continuous() {
        let mut p = SmoothedParam::new(1.0, 10);
        p.set_target(0.0);
        for _ in 0..5 {
            p.next();
        }
        let before = p.current();
        p.set_target(1.0);
        let after = p.next();
        assert!((after - before).abs() <= 0.1);
        for _ in 0..10 {
            p.next();
        }
        assert_eq!(p.current(), 1.0);
    }
}
