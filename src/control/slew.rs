//! Step Limiter (Stability Layer)
//!
//! Caps how far a control value may move per evaluation. Used for the
//! playback-rate multiplier so speed changes arrive as a series of small,
//! barely perceptible steps instead of one jump.
//!
//! This is a rate limiter for control values, NOT a filter: a change that
//! fits inside the step passes through unchanged.

/// Slew-limits a single control value and keeps it inside a range.
#[derive(Clone, Copy, Debug)]
pub struct StepLimiter {
    current: f32,
    max_step: f32,
    min: f32,
    max: f32,
}

impl StepLimiter {
    pub fn new(initial: f32, max_step: f32) -> Self {
        Self {
            current: initial,
            max_step: max_step.abs(),
            min: f32::NEG_INFINITY,
            max: f32::INFINITY,
        }
    }

    /// Keep the output inside `[min, max]`.
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self.current = self.current.clamp(min, max);
        self
    }

    /// Move one step toward `target` and return the new value.
    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        let delta = (target - self.current).clamp(-self.max_step, self.max_step);
        self.current = (self.current + delta).clamp(self.min, self.max);
        self.current
    }

    pub fn reset(&mut self, value: f32) {
        self.current = value.clamp(self.min, self.max);
    }

    pub fn current(&self) -> f32 {
        self.current
    }
}
