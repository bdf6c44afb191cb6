//! Asymmetric one-pole smoothing for control-rate values.
//!
//! One step per control tick: rising values use the attack constant,
//! falling values the release constant. The per-tick coefficient is
//! clamped so the value can neither stall nor jump to its target in a
//! single tick.

/// Default coefficient band.
pub const ALPHA_RANGE: (f32, f32) = (0.01, 0.25);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainSmoother {
    attack_ms: f32,
    release_ms: f32,
    tick_rate_hz: f32,
    min_alpha: f32,
    max_alpha: f32,
}

impl GainSmoother {
    pub fn new(attack_ms: f32, release_ms: f32, tick_rate_hz: f32) -> Self {
        Self {
            attack_ms,
            release_ms,
            tick_rate_hz,
            min_alpha: ALPHA_RANGE.0,
            max_alpha: ALPHA_RANGE.1,
        }
    }

    /// Replace the coefficient clamp band.
    pub fn with_alpha_range(mut self, min: f32, max: f32) -> Self {
        self.min_alpha = min.min(max);
        self.max_alpha = max.max(min);
        self
    }

    pub fn attack_ms(&self) -> f32 {
        self.attack_ms
    }

    pub fn release_ms(&self) -> f32 {
        self.release_ms
    }

    /// Coefficient for one tick moving from `current` toward `target`.
    pub fn alpha(&self, current: f32, target: f32) -> f32 {
        let tau_ms = if target > current {
            self.attack_ms
        } else {
            self.release_ms
        };
        let ticks = (tau_ms / 1000.0 * self.tick_rate_hz).max(f32::EPSILON);
        let raw = 1.0 - (-self.tick_rate_hz / ticks).exp();
        if raw.is_finite() {
            raw.clamp(self.min_alpha, self.max_alpha)
        } else {
            self.max_alpha
        }
    }

    /// Advance `current` one tick toward `target`.
    pub fn step(&self, current: f32, target: f32) -> f32 {
        current + (target - current) * self.alpha(current, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::AGC;

    fn agc() -> GainSmoother {
        GainSmoother::new(AGC.attack_ms, AGC.release_ms, AGC.tick_rate_hz)
    }

    #[test]
    fn converges_monotonically_without_overshoot() {
        let s = agc();
        for &(start, target) in &[(0.0f32, 12.0f32), (12.0, -6.0), (-18.0, 18.0)] {
            let mut cur = start;
            let mut dist = (target - cur).abs();
            for _ in 0..200 {
                cur = s.step(cur, target);
                let d = (target - cur).abs();
                assert!(d <= dist);
                assert!((cur - start).abs() <= (target - start).abs() + 1e-4);
                dist = d;
            }
            assert!(dist < 1e-3);
        }
    }

    #[test]
    fn attack_reaches_95_percent_within_15_ticks() {
        let s = agc();
        let mut cur = 0.0;
        let mut ticks = 0;
        while cur < 0.95 * 12.0 {
            cur = s.step(cur, 12.0);
            ticks += 1;
        }
        assert!(ticks <= 15, "took {ticks} ticks");
    }

    #[test]
    fn alpha_stays_in_band() {
        let s = agc();
        for &tau in &[0.0f32, 1.0, 80.0, 250.0, 10_000.0, 1e9] {
            let slow = GainSmoother::new(tau, tau, 60.0);
            let a = slow.alpha(0.0, 1.0);
            assert!((ALPHA_RANGE.0..=ALPHA_RANGE.1).contains(&a), "tau {tau} alpha {a}");
        }
        assert!(s.alpha(0.0, 1.0) > 0.0);
    }

    #[test]
    fn custom_band_is_respected() {
        let s = agc().with_alpha_range(0.05, 0.02);
        let a = s.alpha(1.0, 0.0);
        assert!((0.02..=0.05).contains(&a));
    }
}
