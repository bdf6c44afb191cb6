//! Output Limiter
//!
//! # Perceptual Contract
//! - **Target Source**: Final output, after makeup gain.
//! - **Intended Effect**: Hard cap on peaks so AGC boosts and manual output
//!   gain can never blast the listener.
//! - **Failure Modes**:
//!   - Audible crunch when driven many dB into reduction.
//! - **Will Not Do**:
//!   - Glue or colour. It should almost never engage on levelled material.
//!
//! A compressor with near-infinite ratio, hard knee and fast timing, plus a
//! sample ceiling that catches whatever slips through the 2 ms attack.

use crate::dsp::compressor::{CompressorSettings, DynamicsCompressor};

/// Absolute sample ceiling behind the limiter curve.
const SAFETY_CEILING: f32 = 0.999;

pub struct BrickwallLimiter {
    stage: DynamicsCompressor,
}

impl BrickwallLimiter {
    pub fn new(settings: CompressorSettings, sample_rate: f32) -> Self {
        Self {
            stage: DynamicsCompressor::new(settings, sample_rate),
        }
    }

    /// Linked gain for this frame, see [`DynamicsCompressor::compute_gain`].
    #[inline]
    pub fn compute_gain(&mut self, detector: f32) -> f32 {
        self.stage.compute_gain(detector)
    }

    /// Final clamp applied to each limited sample.
    #[inline]
    pub fn ceiling(sample: f32) -> f32 {
        sample.clamp(-SAFETY_CEILING, SAFETY_CEILING)
    }

    pub fn gain_reduction_db(&self) -> f32 {
        self.stage.peak_gain_reduction_db()
    }

    pub fn reset(&mut self) {
        self.stage.reset();
    }
}
