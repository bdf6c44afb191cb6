//! RMS loudness of an analysis tap.
//!
//! No smoothing here. Callers that need a steadier reading run the value
//! through a [`GainSmoother`](super::GainSmoother).

use crate::dsp::utils::{frame_rms, DB_EPS};
use crate::graph::{AnalysisTap, TAP_SIZE};

/// `20 * log10(rms + eps)`. Silence gives a finite floor (about -180 dB).
#[inline]
pub fn rms_to_db(rms: f32) -> f32 {
    20.0 * (rms + DB_EPS).log10()
}

/// Loudness of a block in dBFS.
pub fn block_level_db(samples: &[f32]) -> f32 {
    rms_to_db(frame_rms(samples))
}

pub struct LevelMeter {
    tap: AnalysisTap,
    frame: Vec<f32>,
}

impl LevelMeter {
    pub fn new(tap: AnalysisTap) -> Self {
        Self::with_frame_size(tap, TAP_SIZE)
    }

    pub fn with_frame_size(tap: AnalysisTap, frame_size: usize) -> Self {
        Self {
            tap,
            frame: vec![0.0; frame_size.max(1)],
        }
    }

    /// Pull the latest frame from the tap.
    pub fn read(&mut self) -> &[f32] {
        self.tap.read(&mut self.frame);
        &self.frame
    }

    /// Linear RMS of the latest frame.
    pub fn rms(&mut self) -> f32 {
        frame_rms(self.read())
    }

    pub fn level_db(&mut self) -> f32 {
        rms_to_db(self.rms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_amplitude_round_trips() {
        for &a in &[1.0f32, 0.5, 0.1, 0.001] {
            let block = vec![a; 2048];
            let expected = 20.0 * (a + DB_EPS).log10();
            assert!((block_level_db(&block) - expected).abs() < 1e-3);
        }
        let negative = vec![-0.25; 512];
        assert!((block_level_db(&negative) - rms_to_db(0.25)).abs() < 1e-4);
    }

    #[test]
    fn zeros_are_finite() {
        let db = block_level_db(&[0.0; 2048]);
        assert!(db.is_finite());
        assert!(db < -150.0);
    }

    #[test]
    fn reads_latest_tap_window() {
        let tap = AnalysisTap::new(TAP_SIZE);
        let mut meter = LevelMeter::with_frame_size(tap.clone(), 256);
        tap.push_samples(&[0.9; 4096]);
        tap.push_samples(&[0.1; 256]);
        assert!((meter.rms() - 0.1).abs() < 1e-6);
        assert!((meter.level_db() + 20.0).abs() < 1e-3);
    }
}
