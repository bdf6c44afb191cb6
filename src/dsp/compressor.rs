//! Linked Dynamics Compressor
//!
//! # Perceptual Contract
//! - **Target Source**: The merged, EQ'd programme (all bands summed).
//! - **Intended Effect**: Narrow the gap between whispers and explosions so
//!   nothing jolts a sleeping listener.
//! - **Failure Modes**:
//!   - "Pumping" when release is short relative to the reduction amount.
//!   - Lifted room tone in pauses when paired with heavy makeup gain.
//! - **Will Not Do**:
//!   - Makeup gain (owned by the makeup stage / AGC).
//!   - Peak safety (owned by the limiter).
//!
//! # Detector
//! Stereo-linked: the loudest channel drives one gain for all channels so
//! the stereo image never shifts. The detector is instantaneous peak in dB,
//! the static curve is a centered soft knee, and the resulting reduction is
//! smoothed with separate attack/release time constants.

use crate::dsp::utils::{db_to_lin, lin_to_db, time_constant_coeff};

// Knee widths below this are treated as a hard knee.
const HARD_KNEE_EPS_DB: f32 = 1e-3;
// Ratio floor. 1:1 means no compression.
const MIN_RATIO: f32 = 1.0;
// Time constant floor (ms) so a zero attack never divides by zero.
const MIN_TIME_MS: f32 = 0.1;
// Peak reduction display decay per sample.
const PEAK_REDUCTION_REL: f32 = 0.9997;

/// Static and temporal settings of a compressor stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

pub struct DynamicsCompressor {
    settings: CompressorSettings,
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,

    // Smoothed gain reduction (dB, >= 0)
    reduction_db: f32,
    peak_reduction_db: f32,
}

impl DynamicsCompressor {
    pub fn new(settings: CompressorSettings, sample_rate: f32) -> Self {
        let mut comp = Self {
            settings,
            sample_rate,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            reduction_db: 0.0,
            peak_reduction_db: 0.0,
        };
        comp.update_coeffs();
        comp
    }

    pub fn settings(&self) -> CompressorSettings {
        self.settings
    }

    /// Replace the settings. Reduction state is kept so a preset change
    /// mid-stream glides instead of snapping.
    pub fn set_settings(&mut self, settings: CompressorSettings) {
        let retime = settings.attack_ms != self.settings.attack_ms
            || settings.release_ms != self.settings.release_ms;
        self.settings = settings;
        if retime {
            self.update_coeffs();
        }
    }

    fn update_coeffs(&mut self) {
        self.attack_coeff =
            time_constant_coeff(self.settings.attack_ms.max(MIN_TIME_MS), self.sample_rate);
        self.release_coeff =
            time_constant_coeff(self.settings.release_ms.max(MIN_TIME_MS), self.sample_rate);
    }

    /// Gain reduction (dB, >= 0) of the static curve for a signal `over_db`
    /// above threshold.
    #[inline]
    pub fn static_reduction_db(over_db: f32, ratio: f32, knee_db: f32) -> f32 {
        let slope = 1.0 - 1.0 / ratio.max(MIN_RATIO);
        if knee_db <= HARD_KNEE_EPS_DB {
            return over_db.max(0.0) * slope;
        }
        let half = 0.5 * knee_db;
        if over_db <= -half {
            0.0
        } else if over_db >= half {
            over_db * slope
        } else {
            let x = over_db + half;
            (x * x) / (2.0 * knee_db) * slope
        }
    }

    /// Feed one detector sample (max |x| over linked channels) and return
    /// the linear gain to apply to every channel.
    #[inline]
    pub fn compute_gain(&mut self, detector: f32) -> f32 {
        let level_db = lin_to_db(detector.abs());
        let over_db = level_db - self.settings.threshold_db;
        let target =
            Self::static_reduction_db(over_db, self.settings.ratio, self.settings.knee_db);

        let coeff = if target > self.reduction_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.reduction_db = coeff * self.reduction_db + (1.0 - coeff) * target;

        if self.reduction_db > self.peak_reduction_db {
            self.peak_reduction_db = self.reduction_db;
        } else {
            self.peak_reduction_db *= PEAK_REDUCTION_REL;
        }

        db_to_lin(-self.reduction_db)
    }

    /// Current (smoothed) gain reduction in dB.
    pub fn gain_reduction_db(&self) -> f32 {
        self.reduction_db
    }

    /// Peak-hold gain reduction for metering.
    pub fn peak_gain_reduction_db(&self) -> f32 {
        self.peak_reduction_db
    }

    pub fn reset(&mut self) {
        self.reduction_db = 0.0;
        self.peak_reduction_db = 0.0;
    }
}
