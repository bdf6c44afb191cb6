//! Biquad Filter Implementation (IIR 2nd Order)
//!
//! The band splitter and the shelving EQ are all built from this one
//! RBJ-cookbook section.
//!
//! # Design Notes
//! - Coefficient updates keep the delay state, so retuning mid-stream
//!   (EQ preset ramps) does not click
//! - All operations are safe for the audio thread (no allocations)

use std::f32::consts::PI;

/// Butterworth Q, used for every band-split section.
pub const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Biquad filter implementation (IIR 2nd order)
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Biquad {
    pub fn new() -> Self {
        Self {
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            b1: 0.0,
            b2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn lowpass(cutoff: f32, q: f32, sr: f32) -> Self {
        let mut f = Self::new();
        f.update_lpf(cutoff, q, sr);
        f
    }

    pub fn highpass(cutoff: f32, q: f32, sr: f32) -> Self {
        let mut f = Self::new();
        f.update_hpf(cutoff, q, sr);
        f
    }

    /// Process a single sample
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = input * self.a0 + self.z1;

        // Anti-denormal: tiny DC offset
        self.z1 = input * self.a1 + self.z2 - self.b1 * out + 1e-25;
        self.z2 = input * self.a2 - self.b2 * out + 1e-25;

        out
    }

    #[inline]
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    #[inline]
    fn set_flat(&mut self) {
        self.a0 = 1.0;
        self.a1 = 0.0;
        self.a2 = 0.0;
        self.b1 = 0.0;
        self.b2 = 0.0;
    }

    // ---------------------------------------------------------------------
    // Filter design helpers (RBJ-style)
    // ---------------------------------------------------------------------

    pub fn update_hpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * clamp_cutoff(cutoff, sr) / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let inv_a0 = 1.0 / (1.0 + alpha);

        self.a0 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.a1 = -(1.0 + cw0) * inv_a0;
        self.a2 = ((1.0 + cw0) * 0.5) * inv_a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }

    pub fn update_lpf(&mut self, cutoff: f32, q: f32, sr: f32) {
        let w0 = 2.0 * PI * clamp_cutoff(cutoff, sr) / sr;
        let alpha = w0.sin() / (2.0 * q.max(1e-6));
        let cw0 = w0.cos();

        let inv_a0 = 1.0 / (1.0 + alpha);

        self.a0 = ((1.0 - cw0) * 0.5) * inv_a0;
        self.a1 = (1.0 - cw0) * inv_a0;
        self.a2 = ((1.0 - cw0) * 0.5) * inv_a0;
        self.b1 = (-2.0 * cw0) * inv_a0;
        self.b2 = (1.0 - alpha) * inv_a0;
    }

    /// Low shelf with unit slope.
    pub fn update_low_shelf(&mut self, cutoff: f32, gain_db: f32, sr: f32) {
        // Bypass when effectively flat
        if gain_db.abs() < 0.01 {
            self.set_flat();
            return;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * clamp_cutoff(cutoff, sr) / sr;
        let cw0 = w0.cos();
        let alpha = shelf_alpha(w0, a);
        let sqrt_a = a.sqrt();

        let b0 = a * ((a + 1.0) - (a - 1.0) * cw0 + 2.0 * sqrt_a * alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cw0);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cw0 - 2.0 * sqrt_a * alpha);

        let a0 = (a + 1.0) + (a - 1.0) * cw0 + 2.0 * sqrt_a * alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cw0);
        let a2 = (a + 1.0) + (a - 1.0) * cw0 - 2.0 * sqrt_a * alpha;

        let inv_a0 = 1.0 / a0;

        self.a0 = b0 * inv_a0;
        self.a1 = b1 * inv_a0;
        self.a2 = b2 * inv_a0;
        self.b1 = a1 * inv_a0;
        self.b2 = a2 * inv_a0;
    }

    /// High shelf with unit slope.
    pub fn update_high_shelf(&mut self, cutoff: f32, gain_db: f32, sr: f32) {
        if gain_db.abs() < 0.01 {
            self.set_flat();
            return;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * clamp_cutoff(cutoff, sr) / sr;
        let cw0 = w0.cos();
        let alpha = shelf_alpha(w0, a);
        let sqrt_a = a.sqrt();

        let b0 = a * ((a + 1.0) + (a - 1.0) * cw0 + 2.0 * sqrt_a * alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cw0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cw0 - 2.0 * sqrt_a * alpha);

        let a0 = (a + 1.0) - (a - 1.0) * cw0 + 2.0 * sqrt_a * alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cw0);
        let a2 = (a + 1.0) - (a - 1.0) * cw0 - 2.0 * sqrt_a * alpha;

        let inv_a0 = 1.0 / a0;

        self.a0 = b0 * inv_a0;
        self.a1 = b1 * inv_a0;
        self.a2 = b2 * inv_a0;
        self.b1 = a1 * inv_a0;
        self.b2 = a2 * inv_a0;
    }
}

/// Shelf slope (RBJ S parameter). 1.0 is the steepest monotonic shelf.
const SHELF_SLOPE: f32 = 1.0;

#[inline]
fn shelf_alpha(w0: f32, a: f32) -> f32 {
    w0.sin() * 0.5 * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt()
}

#[inline]
fn clamp_cutoff(cutoff: f32, sr: f32) -> f32 {
    cutoff.clamp(10.0, sr * 0.49)
}
