//! Shared scalar helpers for the sample-level and control-level code.

/// Floor added before taking a logarithm so silence stays finite.
pub const DB_EPS: f32 = 1e-9;

#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    20.0 * lin.max(DB_EPS).log10()
}

/// One-pole coefficient for a time constant in milliseconds.
///
/// `y = c * y + (1 - c) * x` reaches ~63% of a step after `ms`.
#[inline]
pub fn time_constant_coeff(ms: f32, sample_rate: f32) -> f32 {
    let samples = (ms * 0.001 * sample_rate).max(1e-3);
    (-1.0 / samples).exp()
}

/// Root-mean-square of a block. Empty blocks read as silence.
pub fn frame_rms(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    (s / (x.len().max(1) as f32)).sqrt()
}

/// Fraction of adjacent sample pairs whose sign differs.
///
/// Zero counts as positive, so a run of silence never produces crossings.
pub fn zero_crossing_rate(x: &[f32]) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    let mut crossings = 0usize;
    for pair in x.windows(2) {
        if (pair[1] >= 0.0) != (pair[0] >= 0.0) {
            crossings += 1;
        }
    }
    crossings as f32 / x.len() as f32
}
