//! Thread-safe metering shared between the audio side and the control side.
//!
//! Plain atomic float storage; the signal path writes once per block and
//! anything on the control side may read at any time without locking.

use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};

/// Reported when the loudness meter has not collected a full window yet.
pub const LOUDNESS_FLOOR_LUFS: f32 = -70.0;

/// Peaks, gain reduction and short-term loudness of one signal path.
pub struct Meters {
    input_peak: AtomicU32,
    output_peak: AtomicU32,
    compressor_reduction_db: AtomicU32,
    limiter_reduction_db: AtomicU32,
    output_lufs: AtomicU32,
}

impl Default for Meters {
    fn default() -> Self {
        Self {
            input_peak: AtomicU32::new(0),
            output_peak: AtomicU32::new(0),
            compressor_reduction_db: AtomicU32::new(0),
            limiter_reduction_db: AtomicU32::new(0),
            output_lufs: AtomicU32::new(LOUDNESS_FLOOR_LUFS.to_bits()),
        }
    }
}

/// Point-in-time copy of [`Meters`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterSnapshot {
    pub input_peak: f32,
    pub output_peak: f32,
    pub compressor_reduction_db: f32,
    pub limiter_reduction_db: f32,
    pub output_lufs: f32,
}

impl Meters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input_peak(&self, val: f32) {
        self.input_peak.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_output_peak(&self, val: f32) {
        self.output_peak.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_compressor_reduction_db(&self, val: f32) {
        self.compressor_reduction_db
            .store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_limiter_reduction_db(&self, val: f32) {
        self.limiter_reduction_db
            .store(val.to_bits(), Ordering::Relaxed);
    }

    /// Non-finite readings (silence gives -inf) are stored as the floor.
    pub fn set_output_lufs(&self, val: f32) {
        let val = if val.is_finite() {
            val.max(LOUDNESS_FLOOR_LUFS)
        } else {
            LOUDNESS_FLOOR_LUFS
        };
        self.output_lufs.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn get_input_peak(&self) -> f32 {
        f32::from_bits(self.input_peak.load(Ordering::Relaxed))
    }

    pub fn get_output_peak(&self) -> f32 {
        f32::from_bits(self.output_peak.load(Ordering::Relaxed))
    }

    pub fn get_compressor_reduction_db(&self) -> f32 {
        f32::from_bits(self.compressor_reduction_db.load(Ordering::Relaxed))
    }

    pub fn get_limiter_reduction_db(&self) -> f32 {
        f32::from_bits(self.limiter_reduction_db.load(Ordering::Relaxed))
    }

    pub fn get_output_lufs(&self) -> f32 {
        f32::from_bits(self.output_lufs.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            input_peak: self.get_input_peak(),
            output_peak: self.get_output_peak(),
            compressor_reduction_db: self.get_compressor_reduction_db(),
            limiter_reduction_db: self.get_limiter_reduction_db(),
            output_lufs: self.get_output_lufs(),
        }
    }
}
