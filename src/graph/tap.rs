//! Analysis taps: the latest few thousand mono samples at a point in the
//! graph, readable from the control side at any time.
//!
//! The audio side only ever `try_lock`s. If a reader holds the lock the
//! block is skipped for that tap; the reader sees a slightly older window
//! and nothing on the audio thread waits.

use std::sync::{Arc, Mutex};

/// Samples kept per tap. Matches a 2048-point analyser frame.
pub const TAP_SIZE: usize = 2048;

struct TapRing {
    buf: Box<[f32]>,
    pos: usize,
    filled: usize,
}

impl TapRing {
    fn push(&mut self, samples: &[f32]) {
        let cap = self.buf.len();
        // Only the newest `cap` samples can survive
        let samples = &samples[samples.len().saturating_sub(cap)..];
        for &s in samples {
            self.buf[self.pos] = s;
            self.pos = (self.pos + 1) % cap;
        }
        self.filled = (self.filled + samples.len()).min(cap);
    }

    fn copy_latest(&self, out: &mut [f32]) {
        let cap = self.buf.len();
        let n = out.len().min(cap);
        let avail = self.filled.min(n);
        let pad = out.len() - avail;
        out[..pad].fill(0.0);
        let start = (self.pos + cap - avail) % cap;
        for (i, slot) in out[pad..].iter_mut().enumerate() {
            *slot = self.buf[(start + i) % cap];
        }
    }
}

#[derive(Clone)]
pub struct AnalysisTap {
    ring: Arc<Mutex<TapRing>>,
}

impl AnalysisTap {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            ring: Arc::new(Mutex::new(TapRing {
                buf: vec![0.0; size].into_boxed_slice(),
                pos: 0,
                filled: 0,
            })),
        }
    }

    /// Append samples without blocking. Returns false if a reader held the
    /// lock and the samples were dropped.
    pub fn push_samples(&self, samples: &[f32]) -> bool {
        match self.ring.try_lock() {
            Ok(mut ring) => {
                ring.push(samples);
                true
            }
            Err(_) => false,
        }
    }

    /// Copy the most recent `out.len()` samples, oldest first. Missing
    /// history reads as silence.
    pub fn read(&self, out: &mut [f32]) {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.copy_latest(out);
    }

    pub fn size(&self) -> usize {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.buf.len()
    }

    /// Forget all history (used when a graph is torn down).
    pub fn clear(&self) {
        let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.buf.fill(0.0);
        ring.pos = 0;
        ring.filled = 0;
    }
}
