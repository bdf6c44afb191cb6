//! Graph parameters shared between the control side and the audio side.
//!
//! Each parameter lives in one [`ParamShared`] cell. The control side holds
//! at most one [`ParamWriter`] per cell (claimed through the registry); the
//! audio side owns a [`SmoothedParam`] that follows the writer's latest
//! request sample by sample.
//!
//! Writes are lock-free: the writer stores the ramp fields and then bumps a
//! generation counter; the reader re-syncs whenever the generation moves. A
//! torn read during a concurrent write is corrected on the next sample.

use crate::dsp::utils::{db_to_lin, time_constant_coeff};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Distance at which an exponential approach snaps onto its target.
const SNAP_EPS: f32 = 1e-6;

const KIND_INSTANT: u32 = 0;
const KIND_LINEAR: u32 = 1;
const KIND_EXPONENTIAL: u32 = 2;

/// How a parameter travels to a new target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Ramp {
    /// Jump on the next sample.
    Instant,
    /// Straight line, arriving exactly after `ms`.
    Linear { ms: f32 },
    /// One-pole approach with time constant `tau_ms`.
    Exponential { tau_ms: f32 },
}

impl Ramp {
    fn encode(self) -> (u32, f32) {
        match self {
            Ramp::Instant => (KIND_INSTANT, 0.0),
            Ramp::Linear { ms } => (KIND_LINEAR, ms),
            Ramp::Exponential { tau_ms } => (KIND_EXPONENTIAL, tau_ms),
        }
    }

    fn decode(kind: u32, ms: f32) -> Self {
        match kind {
            KIND_LINEAR => Ramp::Linear { ms },
            KIND_EXPONENTIAL => Ramp::Exponential { tau_ms: ms },
            _ => Ramp::Instant,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ParamShared {
    target: AtomicU32,
    // NaN: continue from the current value
    start: AtomicU32,
    ramp_kind: AtomicU32,
    ramp_ms: AtomicU32,
    generation: AtomicU32,
    // Published by the audio side for display and tests
    current: AtomicU32,
    claimed: AtomicBool,
}

impl ParamShared {
    pub(crate) fn new(initial: f32) -> Arc<Self> {
        Arc::new(Self {
            target: AtomicU32::new(initial.to_bits()),
            start: AtomicU32::new(f32::NAN.to_bits()),
            ramp_kind: AtomicU32::new(KIND_INSTANT),
            ramp_ms: AtomicU32::new(0),
            generation: AtomicU32::new(0),
            current: AtomicU32::new(initial.to_bits()),
            claimed: AtomicBool::new(false),
        })
    }

    fn request(&self, start: Option<f32>, target: f32, ramp: Ramp) {
        let (kind, ms) = ramp.encode();
        self.target.store(target.to_bits(), Ordering::Relaxed);
        self.start
            .store(start.unwrap_or(f32::NAN).to_bits(), Ordering::Relaxed);
        self.ramp_kind.store(kind, Ordering::Relaxed);
        self.ramp_ms.store(ms.to_bits(), Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn current(&self) -> f32 {
        f32::from_bits(self.current.load(Ordering::Relaxed))
    }

    pub(crate) fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }
}

/// Exclusive write capability for one graph parameter.
///
/// Only one writer per parameter can exist at a time; dropping it hands
/// the parameter back to the registry.
#[derive(Debug)]
pub struct ParamWriter {
    id: super::ParamId,
    shared: Arc<ParamShared>,
    last_target: f32,
}

impl ParamWriter {
    pub(crate) fn new(id: super::ParamId, shared: Arc<ParamShared>) -> Self {
        let last_target = f32::from_bits(shared.target.load(Ordering::Relaxed));
        Self {
            id,
            shared,
            last_target,
        }
    }

    pub fn id(&self) -> super::ParamId {
        self.id
    }

    /// Move toward `value` from wherever the parameter currently is.
    pub fn set_target(&mut self, value: f32, ramp: Ramp) {
        if !value.is_finite() {
            return;
        }
        self.last_target = value;
        self.shared.request(None, value, ramp);
    }

    /// Same as [`set_target`](Self::set_target) for a gain given in dB.
    pub fn set_target_db(&mut self, db: f32, ramp: Ramp) {
        self.set_target(db_to_lin(db), ramp);
    }

    /// Jump to `start`, then move toward `target`.
    pub fn ramp_from(&mut self, start: f32, target: f32, ramp: Ramp) {
        if !start.is_finite() || !target.is_finite() {
            return;
        }
        self.last_target = target;
        self.shared.request(Some(start), target, ramp);
    }

    /// Last requested target.
    pub fn target(&self) -> f32 {
        self.last_target
    }

    /// Value most recently published by the audio side.
    pub fn current(&self) -> f32 {
        self.shared.current()
    }
}

impl Drop for ParamWriter {
    fn drop(&mut self) {
        self.shared.release();
    }
}

/// Audio-side follower of a parameter.
pub(crate) struct SmoothedParam {
    shared: Arc<ParamShared>,
    sample_rate: f32,
    seen_generation: u32,
    value: f32,
    target: f32,
    ramp: Ramp,
    // Linear
    step: f32,
    remaining: u32,
    // Exponential
    coeff: f32,
}

impl SmoothedParam {
    pub(crate) fn new(shared: Arc<ParamShared>, sample_rate: f32) -> Self {
        let value = f32::from_bits(shared.target.load(Ordering::Relaxed));
        let seen_generation = shared.generation.load(Ordering::Acquire);
        Self {
            shared,
            sample_rate,
            seen_generation,
            value,
            target: value,
            ramp: Ramp::Instant,
            step: 0.0,
            remaining: 0,
            coeff: 0.0,
        }
    }

    #[inline]
    fn sync(&mut self) {
        let generation = self.shared.generation.load(Ordering::Acquire);
        if generation == self.seen_generation {
            return;
        }
        self.seen_generation = generation;

        let target = f32::from_bits(self.shared.target.load(Ordering::Relaxed));
        let start = f32::from_bits(self.shared.start.load(Ordering::Relaxed));
        let kind = self.shared.ramp_kind.load(Ordering::Relaxed);
        let ms = f32::from_bits(self.shared.ramp_ms.load(Ordering::Relaxed));

        if start.is_finite() {
            self.value = start;
        }
        self.target = target;
        self.ramp = Ramp::decode(kind, ms);
        match self.ramp {
            Ramp::Instant => {
                self.value = target;
                self.remaining = 0;
            }
            Ramp::Linear { ms } => {
                let n = (ms * 0.001 * self.sample_rate).round().max(1.0) as u32;
                self.step = (target - self.value) / n as f32;
                self.remaining = n;
            }
            Ramp::Exponential { tau_ms } => {
                self.coeff = time_constant_coeff(tau_ms, self.sample_rate);
            }
        }
    }

    /// Advance one sample.
    #[inline]
    pub(crate) fn next(&mut self) -> f32 {
        self.next_block(1)
    }

    /// Advance `n` samples at once and return the value at the end.
    /// Used for control-rate parameters.
    #[inline]
    pub(crate) fn next_block(&mut self, n: usize) -> f32 {
        self.sync();
        if self.value == self.target {
            return self.value;
        }
        match self.ramp {
            Ramp::Instant => self.value = self.target,
            Ramp::Linear { .. } => {
                let k = (n as u32).min(self.remaining);
                self.remaining -= k;
                if self.remaining == 0 {
                    self.value = self.target;
                } else {
                    self.value += self.step * k as f32;
                }
            }
            Ramp::Exponential { .. } => {
                let c = if n == 1 {
                    self.coeff
                } else {
                    self.coeff.powi(n as i32)
                };
                self.value = self.target + (self.value - self.target) * c;
                if (self.value - self.target).abs() < SNAP_EPS {
                    self.value = self.target;
                }
            }
        }
        self.value
    }

    #[inline]
    pub(crate) fn value(&self) -> f32 {
        self.value
    }

    /// Make the current value visible to the control side.
    pub(crate) fn publish(&self) {
        self.shared
            .current
            .store(self.value.to_bits(), Ordering::Relaxed);
    }
}
