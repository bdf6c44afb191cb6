//! Voice focus: duck the low and high bands while speech is present.
//!
//! Presence is a continuous 0..1 value derived from the voice-band level,
//! so ducking fades in and out with the speech instead of switching.

use super::{LevelMeter, Ticker};
use crate::dsp::utils::db_to_lin;
use crate::graph::{GraphError, GraphHandle, ParamId, ParamWriter, Ramp, TapId};
use crate::presets::VOICE_FOCUS;
use crate::scheduler::{Cadence, Scheduler, TaskKind};

/// Speech presence (0..1) for a linear voice-band RMS level.
pub fn speech_presence(level: f32) -> f32 {
    ((level - VOICE_FOCUS.speech_threshold) / VOICE_FOCUS.speech_range).clamp(0.0, 1.0)
}

/// Linear duck gain for `amount_db` of ducking at `presence`.
pub fn duck_gain(amount_db: f32, presence: f32) -> f32 {
    db_to_lin(-amount_db * presence)
}

pub struct VoiceFocusController {
    meter: LevelMeter,
    low: ParamWriter,
    high: ParamWriter,
    ticker: Ticker,
    ducking_amount_db: f32,
    speech_presence: f32,
    duck_gain: f32,
}

impl VoiceFocusController {
    /// Claims the low and high band gains of `graph`.
    pub fn new(graph: &GraphHandle, ducking_amount_db: f32) -> Result<Self, GraphError> {
        let mut vf = Self {
            meter: LevelMeter::new(graph.tap(TapId::Mid)),
            low: graph.claim(ParamId::LowBandGain)?,
            high: graph.claim(ParamId::HighBandGain)?,
            ticker: Ticker::default(),
            ducking_amount_db: VOICE_FOCUS.default_ducking_db,
            speech_presence: 0.0,
            duck_gain: 1.0,
        };
        vf.set_ducking_amount(ducking_amount_db);
        Ok(vf)
    }

    pub fn start(&mut self, scheduler: &mut Scheduler, now_ms: f64) {
        if self.ticker.start(scheduler, TaskKind::VoiceFocus, Cadence::EveryFrame, now_ms) {
            log::debug!("voice focus started ({:.1} dB)", self.ducking_amount_db);
        }
    }

    /// Stops ticking and glides both bands back to unity.
    pub fn stop(&mut self, scheduler: &mut Scheduler) {
        if !self.ticker.stop(scheduler) {
            return;
        }
        let ramp = Ramp::Linear {
            ms: VOICE_FOCUS.release_ramp_ms,
        };
        self.low.set_target(1.0, ramp);
        self.high.set_target(1.0, ramp);
        self.speech_presence = 0.0;
        self.duck_gain = 1.0;
        log::debug!("voice focus stopped");
    }

    /// Put both bands back to unity without touching the running state.
    pub fn reset(&mut self, ramp: Ramp) {
        self.low.set_target(1.0, ramp);
        self.high.set_target(1.0, ramp);
        self.speech_presence = 0.0;
        self.duck_gain = 1.0;
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    pub fn tick(&mut self) {
        if !self.is_running() {
            return;
        }
        let level = self.meter.rms();
        self.apply_level(level);
    }

    /// One control step for a linear voice-band level.
    pub fn apply_level(&mut self, level: f32) {
        if !level.is_finite() {
            return;
        }
        self.speech_presence = speech_presence(level);
        self.duck_gain = duck_gain(self.ducking_amount_db, self.speech_presence);
        let ramp = Ramp::Exponential {
            tau_ms: VOICE_FOCUS.write_tau_ms,
        };
        self.low.set_target(self.duck_gain, ramp);
        self.high.set_target(self.duck_gain, ramp);
    }

    /// Takes effect on the next tick.
    pub fn set_ducking_amount(&mut self, db: f32) {
        if db.is_finite() {
            self.ducking_amount_db = db.clamp(0.0, VOICE_FOCUS.max_ducking_db);
        }
    }

    pub fn ducking_amount_db(&self) -> f32 {
        self.ducking_amount_db
    }

    pub fn speech_presence(&self) -> f32 {
        self.speech_presence
    }

    pub fn duck_gain(&self) -> f32 {
        self.duck_gain
    }
}
