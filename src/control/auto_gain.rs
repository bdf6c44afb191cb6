//! Automatic gain control.
//!
//! Once per frame: measure the voice band, take the distance to the target
//! loudness as the desired gain, clamp it, smooth it with attack/release
//! and write gain + manual output gain into the makeup stage.
//!
//! The voice band (mid tap) is the loudness reference, so dialogue level
//! drives the loop rather than music or rumble.

use super::{GainSmoother, LevelMeter, Ticker};
use crate::dsp::utils::db_to_lin;
use crate::graph::{GraphError, GraphHandle, ParamId, ParamWriter, Ramp, TapId};
use crate::presets::AGC;
use crate::scheduler::{Cadence, Scheduler, TaskKind};
use crate::settings::{OUTPUT_GAIN_RANGE, TARGET_LOUDNESS_RANGE};

/// Reported before the first measurement.
pub const INITIAL_MEASURED_DB: f32 = -60.0;

pub struct AutoGainController {
    meter: LevelMeter,
    makeup: ParamWriter,
    smoother: GainSmoother,
    ticker: Ticker,

    target_loudness_db: f32,
    output_gain_db: f32,

    current_gain_db: f32,
    target_gain_db: f32,
    last_measured_db: f32,
}

impl AutoGainController {
    /// Claims the makeup-gain parameter of `graph`.
    pub fn new(graph: &GraphHandle) -> Result<Self, GraphError> {
        Ok(Self {
            meter: LevelMeter::new(graph.tap(TapId::Mid)),
            makeup: graph.claim(ParamId::MakeupGain)?,
            smoother: GainSmoother::new(AGC.attack_ms, AGC.release_ms, AGC.tick_rate_hz),
            ticker: Ticker::default(),
            target_loudness_db: AGC.target_loudness_db,
            output_gain_db: 0.0,
            current_gain_db: 0.0,
            target_gain_db: 0.0,
            last_measured_db: INITIAL_MEASURED_DB,
        })
    }

    pub fn start(&mut self, scheduler: &mut Scheduler, now_ms: f64) {
        if self.ticker.start(scheduler, TaskKind::AutoGain, Cadence::EveryFrame, now_ms) {
            log::debug!("agc started (target {:.1} dB)", self.target_loudness_db);
        }
    }

    /// Stops ticking. The gain stays where it is; see [`reset`](Self::reset).
    pub fn stop(&mut self, scheduler: &mut Scheduler) {
        if self.ticker.stop(scheduler) {
            log::debug!("agc stopped at {:.2} dB", self.current_gain_db);
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    pub fn tick(&mut self) {
        if !self.is_running() {
            return;
        }
        let measured_db = self.meter.level_db();
        self.apply_measurement(measured_db);
    }

    /// One control step for a loudness reading.
    pub fn apply_measurement(&mut self, measured_db: f32) {
        if !measured_db.is_finite() {
            return;
        }
        self.last_measured_db = measured_db;
        self.target_gain_db =
            (self.target_loudness_db - measured_db).clamp(AGC.min_gain_db, AGC.max_gain_db);
        self.current_gain_db = self
            .smoother
            .step(self.current_gain_db, self.target_gain_db);
        self.write_makeup();
    }

    fn write_makeup(&mut self) {
        self.makeup.set_target_db(
            self.current_gain_db + self.output_gain_db,
            Ramp::Exponential {
                tau_ms: AGC.write_tau_ms,
            },
        );
    }

    pub fn set_target_loudness(&mut self, db: f32) {
        if db.is_finite() {
            self.target_loudness_db = db.clamp(TARGET_LOUDNESS_RANGE.0, TARGET_LOUDNESS_RANGE.1);
        }
    }

    /// Applied straight away so a manual change is audible even while the
    /// loop is stopped.
    pub fn set_output_gain(&mut self, db: f32) {
        if !db.is_finite() {
            return;
        }
        self.output_gain_db = db.clamp(OUTPUT_GAIN_RANGE.0, OUTPUT_GAIN_RANGE.1);
        self.write_makeup();
    }

    /// Drop the automatic part of the gain, keeping the manual output gain.
    pub fn release_gain(&mut self) {
        self.current_gain_db = 0.0;
        self.target_gain_db = 0.0;
        self.write_makeup();
    }

    /// Back to neutral: 0 dB of automatic gain and a unity makeup stage.
    pub fn reset(&mut self, ramp: Ramp) {
        self.current_gain_db = 0.0;
        self.target_gain_db = 0.0;
        self.makeup.set_target(1.0, ramp);
    }

    pub fn current_gain_db(&self) -> f32 {
        self.current_gain_db
    }

    pub fn target_gain_db(&self) -> f32 {
        self.target_gain_db
    }

    pub fn last_measured_db(&self) -> f32 {
        self.last_measured_db
    }

    pub fn target_loudness_db(&self) -> f32 {
        self.target_loudness_db
    }

    pub fn output_gain_db(&self) -> f32 {
        self.output_gain_db
    }

    /// Linear makeup gain most recently requested.
    pub fn makeup_target(&self) -> f32 {
        self.makeup.target()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SignalPath;
    use crate::settings::Settings;

    fn controller() -> (GraphHandle, AutoGainController) {
        let (_path, graph) = SignalPath::new(48000.0, 2, &Settings::default()).unwrap();
        let agc = AutoGainController::new(&graph).unwrap();
        (graph, agc)
    }

    #[test]
    fn quiet_programme_converges_to_twelve_db_boost() {
        let (_g, mut agc) = controller();
        agc.apply_measurement(-30.0);
        assert_eq!(agc.target_gain_db(), 12.0);
        let first = agc.current_gain_db();
        assert!(first > 0.0 && first < 12.0);
        for _ in 0..60 {
            agc.apply_measurement(-30.0);
        }
        assert!((agc.current_gain_db() - 12.0).abs() < 0.1);
        assert!((agc.makeup_target() - db_to_lin(agc.current_gain_db())).abs() < 1e-4);
    }

    #[test]
    fn error_is_clamped() {
        let (_g, mut agc) = controller();
        agc.apply_measurement(-120.0);
        assert_eq!(agc.target_gain_db(), AGC.max_gain_db);
        agc.apply_measurement(20.0);
        assert_eq!(agc.target_gain_db(), AGC.min_gain_db);
        for _ in 0..200 {
            agc.apply_measurement(-200.0);
            assert!(agc.current_gain_db() <= AGC.max_gain_db + 1e-4);
        }
    }

    #[test]
    fn output_gain_rides_on_top() {
        let (_g, mut agc) = controller();
        agc.set_output_gain(6.0);
        assert!((agc.makeup_target() - db_to_lin(6.0)).abs() < 1e-4);
        for _ in 0..100 {
            agc.apply_measurement(-18.0);
        }
        assert!((agc.makeup_target() - db_to_lin(6.0)).abs() < 1e-3);
        agc.set_output_gain(40.0);
        assert_eq!(agc.output_gain_db(), OUTPUT_GAIN_RANGE.1);
    }

    #[test]
    fn target_change_applies_next_tick() {
        let (_g, mut agc) = controller();
        agc.apply_measurement(-24.0);
        assert_eq!(agc.target_gain_db(), 6.0);
        agc.set_target_loudness(-20.0);
        agc.apply_measurement(-24.0);
        assert_eq!(agc.target_gain_db(), 4.0);
    }

    #[test]
    fn lifecycle_is_idempotent() {
        let (_g, mut agc) = controller();
        let mut sched = Scheduler::new();
        agc.start(&mut sched, 0.0);
        agc.start(&mut sched, 0.0);
        assert!(agc.is_running());
        assert_eq!(sched.len(), 1);
        agc.stop(&mut sched);
        agc.stop(&mut sched);
        assert!(!agc.is_running());
        assert!(sched.is_empty());
    }

    #[test]
    fn stopped_tick_writes_nothing() {
        let (_g, mut agc) = controller();
        agc.tick();
        assert_eq!(agc.last_measured_db(), INITIAL_MEASURED_DB);
        assert_eq!(agc.makeup_target(), 1.0);
    }

    #[test]
    fn running_tick_reads_the_voice_band() {
        let (mut path, graph) = SignalPath::new(48000.0, 1, &Settings::default()).unwrap();
        let mut agc = AutoGainController::new(&graph).unwrap();
        let mut sched = Scheduler::new();
        agc.start(&mut sched, 0.0);

        let mut buf: Vec<f32> = (0..4800)
            .map(|i| 0.1 * (std::f32::consts::TAU * 1000.0 * i as f32 / 48000.0).sin())
            .collect();
        path.process(&mut [&mut buf[..]]);
        agc.tick();
        // 0.1 peak sine: about -23 dBFS RMS
        assert!((agc.last_measured_db() + 23.0).abs() < 1.0);
        assert!(agc.current_gain_db() > 0.0);
    }

    #[test]
    fn release_keeps_manual_gain() {
        let (_g, mut agc) = controller();
        agc.set_output_gain(-6.0);
        agc.apply_measurement(-40.0);
        agc.release_gain();
        assert_eq!(agc.current_gain_db(), 0.0);
        assert!((agc.makeup_target() - db_to_lin(-6.0)).abs() < 1e-5);
    }

    #[test]
    fn reset_returns_to_unity() {
        let (_g, mut agc) = controller();
        agc.apply_measurement(-40.0);
        agc.reset(Ramp::Instant);
        assert_eq!(agc.current_gain_db(), 0.0);
        assert_eq!(agc.makeup_target(), 1.0);
    }
}
