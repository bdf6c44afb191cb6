//! Closed-loop controllers that read analysis taps and write graph
//! parameters, one tick at a time.
//!
//! Each controller owns the writers for the parameters it drives and a
//! [`Ticker`] holding its scheduled task. Ticks re-check the running state
//! before doing anything, so a tick that slips past a stop is a no-op.

pub mod auto_gain;
pub mod gain_smoother;
pub mod level_meter;
pub mod rate_controller;
pub mod slew;
pub mod speech_rate;
pub mod voice_focus;

pub use auto_gain::AutoGainController;
pub use gain_smoother::GainSmoother;
pub use level_meter::LevelMeter;
pub use rate_controller::{SpeechRateController, SpeechRateStatus};
pub use slew::StepLimiter;
pub use speech_rate::{RateCategory, SpeechRate, SpeechRateDetector};
pub use voice_focus::VoiceFocusController;

use crate::scheduler::{Cadence, Scheduler, TaskHandle, TaskKind};

/// Running state of a controller, expressed as the scheduled task it owns.
#[derive(Debug, Default)]
pub(crate) struct Ticker {
    task: Option<TaskHandle>,
}

impl Ticker {
    /// Schedule the task unless already running. Returns true on a
    /// stopped -> running transition.
    pub(crate) fn start(
        &mut self,
        scheduler: &mut Scheduler,
        kind: TaskKind,
        cadence: Cadence,
        now_ms: f64,
    ) -> bool {
        if self.task.is_some() {
            return false;
        }
        self.task = Some(scheduler.schedule(kind, cadence, now_ms));
        true
    }

    /// Cancel the task if running. Returns true on a running -> stopped
    /// transition.
    pub(crate) fn stop(&mut self, scheduler: &mut Scheduler) -> bool {
        match self.task.take() {
            Some(handle) => {
                scheduler.cancel(handle);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.is_some()
    }
}
