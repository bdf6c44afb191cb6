//! Playback-rate steering from the detected speech rate.
//!
//! Every evaluation asks the detector for a multiplier and moves toward it
//! by at most one step. A rate change the controller did not make itself
//! is treated as the listener's choice: it becomes the new baseline and
//! automatic adjustment holds off for a grace window.

use super::{SpeechRate, SpeechRateDetector, StepLimiter, Ticker};
use crate::media::PlaybackControl;
use crate::presets::{TargetSpeechRate, SPEECH_RATE};
use crate::scheduler::{Cadence, Scheduler, TaskKind};
use serde::Serialize;

/// Rates closer than this to our own last write are our own echo.
const OWN_WRITE_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRateStatus {
    pub enabled: bool,
    pub target: TargetSpeechRate,
    pub detected: SpeechRate,
    pub adjustment: f32,
    pub playback_rate: f64,
    pub paused: bool,
    pub user_override: bool,
}

pub struct SpeechRateController {
    ticker: Ticker,
    target: TargetSpeechRate,
    adjustment: StepLimiter,
    original_rate: f64,
    last_written: Option<f64>,
    user_override: bool,
    last_user_set_ms: f64,
    paused: bool,
}

impl Default for SpeechRateController {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechRateController {
    pub fn new() -> Self {
        Self {
            ticker: Ticker::default(),
            target: TargetSpeechRate::default(),
            adjustment: Self::fresh_limiter(),
            original_rate: 1.0,
            last_written: None,
            user_override: false,
            last_user_set_ms: 0.0,
            paused: false,
        }
    }

    fn fresh_limiter() -> StepLimiter {
        StepLimiter::new(1.0, SPEECH_RATE.max_step)
            .with_range(SPEECH_RATE.min_playback_rate, SPEECH_RATE.max_playback_rate)
    }

    /// Capture the element's current rate as baseline and start periodic
    /// evaluation.
    pub fn enable<P: PlaybackControl + ?Sized>(
        &mut self,
        target: TargetSpeechRate,
        media: &P,
        scheduler: &mut Scheduler,
        now_ms: f64,
    ) {
        let cadence = Cadence::Every {
            ms: SPEECH_RATE.evaluation_period_ms,
        };
        if !self
            .ticker
            .start(scheduler, TaskKind::SpeechRate, cadence, now_ms)
        {
            return;
        }
        self.target = target;
        self.original_rate = media.playback_rate();
        self.adjustment.reset(1.0);
        log::info!(
            "speech-rate adjustment enabled (target {:?}, base {:.2}x)",
            target,
            self.original_rate
        );
    }

    /// Stop evaluating and put the baseline rate back.
    pub fn disable<P: PlaybackControl + ?Sized>(&mut self, media: &mut P, scheduler: &mut Scheduler) {
        if !self.ticker.stop(scheduler) {
            return;
        }
        self.write_rate(media, self.original_rate);
        self.adjustment.reset(1.0);
        log::info!("speech-rate adjustment disabled, restored {:.2}x", self.original_rate);
    }

    pub fn is_enabled(&self) -> bool {
        self.ticker.is_running()
    }

    /// Host notification that the element's rate changed.
    pub fn on_rate_change<P: PlaybackControl + ?Sized>(&mut self, media: &P, now_ms: f64) {
        let rate = media.playback_rate();
        if let Some(written) = self.last_written {
            if (rate - written).abs() < OWN_WRITE_EPS {
                return;
            }
        }
        self.user_override = true;
        self.last_user_set_ms = now_ms;
        self.original_rate = rate;
        log::info!("playback rate set to {rate:.2}x by the listener, holding adjustment");
    }

    /// One evaluation step.
    pub fn evaluate<P: PlaybackControl + ?Sized>(
        &mut self,
        detector: &SpeechRateDetector,
        media: &mut P,
        now_ms: f64,
    ) {
        if !self.is_enabled() || self.paused {
            return;
        }
        if self.user_override {
            if now_ms - self.last_user_set_ms < SPEECH_RATE.override_grace_ms {
                return;
            }
            self.user_override = false;
        }

        let wanted = detector.calculate_adjustment(self.target);
        let before = self.adjustment.current();
        if (wanted - before).abs() > SPEECH_RATE.deadband {
            log::debug!("speed adjusting: {before:.2}x -> {wanted:.2}x");
        }
        let adjustment = self.adjustment.process(wanted);
        self.write_rate(media, adjustment as f64 * self.original_rate);

        let rate = detector.rate();
        log::debug!(
            "speech rate {:.2} syl/s ({}, {:.0}%), playback {:.2}x",
            rate.syllables_per_second,
            rate.category.name(),
            rate.confidence * 100.0,
            media.playback_rate()
        );
    }

    fn write_rate<P: PlaybackControl + ?Sized>(&mut self, media: &mut P, rate: f64) {
        media.set_playback_rate(rate);
        // Hosts may round; remember what actually stuck
        self.last_written = Some(media.playback_rate());
    }

    /// Change target and evaluate straight away.
    pub fn set_target_rate<P: PlaybackControl + ?Sized>(
        &mut self,
        target: TargetSpeechRate,
        detector: &SpeechRateDetector,
        media: &mut P,
        now_ms: f64,
    ) {
        self.target = target;
        if self.is_enabled() {
            self.evaluate(detector, media, now_ms);
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn user_override(&self) -> bool {
        self.user_override
    }

    pub fn adjustment(&self) -> f32 {
        self.adjustment.current()
    }

    pub fn target(&self) -> TargetSpeechRate {
        self.target
    }

    pub fn status<P: PlaybackControl + ?Sized>(
        &self,
        detector: &SpeechRateDetector,
        media: &P,
    ) -> SpeechRateStatus {
        SpeechRateStatus {
            enabled: self.is_enabled(),
            target: self.target,
            detected: detector.rate(),
            adjustment: self.adjustment.current(),
            playback_rate: media.playback_rate(),
            paused: self.paused,
            user_override: self.user_override,
        }
    }
}
