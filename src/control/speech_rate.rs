//! Syllable-rate estimation from the voice band.
//!
//! Vowels are loud and voiced (low zero-crossing rate), so a frame whose
//! energy stands out from the recent average while its ZCR stays low is
//! taken as a syllable nucleus. The spacing between accepted nuclei gives
//! syllables per second.

use super::{LevelMeter, Ticker};
use crate::dsp::utils::{frame_rms, zero_crossing_rate};
use crate::graph::AnalysisTap;
use crate::presets::{TargetSpeechRate, SPEECH_RATE};
use crate::scheduler::{Cadence, Scheduler, TaskKind};
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateCategory {
    /// Not enough syllables seen yet.
    #[default]
    Unknown,
    VerySlow,
    Slow,
    Normal,
    Fast,
    VeryFast,
}

impl RateCategory {
    pub fn classify(syllables_per_second: f32) -> Self {
        let s = &SPEECH_RATE.standards;
        if syllables_per_second <= 0.0 {
            RateCategory::Unknown
        } else if syllables_per_second < s.very_slow {
            RateCategory::VerySlow
        } else if syllables_per_second < s.slow {
            RateCategory::Slow
        } else if syllables_per_second < s.normal {
            RateCategory::Normal
        } else if syllables_per_second < s.fast {
            RateCategory::Fast
        } else {
            RateCategory::VeryFast
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RateCategory::Unknown => "unknown",
            RateCategory::VerySlow => "very_slow",
            RateCategory::Slow => "slow",
            RateCategory::Normal => "normal",
            RateCategory::Fast => "fast",
            RateCategory::VeryFast => "very_fast",
        }
    }
}

/// Latest estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRate {
    /// 0 while unknown.
    pub syllables_per_second: f32,
    pub category: RateCategory,
    /// Fraction of the interval window filled, 0..1.
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy)]
struct EnergyFrame {
    energy: f32,
    zcr: f32,
    time_ms: f64,
}

pub struct SpeechRateDetector {
    meter: LevelMeter,
    ticker: Ticker,
    history: VecDeque<EnergyFrame>,
    intervals: VecDeque<f64>,
    last_syllable_ms: Option<f64>,
    syllables_per_second: f32,
    category: RateCategory,
}

impl SpeechRateDetector {
    pub fn new(tap: AnalysisTap) -> Self {
        Self {
            meter: LevelMeter::new(tap),
            ticker: Ticker::default(),
            history: VecDeque::with_capacity(SPEECH_RATE.max_history + 1),
            intervals: VecDeque::with_capacity(SPEECH_RATE.max_intervals + 1),
            last_syllable_ms: None,
            syllables_per_second: 0.0,
            category: RateCategory::Unknown,
        }
    }

    /// Clears the rolling windows and starts ticking.
    pub fn start(&mut self, scheduler: &mut Scheduler, now_ms: f64) {
        if !self
            .ticker
            .start(scheduler, TaskKind::SpeechDetect, Cadence::EveryFrame, now_ms)
        {
            return;
        }
        self.history.clear();
        self.intervals.clear();
        self.last_syllable_ms = None;
        log::debug!("speech-rate detector started");
    }

    /// Stops ticking. The last estimate stays readable.
    pub fn stop(&mut self, scheduler: &mut Scheduler) {
        if self.ticker.stop(scheduler) {
            log::debug!(
                "speech-rate detector stopped at {:.2} syl/s",
                self.syllables_per_second
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    pub fn tick(&mut self, now_ms: f64) {
        if !self.is_running() {
            return;
        }
        let frame = self.meter.read();
        let energy = frame_rms(frame);
        let zcr = zero_crossing_rate(frame);
        self.push_frame(energy, zcr, now_ms);
    }

    /// Feed one analysis frame.
    pub fn push_frame(&mut self, energy: f32, zcr: f32, now_ms: f64) {
        self.history.push_back(EnergyFrame {
            energy,
            zcr,
            time_ms: now_ms,
        });
        while self.history.len() > SPEECH_RATE.max_history {
            self.history.pop_front();
        }
        self.detect_syllable();
        self.update_rate();
    }

    fn detect_syllable(&mut self) {
        let n = SPEECH_RATE.recent_frames;
        if self.history.len() < n {
            return;
        }
        let Some(&current) = self.history.back() else {
            return;
        };
        let avg = self.history.iter().rev().take(n).map(|f| f.energy).sum::<f32>() / n as f32;
        let threshold = SPEECH_RATE
            .energy_threshold
            .max(avg * SPEECH_RATE.energy_ratio);
        if current.energy <= threshold || current.zcr >= SPEECH_RATE.zcr_threshold {
            return;
        }

        if let Some(last) = self.last_syllable_ms {
            let gap = current.time_ms - last;
            if gap <= SPEECH_RATE.min_syllable_gap_ms {
                return;
            }
            self.intervals.push_back(gap);
            while self.intervals.len() > SPEECH_RATE.max_intervals {
                self.intervals.pop_front();
            }
        }
        self.last_syllable_ms = Some(current.time_ms);
    }

    fn update_rate(&mut self) {
        if self.intervals.len() < SPEECH_RATE.min_intervals {
            self.syllables_per_second = 0.0;
            self.category = RateCategory::Unknown;
            return;
        }
        let avg_ms = self.intervals.iter().sum::<f64>() / self.intervals.len() as f64;
        self.syllables_per_second = (1000.0 / avg_ms) as f32;
        self.category = RateCategory::classify(self.syllables_per_second);
    }

    pub fn rate(&self) -> SpeechRate {
        SpeechRate {
            syllables_per_second: self.syllables_per_second,
            category: self.category,
            confidence: (self.intervals.len() as f32 / SPEECH_RATE.max_intervals as f32).min(1.0),
        }
    }

    /// Playback multiplier that brings the detected rate to `target`:
    /// detected / target syllables per second, clamped to the playback
    /// range and snapped to 1.0 inside the deadband. Unknown rate gives 1.0.
    pub fn calculate_adjustment(&self, target: TargetSpeechRate) -> f32 {
        if self.syllables_per_second <= 0.0 {
            return 1.0;
        }
        let adjustment = (self.syllables_per_second / target.syllables_per_second())
            .clamp(SPEECH_RATE.min_playback_rate, SPEECH_RATE.max_playback_rate);
        if (adjustment - 1.0).abs() < SPEECH_RATE.deadband {
            1.0
        } else {
            adjustment
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TAP_SIZE;

    const FRAME_MS: f64 = 1000.0 / 60.0;

    fn detector() -> SpeechRateDetector {
        SpeechRateDetector::new(AnalysisTap::new(TAP_SIZE))
    }

    /// Background frames with a voiced peak every `every` frames.
    fn feed(d: &mut SpeechRateDetector, frames: usize, every: usize) {
        for i in 0..frames {
            let now = i as f64 * FRAME_MS;
            if i % every == every - 1 {
                d.push_frame(0.2, 0.05, now);
            } else {
                d.push_frame(0.001, 0.3, now);
            }
        }
    }

    #[test]
    fn four_hundred_ms_syllables_are_slow() {
        let mut d = detector();
        // 24 frames at 60 fps = 400 ms
        feed(&mut d, 24 * 14, 24);
        let rate = d.rate();
        assert!((rate.syllables_per_second - 2.5).abs() < 0.01, "{rate:?}");
        assert_eq!(rate.category, RateCategory::Slow);
        assert!(rate.confidence > 0.5 && rate.confidence <= 1.0);
    }

    #[test]
    fn too_few_intervals_is_unknown() {
        let mut d = detector();
        feed(&mut d, 24 * 5, 24);
        let rate = d.rate();
        assert_eq!(rate.syllables_per_second, 0.0);
        assert_eq!(rate.category, RateCategory::Unknown);
        assert_eq!(d.calculate_adjustment(TargetSpeechRate::Normal), 1.0);
    }

    #[test]
    fn unvoiced_peaks_are_ignored() {
        let mut d = detector();
        for i in 0..600 {
            let zcr = if i % 24 == 23 { 0.4 } else { 0.3 };
            let energy = if i % 24 == 23 { 0.3 } else { 0.001 };
            d.push_frame(energy, zcr, i as f64 * FRAME_MS);
        }
        assert_eq!(d.rate().category, RateCategory::Unknown);
    }

    #[test]
    fn close_peaks_count_once() {
        let mut d = detector();
        for i in 0..24 * 14 {
            let now = i as f64 * FRAME_MS;
            // Two loud frames 16.7 ms apart at every syllable
            let k = i % 24;
            if k == 22 || k == 23 {
                d.push_frame(0.2 + k as f32 * 0.1, 0.05, now);
            } else {
                d.push_frame(0.001, 0.3, now);
            }
        }
        assert!((d.rate().syllables_per_second - 2.5).abs() < 0.01);
    }

    #[test]
    fn history_and_intervals_are_bounded() {
        let mut d = detector();
        feed(&mut d, 2000, 12);
        assert_eq!(d.history.len(), SPEECH_RATE.max_history);
        assert_eq!(d.intervals.len(), SPEECH_RATE.max_intervals);
        assert_eq!(d.rate().confidence, 1.0);
        assert_eq!(d.rate().category, RateCategory::Fast);
    }

    #[test]
    fn categories_follow_thresholds() {
        assert_eq!(RateCategory::classify(0.0), RateCategory::Unknown);
        assert_eq!(RateCategory::classify(1.9), RateCategory::VerySlow);
        assert_eq!(RateCategory::classify(2.0), RateCategory::Slow);
        assert_eq!(RateCategory::classify(3.0), RateCategory::Normal);
        assert_eq!(RateCategory::classify(4.5), RateCategory::Fast);
        assert_eq!(RateCategory::classify(6.0), RateCategory::VeryFast);
    }

    #[test]
    fn adjustment_snaps_inside_deadband() {
        let mut d = detector();
        // 4.2 syl/s against a 4.0 target: raw 1.05
        d.intervals.extend([1000.0 / 4.2; 10]);
        d.update_rate();
        assert_eq!(d.calculate_adjustment(TargetSpeechRate::Normal), 1.0);

        d.intervals.clear();
        d.intervals.extend([1000.0 / 8.0; 10]);
        d.update_rate();
        assert_eq!(d.calculate_adjustment(TargetSpeechRate::Slow), 1.5);

        d.intervals.clear();
        d.intervals.extend([1000.0 / 2.5; 10]);
        d.update_rate();
        assert!((d.calculate_adjustment(TargetSpeechRate::Fast) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn start_resets_and_stop_retains() {
        let mut d = detector();
        let mut sched = Scheduler::new();
        feed(&mut d, 24 * 14, 24);
        d.start(&mut sched, 0.0);
        assert!(d.history.is_empty());
        feed(&mut d, 24 * 14, 24);
        d.stop(&mut sched);
        d.stop(&mut sched);
        assert!((d.rate().syllables_per_second - 2.5).abs() < 0.01);
        let frames = d.history.len();
        d.tick(99_999.0);
        assert_eq!(d.history.len(), frames);
    }
}
