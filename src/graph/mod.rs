//! The per-element signal path and its control-side handle.
//!
//! ```text
//! source ─┬─ [pre tap]
//!         ├─ low band  (LP 250 Hz)            × LowBandGain  ─┐
//!         ├─ mid band  (HP 300 → LP 3400 Hz)  × MidBandGain  ─┼─ [mid tap: mid band only]
//!         └─ high band (HP 3400 Hz)           × HighBandGain ─┘
//!                              merge → low shelf → high shelf
//!                              → compressor → makeup (MakeupGain × MakeupFade)
//!                              → limiter (LimiterMix crossfade) ─ [post tap] → out
//! ```
//!
//! [`SignalPath`] lives on the audio side and is driven block by block.
//! [`GraphHandle`] is the cheap, cloneable control side: it hands out
//! exclusive [`ParamWriter`]s and exposes the taps and meters.

pub mod param;
pub mod tap;

pub use param::{ParamWriter, Ramp};
pub use tap::{AnalysisTap, TAP_SIZE};

use crate::dsp::{Biquad, BrickwallLimiter, CompressorSettings, DynamicsCompressor, BUTTERWORTH_Q};
use crate::meters::Meters;
use crate::presets::{self, BAND_SPLIT};
use crate::settings::Settings;
use ebur128::{EbuR128, Mode};
use param::{ParamShared, SmoothedParam};
use std::fmt;
use std::sync::Arc;

/// Samples between control-rate updates (EQ and compressor retuning,
/// tap writes).
pub const CONTROL_BLOCK: usize = 64;
pub const MAX_CHANNELS: usize = 2;
pub const MIN_SAMPLE_RATE: f32 = 8000.0;
pub const MAX_SAMPLE_RATE: f32 = 192_000.0;

/// Every writable parameter in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    LowBandGain,
    MidBandGain,
    HighBandGain,
    LowShelfFreq,
    LowShelfGain,
    HighShelfFreq,
    HighShelfGain,
    CompThreshold,
    CompKnee,
    CompRatio,
    CompAttack,
    CompRelease,
    /// AGC output (includes the manual output gain).
    MakeupGain,
    /// Connect / disconnect fades.
    MakeupFade,
    /// 0 = limiter bypassed, 1 = fully limited.
    LimiterMix,
}

impl ParamId {
    pub const ALL: [ParamId; 15] = [
        ParamId::LowBandGain,
        ParamId::MidBandGain,
        ParamId::HighBandGain,
        ParamId::LowShelfFreq,
        ParamId::LowShelfGain,
        ParamId::HighShelfFreq,
        ParamId::HighShelfGain,
        ParamId::CompThreshold,
        ParamId::CompKnee,
        ParamId::CompRatio,
        ParamId::CompAttack,
        ParamId::CompRelease,
        ParamId::MakeupGain,
        ParamId::MakeupFade,
        ParamId::LimiterMix,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParamId::LowBandGain => "low-band-gain",
            ParamId::MidBandGain => "mid-band-gain",
            ParamId::HighBandGain => "high-band-gain",
            ParamId::LowShelfFreq => "low-shelf-freq",
            ParamId::LowShelfGain => "low-shelf-gain",
            ParamId::HighShelfFreq => "high-shelf-freq",
            ParamId::HighShelfGain => "high-shelf-gain",
            ParamId::CompThreshold => "comp-threshold",
            ParamId::CompKnee => "comp-knee",
            ParamId::CompRatio => "comp-ratio",
            ParamId::CompAttack => "comp-attack",
            ParamId::CompRelease => "comp-release",
            ParamId::MakeupGain => "makeup-gain",
            ParamId::MakeupFade => "makeup-fade",
            ParamId::LimiterMix => "limiter-mix",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn initial_value(self, settings: &Settings) -> f32 {
        let eq = settings.eq_preset.values();
        let comp = settings.compression_strength.settings();
        match self {
            ParamId::LowBandGain
            | ParamId::MidBandGain
            | ParamId::HighBandGain
            | ParamId::MakeupGain
            | ParamId::MakeupFade => 1.0,
            ParamId::LowShelfFreq => eq.low_shelf_freq,
            ParamId::LowShelfGain => eq.low_shelf_gain_db,
            ParamId::HighShelfFreq => eq.high_shelf_freq,
            ParamId::HighShelfGain => eq.high_shelf_gain_db,
            ParamId::CompThreshold => comp.threshold_db,
            ParamId::CompKnee => comp.knee_db,
            ParamId::CompRatio => comp.ratio,
            ParamId::CompAttack => comp.attack_ms,
            ParamId::CompRelease => comp.release_ms,
            ParamId::LimiterMix => {
                if settings.limiter_enabled {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Points in the graph an [`AnalysisTap`] observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TapId {
    /// Straight from the source.
    Pre,
    /// Mid (voice) band after its band gain.
    Mid,
    /// Final output.
    Post,
}

impl TapId {
    fn index(self) -> usize {
        match self {
            TapId::Pre => 0,
            TapId::Mid => 1,
            TapId::Post => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    UnsupportedSampleRate(f32),
    UnsupportedChannelCount(usize),
    /// Another controller already holds the writer for this parameter.
    AlreadyClaimed(ParamId),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnsupportedSampleRate(sr) => {
                write!(f, "unsupported sample rate {sr} Hz")
            }
            GraphError::UnsupportedChannelCount(n) => {
                write!(f, "unsupported channel count {n} (expected 1 or {MAX_CHANNELS})")
            }
            GraphError::AlreadyClaimed(id) => write!(f, "parameter {id} already has a writer"),
        }
    }
}

impl std::error::Error for GraphError {}

struct GraphShared {
    sample_rate: f32,
    channels: usize,
    params: Vec<Arc<ParamShared>>,
    taps: [AnalysisTap; 3],
    meters: Meters,
}

/// Control-side view of one signal path.
#[derive(Clone)]
pub struct GraphHandle {
    shared: Arc<GraphShared>,
}

impl GraphHandle {
    /// Take the single writer for `id`.
    pub fn claim(&self, id: ParamId) -> Result<ParamWriter, GraphError> {
        let cell = &self.shared.params[id.index()];
        if !cell.try_claim() {
            return Err(GraphError::AlreadyClaimed(id));
        }
        Ok(ParamWriter::new(id, Arc::clone(cell)))
    }

    pub fn tap(&self, id: TapId) -> AnalysisTap {
        self.shared.taps[id.index()].clone()
    }

    /// Value of `id` as last published by the audio side.
    pub fn param_value(&self, id: ParamId) -> f32 {
        self.shared.params[id.index()].current()
    }

    pub fn meters(&self) -> &Meters {
        &self.shared.meters
    }

    pub fn sample_rate(&self) -> f32 {
        self.shared.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.shared.channels
    }

    /// True when both handles refer to the same signal path.
    pub fn same_graph(&self, other: &GraphHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for GraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphHandle")
            .field("sample_rate", &self.shared.sample_rate)
            .field("channels", &self.shared.channels)
            .finish()
    }
}

/// Per-channel filter state.
struct ChannelStrip {
    low: Biquad,
    mid_hp: Biquad,
    mid_lp: Biquad,
    high: Biquad,
    low_shelf: Biquad,
    high_shelf: Biquad,
}

impl ChannelStrip {
    fn new(sr: f32) -> Self {
        Self {
            low: Biquad::lowpass(BAND_SPLIT.low_cutoff, BUTTERWORTH_Q, sr),
            mid_hp: Biquad::highpass(BAND_SPLIT.mid_low, BUTTERWORTH_Q, sr),
            mid_lp: Biquad::lowpass(BAND_SPLIT.mid_high, BUTTERWORTH_Q, sr),
            high: Biquad::highpass(BAND_SPLIT.high_cutoff, BUTTERWORTH_Q, sr),
            low_shelf: Biquad::new(),
            high_shelf: Biquad::new(),
        }
    }

    fn retune_shelves(&mut self, eq: [f32; 4], sr: f32) {
        self.low_shelf.update_low_shelf(eq[0], eq[1], sr);
        self.high_shelf.update_high_shelf(eq[2], eq[3], sr);
    }
}

/// Audio-side processing chain for one media element.
pub struct SignalPath {
    shared: Arc<GraphShared>,
    sample_rate: f32,
    strips: Vec<ChannelStrip>,

    // Sample-rate parameters
    low_gain: SmoothedParam,
    mid_gain: SmoothedParam,
    high_gain: SmoothedParam,
    makeup_gain: SmoothedParam,
    makeup_fade: SmoothedParam,
    limiter_mix: SmoothedParam,

    // Control-rate parameters
    low_shelf_freq: SmoothedParam,
    low_shelf_gain: SmoothedParam,
    high_shelf_freq: SmoothedParam,
    high_shelf_gain: SmoothedParam,
    comp_threshold: SmoothedParam,
    comp_knee: SmoothedParam,
    comp_ratio: SmoothedParam,
    comp_attack: SmoothedParam,
    comp_release: SmoothedParam,

    applied_eq: [f32; 4],
    compressor: DynamicsCompressor,
    limiter: BrickwallLimiter,

    // Mono downmixes for the taps, one control block each
    pre_scratch: Vec<f32>,
    mid_scratch: Vec<f32>,
    post_scratch: Vec<f32>,

    loudness_meter: Option<EbuR128>,
    interleaved: Vec<f32>,
}

impl SignalPath {
    /// Build a path for `channels` planar channels, with EQ, compression
    /// and limiter state taken from `settings`.
    pub fn new(
        sample_rate: f32,
        channels: usize,
        settings: &Settings,
    ) -> Result<(SignalPath, GraphHandle), GraphError> {
        if !sample_rate.is_finite() || !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate)
        {
            return Err(GraphError::UnsupportedSampleRate(sample_rate));
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(GraphError::UnsupportedChannelCount(channels));
        }

        let params: Vec<Arc<ParamShared>> = ParamId::ALL
            .iter()
            .map(|id| ParamShared::new(id.initial_value(settings)))
            .collect();
        let shared = Arc::new(GraphShared {
            sample_rate,
            channels,
            params,
            taps: [
                AnalysisTap::new(TAP_SIZE),
                AnalysisTap::new(TAP_SIZE),
                AnalysisTap::new(TAP_SIZE),
            ],
            meters: Meters::new(),
        });
        let follow =
            |id: ParamId| SmoothedParam::new(Arc::clone(&shared.params[id.index()]), sample_rate);

        let eq = settings.eq_preset.values();
        let applied_eq = [
            eq.low_shelf_freq,
            eq.low_shelf_gain_db,
            eq.high_shelf_freq,
            eq.high_shelf_gain_db,
        ];
        let strips = (0..channels)
            .map(|_| {
                let mut strip = ChannelStrip::new(sample_rate);
                strip.retune_shelves(applied_eq, sample_rate);
                strip
            })
            .collect();

        let path = SignalPath {
            sample_rate,
            strips,
            low_gain: follow(ParamId::LowBandGain),
            mid_gain: follow(ParamId::MidBandGain),
            high_gain: follow(ParamId::HighBandGain),
            makeup_gain: follow(ParamId::MakeupGain),
            makeup_fade: follow(ParamId::MakeupFade),
            limiter_mix: follow(ParamId::LimiterMix),
            low_shelf_freq: follow(ParamId::LowShelfFreq),
            low_shelf_gain: follow(ParamId::LowShelfGain),
            high_shelf_freq: follow(ParamId::HighShelfFreq),
            high_shelf_gain: follow(ParamId::HighShelfGain),
            comp_threshold: follow(ParamId::CompThreshold),
            comp_knee: follow(ParamId::CompKnee),
            comp_ratio: follow(ParamId::CompRatio),
            comp_attack: follow(ParamId::CompAttack),
            comp_release: follow(ParamId::CompRelease),
            applied_eq,
            compressor: DynamicsCompressor::new(
                settings.compression_strength.settings(),
                sample_rate,
            ),
            limiter: BrickwallLimiter::new(presets::LIMITER, sample_rate),
            pre_scratch: vec![0.0; CONTROL_BLOCK],
            mid_scratch: vec![0.0; CONTROL_BLOCK],
            post_scratch: vec![0.0; CONTROL_BLOCK],
            loudness_meter: EbuR128::new(channels as u32, sample_rate as u32, Mode::S)
                .map_err(|e| log::warn!("output loudness metering unavailable: {e}"))
                .ok(),
            interleaved: vec![0.0; CONTROL_BLOCK * channels],
            shared: Arc::clone(&shared),
        };
        Ok((path, GraphHandle { shared }))
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.strips.len()
    }

    /// Another handle onto this path's parameters, taps and meters.
    pub fn handle(&self) -> GraphHandle {
        GraphHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Process planar audio in place. Extra channels beyond the path's
    /// layout are left untouched; all channels are processed up to the
    /// shortest slice.
    pub fn process(&mut self, buffer: &mut [&mut [f32]]) {
        let channels = buffer.len().min(self.strips.len());
        if channels == 0 {
            return;
        }
        let frames = buffer[..channels]
            .iter()
            .map(|c| c.len())
            .min()
            .unwrap_or(0);
        let inv_channels = 1.0 / channels as f32;
        let feed_meter = channels == self.strips.len();

        let mut input_peak = 0.0f32;
        let mut output_peak = 0.0f32;
        let mut offset = 0;

        while offset < frames {
            let len = (frames - offset).min(CONTROL_BLOCK);
            self.update_control_rate(len);

            for i in 0..len {
                let idx = offset + i;
                let low_g = self.low_gain.next();
                let mid_g = self.mid_gain.next();
                let high_g = self.high_gain.next();
                let makeup = self.makeup_gain.next() * self.makeup_fade.next();
                let mix = self.limiter_mix.next();

                let mut frame = [0.0f32; MAX_CHANNELS];
                let mut pre = 0.0;
                let mut mid_sum = 0.0;
                let mut detector = 0.0f32;

                for ch in 0..channels {
                    let x = buffer[ch][idx];
                    pre += x;
                    input_peak = input_peak.max(x.abs());

                    let strip = &mut self.strips[ch];
                    let low = strip.low.process(x) * low_g;
                    let mid = strip.mid_lp.process(strip.mid_hp.process(x)) * mid_g;
                    let high = strip.high.process(x) * high_g;
                    mid_sum += mid;

                    let y = strip
                        .high_shelf
                        .process(strip.low_shelf.process(low + mid + high));
                    frame[ch] = y;
                    detector = detector.max(y.abs());
                }

                let gain = self.compressor.compute_gain(detector) * makeup;
                let mut limiter_detector = 0.0f32;
                for s in frame.iter_mut().take(channels) {
                    *s *= gain;
                    limiter_detector = limiter_detector.max(s.abs());
                }

                let limiter_gain = self.limiter.compute_gain(limiter_detector);
                let mut post = 0.0;
                for ch in 0..channels {
                    let dry = frame[ch];
                    let limited = BrickwallLimiter::ceiling(dry * limiter_gain);
                    let out = dry + (limited - dry) * mix;
                    buffer[ch][idx] = out;
                    post += out;
                    output_peak = output_peak.max(out.abs());
                    if feed_meter {
                        self.interleaved[i * channels + ch] = out;
                    }
                }

                self.pre_scratch[i] = pre * inv_channels;
                self.mid_scratch[i] = mid_sum * inv_channels;
                self.post_scratch[i] = post * inv_channels;
            }

            let taps = &self.shared.taps;
            taps[TapId::Pre.index()].push_samples(&self.pre_scratch[..len]);
            taps[TapId::Mid.index()].push_samples(&self.mid_scratch[..len]);
            taps[TapId::Post.index()].push_samples(&self.post_scratch[..len]);

            if feed_meter {
                if let Some(meter) = self.loudness_meter.as_mut() {
                    if let Err(e) = meter.add_frames_f32(&self.interleaved[..len * channels]) {
                        self.drop_loudness_meter(e);
                    }
                }
            }

            offset += len;
        }

        self.publish_params();

        let meters = &self.shared.meters;
        meters.set_input_peak(input_peak);
        meters.set_output_peak(output_peak);
        meters.set_compressor_reduction_db(self.compressor.gain_reduction_db());
        meters.set_limiter_reduction_db(self.limiter.gain_reduction_db());
        if let Some(meter) = self.loudness_meter.as_ref() {
            if let Ok(lufs) = meter.loudness_shortterm() {
                meters.set_output_lufs(lufs as f32);
            }
        }
    }

    /// A meter that rejected frames once is not fed again; the reading
    /// falls to the floor rather than holding its last value.
    fn drop_loudness_meter(&mut self, err: ebur128::Error) {
        log::warn!("output loudness metering stopped: {err}");
        self.loudness_meter = None;
        self.shared.meters.set_output_lufs(f32::NEG_INFINITY);
    }

    fn update_control_rate(&mut self, len: usize) {
        let eq = [
            self.low_shelf_freq.next_block(len),
            self.low_shelf_gain.next_block(len),
            self.high_shelf_freq.next_block(len),
            self.high_shelf_gain.next_block(len),
        ];
        if eq != self.applied_eq {
            for strip in self.strips.iter_mut() {
                strip.retune_shelves(eq, self.sample_rate);
            }
            self.applied_eq = eq;
        }

        let comp = CompressorSettings {
            threshold_db: self.comp_threshold.next_block(len),
            knee_db: self.comp_knee.next_block(len),
            ratio: self.comp_ratio.next_block(len),
            attack_ms: self.comp_attack.next_block(len),
            release_ms: self.comp_release.next_block(len),
        };
        if comp != self.compressor.settings() {
            self.compressor.set_settings(comp);
        }
    }

    fn publish_params(&self) {
        for p in [
            &self.low_gain,
            &self.mid_gain,
            &self.high_gain,
            &self.makeup_gain,
            &self.makeup_fade,
            &self.limiter_mix,
            &self.low_shelf_freq,
            &self.low_shelf_gain,
            &self.high_shelf_freq,
            &self.high_shelf_gain,
            &self.comp_threshold,
            &self.comp_knee,
            &self.comp_ratio,
            &self.comp_attack,
            &self.comp_release,
        ] {
            p.publish();
        }
    }

    /// Clear filter, dynamics and tap history (parameters keep their
    /// values).
    pub fn reset(&mut self) {
        for strip in self.strips.iter_mut() {
            strip.low.reset();
            strip.mid_hp.reset();
            strip.mid_lp.reset();
            strip.high.reset();
            strip.low_shelf.reset();
            strip.high_shelf.reset();
        }
        self.compressor.reset();
        self.limiter.reset();
        for tap in self.shared.taps.iter() {
            tap.clear();
        }
        if let Some(meter) = self.loudness_meter.as_mut() {
            meter.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    const SR: f32 = 48000.0;

    fn sine(freq: f32, amp: f32, start: usize, out: &mut [f32]) {
        for (i, s) in out.iter_mut().enumerate() {
            *s = amp * (TAU * freq * (start + i) as f32 / SR).sin();
        }
    }

    fn run_stereo(path: &mut SignalPath, freq: f32, amp: f32, blocks: usize) -> f32 {
        let mut l = vec![0.0; 512];
        let mut r = vec![0.0; 512];
        let mut peak = 0.0f32;
        for b in 0..blocks {
            sine(freq, amp, b * 512, &mut l);
            r.copy_from_slice(&l);
            path.process(&mut [&mut l[..], &mut r[..]]);
            for &s in l.iter().chain(r.iter()) {
                assert!(s.is_finite());
                peak = peak.max(s.abs());
            }
        }
        peak
    }

    #[test]
    fn rejects_unsupported_layouts() {
        let s = Settings::default();
        assert_eq!(
            SignalPath::new(SR, 0, &s).err(),
            Some(GraphError::UnsupportedChannelCount(0))
        );
        assert_eq!(
            SignalPath::new(SR, 6, &s).err(),
            Some(GraphError::UnsupportedChannelCount(6))
        );
        assert!(matches!(
            SignalPath::new(f32::NAN, 2, &s),
            Err(GraphError::UnsupportedSampleRate(_))
        ));
    }

    #[test]
    fn each_param_has_a_single_writer() {
        let (_path, handle) = SignalPath::new(SR, 2, &Settings::default()).unwrap();
        let writer = handle.claim(ParamId::MakeupGain).unwrap();
        assert_eq!(
            handle.claim(ParamId::MakeupGain).err(),
            Some(GraphError::AlreadyClaimed(ParamId::MakeupGain))
        );
        assert!(handle.claim(ParamId::MakeupFade).is_ok());
        drop(writer);
        assert!(handle.claim(ParamId::MakeupGain).is_ok());
    }

    #[test]
    fn silence_stays_silent() {
        let (mut path, handle) = SignalPath::new(SR, 2, &Settings::default()).unwrap();
        let mut l = vec![0.0; 1000];
        let mut r = vec![0.0; 1000];
        path.process(&mut [&mut l[..], &mut r[..]]);
        assert!(l.iter().chain(r.iter()).all(|&s| s.abs() < 1e-12));
        assert!(handle.meters().get_output_peak() < 1e-12);
    }

    #[test]
    fn pre_tap_sees_mono_downmix() {
        let (mut path, handle) = SignalPath::new(SR, 2, &Settings::default()).unwrap();
        let mut l = vec![0.5; 256];
        let mut r = vec![-0.1; 256];
        path.process(&mut [&mut l[..], &mut r[..]]);
        let mut out = [0.0; 4];
        handle.tap(TapId::Pre).read(&mut out);
        assert!(out.iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn mid_tap_carries_voice_band() {
        let (mut path, handle) = SignalPath::new(SR, 1, &Settings::default()).unwrap();
        let mut buf = vec![0.0; 4800];
        sine(1000.0, 0.5, 0, &mut buf);
        path.process(&mut [&mut buf[..]]);
        let mut voice = vec![0.0; TAP_SIZE];
        handle.tap(TapId::Mid).read(&mut voice);
        let voice_rms = crate::dsp::utils::frame_rms(&voice);

        let (mut path, handle) = SignalPath::new(SR, 1, &Settings::default()).unwrap();
        sine(60.0, 0.5, 0, &mut buf);
        path.process(&mut [&mut buf[..]]);
        let mut rumble = vec![0.0; TAP_SIZE];
        handle.tap(TapId::Mid).read(&mut rumble);
        let rumble_rms = crate::dsp::utils::frame_rms(&rumble);

        assert!(voice_rms > 0.2, "voice rms {voice_rms}");
        assert!(rumble_rms < voice_rms * 0.2, "rumble rms {rumble_rms}");
    }

    #[test]
    fn limiter_caps_boosted_output() {
        let (mut path, handle) = SignalPath::new(SR, 2, &Settings::default()).unwrap();
        let mut makeup = handle.claim(ParamId::MakeupGain).unwrap();
        makeup.set_target_db(24.0, Ramp::Instant);
        let peak = run_stereo(&mut path, 1000.0, 0.9, 40);
        assert!(peak <= 0.999 + 1e-6, "peak {peak}");
        assert!(handle.meters().get_limiter_reduction_db() > 0.0);
    }

    #[test]
    fn limiter_bypass_lets_peaks_through() {
        let settings = Settings {
            limiter_enabled: false,
            ..Settings::default()
        };
        let (mut path, handle) = SignalPath::new(SR, 2, &settings).unwrap();
        let mut makeup = handle.claim(ParamId::MakeupGain).unwrap();
        makeup.set_target_db(24.0, Ramp::Instant);
        let peak = run_stereo(&mut path, 1000.0, 0.9, 40);
        assert!(peak > 1.0, "peak {peak}");
    }

    #[test]
    fn band_gain_reduces_its_band() {
        let (mut path, handle) = SignalPath::new(SR, 2, &Settings::default()).unwrap();
        let before = run_stereo(&mut path, 8000.0, 0.05, 20);
        let mut high = handle.claim(ParamId::HighBandGain).unwrap();
        high.set_target_db(-12.0, Ramp::Exponential { tau_ms: 50.0 });
        run_stereo(&mut path, 8000.0, 0.05, 40);
        let after = run_stereo(&mut path, 8000.0, 0.05, 20);
        assert!(after < before * 0.5, "before {before} after {after}");
        assert!((handle.param_value(ParamId::HighBandGain) - 0.2512).abs() < 1e-3);
    }

    #[test]
    fn fade_ramp_is_published() {
        let (mut path, handle) = SignalPath::new(SR, 2, &Settings::default()).unwrap();
        let mut fade = handle.claim(ParamId::MakeupFade).unwrap();
        fade.ramp_from(presets::FADE_FLOOR, 1.0, Ramp::Linear { ms: 1000.0 });
        run_stereo(&mut path, 440.0, 0.1, 47);
        let mid = handle.param_value(ParamId::MakeupFade);
        assert!(mid > 0.6 && mid < 0.7, "fade {mid}");
        run_stereo(&mut path, 440.0, 0.1, 60);
        assert_eq!(handle.param_value(ParamId::MakeupFade), 1.0);
    }

    #[test]
    fn loudness_meter_reports_after_a_window() {
        let (mut path, handle) = SignalPath::new(SR, 2, &Settings::default()).unwrap();
        // 4 s
        run_stereo(&mut path, 1000.0, 0.3, 375);
        let lufs = handle.meters().get_output_lufs();
        assert!(lufs > -40.0 && lufs < 0.0, "lufs {lufs}");
    }

    #[test]
    fn failed_loudness_meter_reads_as_floor() {
        let (mut path, handle) = SignalPath::new(SR, 2, &Settings::default()).unwrap();
        run_stereo(&mut path, 1000.0, 0.3, 375);
        assert!(handle.meters().get_output_lufs() > -40.0);

        path.drop_loudness_meter(ebur128::Error::NoMem);
        run_stereo(&mut path, 1000.0, 0.3, 10);
        assert_eq!(
            handle.meters().get_output_lufs(),
            crate::meters::LOUDNESS_FLOOR_LUFS
        );
    }

    #[test]
    fn handles_share_the_graph() {
        let (path, handle) = SignalPath::new(SR, 1, &Settings::default()).unwrap();
        assert!(path.handle().same_graph(&handle));
        let (_, other) = SignalPath::new(SR, 1, &Settings::default()).unwrap();
        assert!(!other.same_graph(&handle));
    }
}
