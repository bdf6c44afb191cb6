//! Real-time audio control core for sleep listening.
//!
//! A [`SleepEngine`] sits on one media element. It builds (or reuses) the
//! element's [`SignalPath`](graph::SignalPath), claims the parameters it
//! owns, and runs three closed loops on the host's frame clock:
//! automatic gain, voice-focus ducking and speech-rate steering.
//!
//! The host drives everything: it renders audio through the attached
//! path, calls [`SleepEngine::on_frame`] once per display frame and
//! forwards playback-rate change events to [`SleepEngine::on_rate_change`].

pub mod control;
pub mod debug;
pub mod dsp;
pub mod graph;
pub mod media;
pub mod meters;
pub mod presets;
pub mod scheduler;
pub mod settings;

use crate::control::{
    AutoGainController, SpeechRateController, SpeechRateDetector, SpeechRateStatus,
    VoiceFocusController,
};
use crate::dsp::CompressorSettings;
use crate::graph::{GraphError, GraphHandle, ParamId, ParamWriter, Ramp, SignalPath, TapId};
use crate::media::{GraphStore, MediaElement, PlaybackControl};
use crate::meters::MeterSnapshot;
use crate::presets::{EqValues, FADE_FLOOR, FADE_IN_MS, FADE_OUT_MS, LIMITER_XFADE_MS, PRESET_RAMP_MS};
use crate::scheduler::{Scheduler, TaskKind};
use crate::settings::{Settings, SettingsUpdate};
use serde::Serialize;
use std::fmt;

pub use crate::media::{MediaId, OfflineMedia};

/// Glide used when gains go back to unity after processing is switched off.
const RESET_RAMP: Ramp = Ramp::Exponential { tau_ms: 50.0 };

#[derive(Debug, PartialEq)]
pub enum EngineError {
    Graph(GraphError),
    /// The media element refused the processor.
    Attach(String),
    /// `destroy()` already ran; the engine cannot be reused.
    Destroyed,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Graph(e) => write!(f, "audio graph unavailable: {e}"),
            EngineError::Attach(msg) => write!(f, "could not attach processor: {msg}"),
            EngineError::Destroyed => f.write_str("engine has been destroyed"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Graph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        EngineError::Graph(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum Phase {
    /// Graph in place (if initialized) but controllers idle.
    Idle,
    Enabled,
    /// Fading down; controllers stop once the host clock passes
    /// `complete_at_ms`.
    FadingOut { complete_at_ms: f64 },
}

/// Everything the popup shows, in one read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    pub initialized: bool,
    pub enabled: bool,
    pub fading_out: bool,
    pub auto_gain_running: bool,
    pub voice_focus_running: bool,
    pub current_gain_db: f32,
    pub current_loudness_db: f32,
    pub target_loudness_db: f32,
    pub output_gain_db: f32,
    pub ducking_amount_db: f32,
    pub duck_gain: f32,
    pub speech_presence: f32,
    pub limiter_enabled: bool,
    pub meters: Option<MeterSnapshot>,
    pub speech_rate: Option<SpeechRateStatus>,
}

/// Writers for the preset-driven stages (shelving EQ and compressor).
struct PresetWriters {
    low_shelf_freq: ParamWriter,
    low_shelf_gain: ParamWriter,
    high_shelf_freq: ParamWriter,
    high_shelf_gain: ParamWriter,
    threshold: ParamWriter,
    knee: ParamWriter,
    ratio: ParamWriter,
    attack: ParamWriter,
    release: ParamWriter,
}

impl PresetWriters {
    fn claim(graph: &GraphHandle) -> Result<Self, GraphError> {
        Ok(Self {
            low_shelf_freq: graph.claim(ParamId::LowShelfFreq)?,
            low_shelf_gain: graph.claim(ParamId::LowShelfGain)?,
            high_shelf_freq: graph.claim(ParamId::HighShelfFreq)?,
            high_shelf_gain: graph.claim(ParamId::HighShelfGain)?,
            threshold: graph.claim(ParamId::CompThreshold)?,
            knee: graph.claim(ParamId::CompKnee)?,
            ratio: graph.claim(ParamId::CompRatio)?,
            attack: graph.claim(ParamId::CompAttack)?,
            release: graph.claim(ParamId::CompRelease)?,
        })
    }

    fn apply_eq(&mut self, eq: EqValues, ramp: Ramp) {
        self.low_shelf_freq.set_target(eq.low_shelf_freq, ramp);
        self.low_shelf_gain.set_target(eq.low_shelf_gain_db, ramp);
        self.high_shelf_freq.set_target(eq.high_shelf_freq, ramp);
        self.high_shelf_gain.set_target(eq.high_shelf_gain_db, ramp);
    }

    fn apply_compression(&mut self, c: CompressorSettings, ramp: Ramp) {
        self.threshold.set_target(c.threshold_db, ramp);
        self.knee.set_target(c.knee_db, ramp);
        self.ratio.set_target(c.ratio, ramp);
        self.attack.set_target(c.attack_ms, ramp);
        self.release.set_target(c.release_ms, ramp);
    }
}

/// Controllers and writers bound to one graph.
struct Core {
    graph: GraphHandle,
    fade: ParamWriter,
    limiter: ParamWriter,
    presets: PresetWriters,
    agc: AutoGainController,
    voice_focus: VoiceFocusController,
    detector: SpeechRateDetector,
    rate: SpeechRateController,
}

impl Core {
    fn new(graph: GraphHandle, settings: &Settings) -> Result<Self, GraphError> {
        Ok(Self {
            fade: graph.claim(ParamId::MakeupFade)?,
            limiter: graph.claim(ParamId::LimiterMix)?,
            presets: PresetWriters::claim(&graph)?,
            agc: AutoGainController::new(&graph)?,
            voice_focus: VoiceFocusController::new(&graph, settings.ducking_amount)?,
            detector: SpeechRateDetector::new(graph.tap(TapId::Mid)),
            rate: SpeechRateController::new(),
            graph,
        })
    }

    fn limiter_mix(enabled: bool) -> f32 {
        if enabled {
            1.0
        } else {
            0.0
        }
    }

    /// Bring every owned parameter in line with `settings` at once. A
    /// reused graph may still carry another engine's values.
    fn apply_all<P: PlaybackControl + ?Sized>(&mut self, settings: &Settings, media: &mut P) {
        self.presets.apply_eq(settings.eq_preset.values(), Ramp::Instant);
        self.presets
            .apply_compression(settings.compression_strength.settings(), Ramp::Instant);
        self.limiter
            .set_target(Self::limiter_mix(settings.limiter_enabled), Ramp::Instant);
        self.fade.set_target(1.0, Ramp::Instant);
        self.voice_focus.reset(Ramp::Instant);
        self.agc.set_target_loudness(settings.target_loudness);
        self.agc.set_output_gain(settings.output_gain);
        self.voice_focus.set_ducking_amount(settings.ducking_amount);
        self.rate
            .set_target_rate(settings.target_speech_rate, &self.detector, media, 0.0);
    }

    fn start_enabled<P: PlaybackControl + ?Sized>(
        &mut self,
        settings: &Settings,
        scheduler: &mut Scheduler,
        media: &P,
        now_ms: f64,
    ) {
        if settings.auto_gain_enabled {
            self.agc.start(scheduler, now_ms);
        }
        if settings.voice_focus_enabled {
            self.voice_focus.start(scheduler, now_ms);
        }
        if settings.speech_rate_enabled {
            self.detector.start(scheduler, now_ms);
            self.rate
                .enable(settings.target_speech_rate, media, scheduler, now_ms);
        }
    }

    fn stop_all<P: PlaybackControl + ?Sized>(&mut self, scheduler: &mut Scheduler, media: &mut P) {
        self.agc.stop(scheduler);
        self.voice_focus.stop(scheduler);
        self.rate.disable(media, scheduler);
        self.detector.stop(scheduler);
    }

    /// Hand each changed field to its single owner.
    fn route<P: PlaybackControl + ?Sized>(
        &mut self,
        update: &SettingsUpdate,
        settings: &Settings,
        enabled: bool,
        scheduler: &mut Scheduler,
        media: &mut P,
        now_ms: f64,
    ) {
        let preset_ramp = Ramp::Linear {
            ms: PRESET_RAMP_MS,
        };
        if update.compression_strength.is_some() {
            self.presets
                .apply_compression(settings.compression_strength.settings(), preset_ramp);
        }
        if update.eq_preset.is_some() {
            self.presets.apply_eq(settings.eq_preset.values(), preset_ramp);
        }
        if update.limiter_enabled.is_some() {
            self.limiter.set_target(
                Self::limiter_mix(settings.limiter_enabled),
                Ramp::Linear {
                    ms: LIMITER_XFADE_MS,
                },
            );
        }
        if update.target_loudness.is_some() {
            self.agc.set_target_loudness(settings.target_loudness);
        }
        if update.output_gain.is_some() {
            self.agc.set_output_gain(settings.output_gain);
        }
        if update.ducking_amount.is_some() {
            self.voice_focus.set_ducking_amount(settings.ducking_amount);
        }

        if enabled {
            if update.auto_gain_enabled.is_some() {
                if settings.auto_gain_enabled {
                    self.agc.start(scheduler, now_ms);
                } else {
                    self.agc.stop(scheduler);
                    self.agc.release_gain();
                }
            }
            if update.voice_focus_enabled.is_some() {
                if settings.voice_focus_enabled {
                    self.voice_focus.start(scheduler, now_ms);
                } else {
                    self.voice_focus.stop(scheduler);
                }
            }
            if update.speech_rate_enabled.is_some() {
                if settings.speech_rate_enabled {
                    self.detector.start(scheduler, now_ms);
                    self.rate
                        .enable(settings.target_speech_rate, media, scheduler, now_ms);
                } else {
                    self.rate.disable(media, scheduler);
                    self.detector.stop(scheduler);
                }
            }
        }

        if update.target_speech_rate.is_some() {
            self.rate
                .set_target_rate(settings.target_speech_rate, &self.detector, media, now_ms);
        }
    }
}

/// Audio processing for one media element.
pub struct SleepEngine<M: MediaElement> {
    media: M,
    store: GraphStore,
    settings: Settings,
    scheduler: Scheduler,
    core: Option<Core>,
    phase: Phase,
    destroyed: bool,
}

impl<M: MediaElement> SleepEngine<M> {
    pub fn new(media: M, store: GraphStore, settings: Settings) -> Self {
        Self {
            media,
            store,
            settings,
            scheduler: Scheduler::new(),
            core: None,
            phase: Phase::Idle,
            destroyed: false,
        }
    }

    /// Build or reuse the element's graph and bind the controllers to it.
    /// Nothing is retried on failure; playback simply stays unprocessed.
    pub fn init(&mut self) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        if self.core.is_some() {
            return Ok(());
        }

        let id = self.media.id();
        let graph = match self.store.get(id) {
            Some(graph) => {
                log::debug!("{id}: reusing existing audio graph");
                graph
            }
            None => {
                let (path, graph) = SignalPath::new(
                    self.media.sample_rate(),
                    self.media.channels(),
                    &self.settings,
                )
                .map_err(|e| {
                    log::warn!("{id}: could not build audio graph: {e}");
                    e
                })?;
                self.media
                    .attach(path)
                    .map_err(|e| EngineError::Attach(format!("{e:#}")))?;
                self.store.insert(id, graph.clone());
                log::info!(
                    "{id}: audio graph built ({} Hz, {} ch)",
                    graph.sample_rate(),
                    graph.channels()
                );
                graph
            }
        };

        let mut core = Core::new(graph, &self.settings)?;
        core.apply_all(&self.settings, &mut self.media);
        self.core = Some(core);
        Ok(())
    }

    /// Switch processing on with a fade-in.
    pub fn connect(&mut self, now_ms: f64) -> Result<(), EngineError> {
        self.init()?;
        if self.phase == Phase::Enabled {
            return Ok(());
        }
        let core = self.core.as_mut().ok_or(EngineError::Destroyed)?;

        let fade_in = Ramp::Linear { ms: FADE_IN_MS };
        if matches!(self.phase, Phase::FadingOut { .. }) {
            core.fade.set_target(1.0, fade_in);
        } else {
            core.fade.ramp_from(FADE_FLOOR, 1.0, fade_in);
        }
        core.start_enabled(&self.settings, &mut self.scheduler, &self.media, now_ms);
        self.phase = Phase::Enabled;
        log::info!("{}: processing enabled", self.media.id());
        Ok(())
    }

    /// Fade down; controllers stop when the fade completes.
    pub fn disconnect(&mut self, now_ms: f64) {
        if self.phase != Phase::Enabled {
            return;
        }
        let Some(core) = self.core.as_mut() else {
            return;
        };
        core.fade
            .set_target(FADE_FLOOR, Ramp::Linear { ms: FADE_OUT_MS });
        self.phase = Phase::FadingOut {
            complete_at_ms: now_ms + FADE_OUT_MS as f64,
        };
        log::info!("{}: processing fading out", self.media.id());
    }

    fn finish_disconnect(&mut self) {
        self.phase = Phase::Idle;
        let Some(core) = self.core.as_mut() else {
            return;
        };
        core.stop_all(&mut self.scheduler, &mut self.media);
        core.agc.reset(RESET_RAMP);
        core.fade.set_target(1.0, RESET_RAMP);
        log::info!("{}: processing disabled", self.media.id());
    }

    /// Merge a partial settings snapshot and route it to the owners.
    pub fn update_settings(&mut self, update: &SettingsUpdate, now_ms: f64) {
        self.settings.apply(update);
        let enabled = self.phase == Phase::Enabled;
        let Some(core) = self.core.as_mut() else {
            return;
        };
        core.route(
            update,
            &self.settings,
            enabled,
            &mut self.scheduler,
            &mut self.media,
            now_ms,
        );
        log::debug!("settings updated: {update:?}");
    }

    /// Stop everything now, unroute the processor and forget the graph.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Some(mut core) = self.core.take() {
            core.stop_all(&mut self.scheduler, &mut self.media);
        }
        self.phase = Phase::Idle;
        let id = self.media.id();
        drop(self.media.detach());
        self.store.remove(id);
        log::info!("{id}: audio engine destroyed");
    }

    /// Run whatever is due on this frame.
    pub fn on_frame(&mut self, now_ms: f64) {
        if let Phase::FadingOut { complete_at_ms } = self.phase {
            if now_ms >= complete_at_ms {
                self.finish_disconnect();
            }
        }
        let Some(core) = self.core.as_mut() else {
            return;
        };
        for kind in self.scheduler.due(now_ms) {
            match kind {
                TaskKind::AutoGain => core.agc.tick(),
                TaskKind::VoiceFocus => core.voice_focus.tick(),
                TaskKind::SpeechDetect => core.detector.tick(now_ms),
                TaskKind::SpeechRate => core.rate.evaluate(&core.detector, &mut self.media, now_ms),
            }
        }
    }

    /// Host notification for every playback-rate change event.
    pub fn on_rate_change(&mut self, now_ms: f64) {
        if let Some(core) = self.core.as_mut() {
            core.rate.on_rate_change(&self.media, now_ms);
        }
    }

    pub fn set_speech_rate_paused(&mut self, paused: bool) {
        if let Some(core) = self.core.as_mut() {
            core.rate.set_paused(paused);
        }
    }

    pub fn state(&self) -> EngineState {
        let core = self.core.as_ref();
        EngineState {
            initialized: core.is_some(),
            enabled: self.phase == Phase::Enabled,
            fading_out: matches!(self.phase, Phase::FadingOut { .. }),
            auto_gain_running: core.is_some_and(|c| c.agc.is_running()),
            voice_focus_running: core.is_some_and(|c| c.voice_focus.is_running()),
            current_gain_db: core.map_or(0.0, |c| c.agc.current_gain_db()),
            current_loudness_db: core.map_or(
                control::auto_gain::INITIAL_MEASURED_DB,
                |c| c.agc.last_measured_db(),
            ),
            target_loudness_db: self.settings.target_loudness,
            output_gain_db: self.settings.output_gain,
            ducking_amount_db: self.settings.ducking_amount,
            duck_gain: core.map_or(1.0, |c| c.voice_focus.duck_gain()),
            speech_presence: core.map_or(0.0, |c| c.voice_focus.speech_presence()),
            limiter_enabled: self.settings.limiter_enabled,
            meters: core.map(|c| c.graph.meters().snapshot()),
            speech_rate: core.map(|c| c.rate.status(&c.detector, &self.media)),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn graph(&self) -> Option<&GraphHandle> {
        self.core.as_ref().map(|c| &c.graph)
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl<M: MediaElement> Drop for SleepEngine<M> {
    /// An engine dropped without `destroy` leaves its graph attached for the
    /// next engine, so hand it back at rest and restore the playback rate.
    fn drop(&mut self) {
        if let Some(core) = self.core.as_mut() {
            core.stop_all(&mut self.scheduler, &mut self.media);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::BorrowMut;
    use std::f32::consts::TAU;

    const SR: f32 = 48000.0;
    /// One 60 fps frame of audio.
    const FRAME: usize = 800;
    const FRAME_MS: f64 = 1000.0 / 60.0;

    fn engine(settings: Settings) -> SleepEngine<OfflineMedia> {
        SleepEngine::new(
            OfflineMedia::new(MediaId(1), SR, 2),
            GraphStore::new(),
            settings,
        )
    }

    /// Render `frames` display frames of a sine and tick the engine after
    /// each one. Returns the host clock after the last frame.
    fn run<M>(engine: &mut SleepEngine<M>, start_ms: f64, frames: usize, amp: f32) -> f64
    where
        M: MediaElement + BorrowMut<OfflineMedia>,
    {
        let mut l = vec![0.0; FRAME];
        let mut r = vec![0.0; FRAME];
        let mut now = start_ms;
        for f in 0..frames {
            for (i, s) in l.iter_mut().enumerate() {
                let n = (f * FRAME + i) as f32;
                *s = amp * (TAU * 440.0 * n / SR).sin();
            }
            r.copy_from_slice(&l);
            BorrowMut::<OfflineMedia>::borrow_mut(engine.media_mut())
                .process(&mut [&mut l[..], &mut r[..]]);
            now += FRAME_MS;
            engine.on_frame(now);
        }
        now
    }

    fn param<M: MediaElement>(engine: &SleepEngine<M>, id: ParamId) -> f32 {
        engine.graph().map(|g| g.param_value(id)).unwrap_or(f32::NAN)
    }

    #[test]
    fn init_is_idempotent_and_attaches_once() {
        let mut e = engine(Settings::default());
        e.init().unwrap();
        e.init().unwrap();
        assert!(e.media().is_attached());
        assert!(e.store.contains(MediaId(1)));
        assert_eq!(e.store.len(), 1);
        assert!(e.state().initialized);
        assert!(!e.state().enabled);
    }

    #[test]
    fn unsupported_layout_fails_init_and_leaves_audio_alone() {
        let mut e = SleepEngine::new(
            OfflineMedia::new(MediaId(3), SR, 6),
            GraphStore::new(),
            Settings::default(),
        );
        assert_eq!(
            e.init(),
            Err(EngineError::Graph(GraphError::UnsupportedChannelCount(6)))
        );
        assert!(!e.media().is_attached());
        assert!(e.connect(0.0).is_err());
        e.on_frame(16.0);
        assert!(!e.state().initialized);
    }

    #[test]
    fn graph_is_reused_across_engines() {
        let store = GraphStore::new();
        let mut media = OfflineMedia::new(MediaId(9), SR, 2);
        {
            let mut a = SleepEngine::new(&mut media, store.clone(), Settings::default());
            a.connect(0.0).unwrap();
        }
        let first = store.get(MediaId(9)).unwrap();
        {
            let settings = Settings {
                eq_preset: presets::EqPreset::UltraSoft,
                ..Settings::default()
            };
            let mut b = SleepEngine::new(&mut media, store.clone(), settings);
            b.init().unwrap();
            assert!(b.graph().unwrap().same_graph(&first));
            b.destroy();
        }
        assert!(store.is_empty());
        assert!(!media.is_attached());
    }

    #[test]
    fn dropped_engine_leaves_no_ducking_behind() {
        let store = GraphStore::new();
        let mut media = OfflineMedia::new(MediaId(11), SR, 2);
        media.set_playback_rate(1.25);
        {
            let settings = Settings {
                speech_rate_enabled: true,
                ..Settings::default()
            };
            let mut a = SleepEngine::new(&mut media, store.clone(), settings);
            a.connect(0.0).unwrap();
            run(&mut a, 0.0, 200, 0.5);
            assert!(param(&a, ParamId::LowBandGain) < 0.5);
        }
        assert_eq!(media.playback_rate(), 1.25);

        let settings = Settings {
            voice_focus_enabled: false,
            ..Settings::default()
        };
        let mut b = SleepEngine::new(&mut media, store.clone(), settings);
        b.connect(0.0).unwrap();
        run(&mut b, 0.0, 120, 0.0);
        let low = param(&b, ParamId::LowBandGain);
        let high = param(&b, ParamId::HighBandGain);
        assert!((low - 1.0).abs() < 1e-4, "low band {low}");
        assert!((high - 1.0).abs() < 1e-4, "high band {high}");
        assert_eq!(param(&b, ParamId::MakeupFade), 1.0);
    }

    #[test]
    fn connect_fades_in_over_a_second() {
        let mut e = engine(Settings::default());
        e.connect(0.0).unwrap();
        e.connect(0.0).unwrap();
        assert_eq!(e.phase(), Phase::Enabled);

        let now = run(&mut e, 0.0, 30, 0.1);
        let fade = param(&e, ParamId::MakeupFade);
        assert!((fade - 0.65).abs() < 0.02, "fade {fade}");

        run(&mut e, now, 32, 0.1);
        assert_eq!(param(&e, ParamId::MakeupFade), 1.0);
        assert!(e.state().auto_gain_running);
        assert!(e.state().voice_focus_running);
    }

    #[test]
    fn disconnect_stops_after_fade_out() {
        let mut e = engine(Settings::default());
        e.connect(0.0).unwrap();
        let now = run(&mut e, 0.0, 90, 0.05);
        assert!(e.state().current_gain_db > 0.0);

        e.disconnect(now);
        e.disconnect(now);
        assert!(e.state().fading_out);
        let now = run(&mut e, now, 29, 0.05);
        assert!(e.state().auto_gain_running);
        let fade = param(&e, ParamId::MakeupFade);
        assert!(fade < 0.4, "fade {fade}");

        let now = run(&mut e, now, 2, 0.05);
        assert_eq!(e.phase(), Phase::Idle);
        assert!(!e.state().auto_gain_running);
        assert!(!e.state().voice_focus_running);
        assert!(e.scheduler.is_empty());

        run(&mut e, now, 30, 0.05);
        for id in [
            ParamId::MakeupGain,
            ParamId::MakeupFade,
            ParamId::LowBandGain,
            ParamId::HighBandGain,
        ] {
            assert!((param(&e, id) - 1.0).abs() < 1e-3, "{id} = {}", param(&e, id));
        }
    }

    #[test]
    fn reconnect_during_fade_out_fades_back_up() {
        let mut e = engine(Settings::default());
        e.connect(0.0).unwrap();
        let now = run(&mut e, 0.0, 70, 0.1);
        e.disconnect(now);
        let now = run(&mut e, now, 15, 0.1);
        let low = param(&e, ParamId::MakeupFade);
        e.connect(now).unwrap();
        assert_eq!(e.phase(), Phase::Enabled);
        run(&mut e, now, 2, 0.1);
        let after = param(&e, ParamId::MakeupFade);
        assert!(after > low, "{low} -> {after}");
        assert!(e.state().auto_gain_running);
    }

    #[test]
    fn quiet_programme_is_lifted() {
        let mut e = engine(Settings::default());
        e.connect(0.0).unwrap();
        run(&mut e, 0.0, 120, 0.01);
        let state = e.state();
        // 0.01 peak sine reads about -43 dB; the error clamps at +18
        assert!(state.current_loudness_db < -35.0);
        assert!((state.current_gain_db - 18.0).abs() < 0.5);
        assert!(param(&e, ParamId::MakeupGain) > 5.0);
    }

    #[test]
    fn settings_reach_their_owners() {
        let mut e = engine(Settings::default());
        e.connect(0.0).unwrap();
        let update = SettingsUpdate::from_json(
            r#"{"eqPreset":"ultra-soft","limiterEnabled":false,"compressionStrength":"strong","duckingAmount":4}"#,
        )
        .unwrap();
        e.update_settings(&update, 0.0);
        run(&mut e, 0.0, 6, 0.1);

        assert_eq!(param(&e, ParamId::LowShelfGain), -4.0);
        assert_eq!(param(&e, ParamId::HighShelfFreq), 6000.0);
        assert_eq!(param(&e, ParamId::CompRatio), 6.0);
        assert_eq!(param(&e, ParamId::LimiterMix), 0.0);
        assert_eq!(e.state().ducking_amount_db, 4.0);
        assert!(!e.state().limiter_enabled);
    }

    #[test]
    fn toggling_controllers_while_enabled() {
        let mut e = engine(Settings::default());
        e.connect(0.0).unwrap();
        let now = run(&mut e, 0.0, 10, 0.1);

        e.update_settings(
            &SettingsUpdate {
                auto_gain_enabled: Some(false),
                voice_focus_enabled: Some(false),
                ..SettingsUpdate::default()
            },
            now,
        );
        let state = e.state();
        assert!(!state.auto_gain_running);
        assert!(!state.voice_focus_running);
        assert_eq!(state.current_gain_db, 0.0);

        e.update_settings(
            &SettingsUpdate {
                speech_rate_enabled: Some(true),
                ..SettingsUpdate::default()
            },
            now,
        );
        assert!(e.state().speech_rate.is_some_and(|s| s.enabled));
        assert_eq!(e.scheduler.len(), 2);

        e.media_mut().set_playback_rate(1.5);
        e.on_rate_change(now + 100.0);
        assert!(e.state().speech_rate.is_some_and(|s| s.user_override));

        e.update_settings(
            &SettingsUpdate {
                speech_rate_enabled: Some(false),
                ..SettingsUpdate::default()
            },
            now + 200.0,
        );
        assert_eq!(e.media().playback_rate(), 1.5);
        assert!(e.scheduler.is_empty());
    }

    #[test]
    fn disabled_controllers_stay_off_on_connect() {
        let settings = Settings {
            auto_gain_enabled: false,
            voice_focus_enabled: false,
            ..Settings::default()
        };
        let mut e = engine(settings);
        e.connect(0.0).unwrap();
        assert!(e.scheduler.is_empty());
        run(&mut e, 0.0, 10, 0.1);
        assert_eq!(param(&e, ParamId::LowBandGain), 1.0);
    }

    #[test]
    fn destroy_is_idempotent_and_final() {
        let mut e = engine(Settings::default());
        e.connect(0.0).unwrap();
        e.destroy();
        e.destroy();
        assert!(e.is_destroyed());
        assert!(!e.media().is_attached());
        assert!(e.store.is_empty());
        assert!(e.scheduler.is_empty());
        assert_eq!(e.init(), Err(EngineError::Destroyed));
        assert!(!e.state().initialized);
    }

    #[test]
    fn pause_is_reported() {
        let mut e = engine(Settings {
            speech_rate_enabled: true,
            ..Settings::default()
        });
        e.connect(0.0).unwrap();
        e.set_speech_rate_paused(true);
        assert!(e.state().speech_rate.is_some_and(|s| s.paused));
    }

    #[test]
    fn state_serializes_for_the_popup() {
        let mut e = engine(Settings::default());
        e.connect(0.0).unwrap();
        run(&mut e, 0.0, 5, 0.1);
        let json = serde_json::to_value(e.state()).unwrap();
        assert_eq!(json["enabled"], true);
        assert!(json["currentGainDb"].is_number());
        assert!(json["meters"]["outputLufs"].is_number());
        assert_eq!(json["speechRate"]["detected"]["category"], "unknown");
        assert_eq!(json["speechRate"]["target"], "auto");
    }
}
