use crate::dsp::CompressorSettings;
use serde::{Deserialize, Serialize};

// =============================================================================
// COMPRESSION PRESETS
// =============================================================================

/// How hard the main compressor squeezes the programme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrength {
    Light,
    #[default]
    Medium,
    Strong,
}

impl CompressionStrength {
    pub fn name(&self) -> &'static str {
        match self {
            CompressionStrength::Light => "light",
            CompressionStrength::Medium => "medium",
            CompressionStrength::Strong => "strong",
        }
    }

    pub fn settings(&self) -> CompressorSettings {
        match self {
            CompressionStrength::Light => CompressorSettings {
                threshold_db: -30.0,
                knee_db: 6.0,
                ratio: 3.0,
                attack_ms: 6.0,
                release_ms: 250.0,
            },
            CompressionStrength::Medium => CompressorSettings {
                threshold_db: -24.0,
                knee_db: 6.0,
                ratio: 4.0,
                attack_ms: 5.0,
                release_ms: 150.0,
            },
            CompressionStrength::Strong => CompressorSettings {
                threshold_db: -18.0,
                knee_db: 4.0,
                ratio: 6.0,
                attack_ms: 3.0,
                release_ms: 200.0,
            },
        }
    }
}

/// Brick-wall safety net behind the makeup stage.
pub const LIMITER: CompressorSettings = CompressorSettings {
    threshold_db: -1.0,
    knee_db: 0.0,
    ratio: 20.0,
    attack_ms: 2.0,
    release_ms: 50.0,
};

// =============================================================================
// EQ PRESETS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EqPreset {
    Natural,
    #[default]
    Gentle,
    UltraSoft,
}

/// Shelf frequencies (Hz) and gains (dB) for an EQ preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqValues {
    pub low_shelf_freq: f32,
    pub low_shelf_gain_db: f32,
    pub high_shelf_freq: f32,
    pub high_shelf_gain_db: f32,
}

impl EqPreset {
    pub fn name(&self) -> &'static str {
        match self {
            EqPreset::Natural => "natural",
            EqPreset::Gentle => "gentle",
            EqPreset::UltraSoft => "ultra-soft",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EqPreset::Natural => "No tonal change",
            EqPreset::Gentle => "Slightly darker, less rumble",
            EqPreset::UltraSoft => "Strong treble and bass softening for sleep",
        }
    }

    pub fn values(&self) -> EqValues {
        match self {
            EqPreset::Natural => EqValues {
                low_shelf_freq: 80.0,
                low_shelf_gain_db: 0.0,
                high_shelf_freq: 8000.0,
                high_shelf_gain_db: 0.0,
            },
            EqPreset::Gentle => EqValues {
                low_shelf_freq: 80.0,
                low_shelf_gain_db: -2.0,
                high_shelf_freq: 8000.0,
                high_shelf_gain_db: -3.0,
            },
            EqPreset::UltraSoft => EqValues {
                // Lower cutoff so sibilance is covered too
                low_shelf_freq: 100.0,
                low_shelf_gain_db: -4.0,
                high_shelf_freq: 6000.0,
                high_shelf_gain_db: -6.0,
            },
        }
    }
}

// =============================================================================
// BAND SPLIT
// =============================================================================

/// Crossover points of the three-band split (Hz).
#[derive(Debug, Clone, Copy)]
pub struct BandSplit {
    pub low_cutoff: f32,
    pub mid_low: f32,
    pub mid_high: f32,
    pub high_cutoff: f32,
}

pub const BAND_SPLIT: BandSplit = BandSplit {
    low_cutoff: 250.0,
    mid_low: 300.0,
    mid_high: 3400.0,
    high_cutoff: 3400.0,
};

// =============================================================================
// CONTROLLER CONSTANTS
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct AgcConfig {
    pub target_loudness_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub min_gain_db: f32,
    pub max_gain_db: f32,
    pub tick_rate_hz: f32,
    /// Time constant of the makeup-gain write ramp.
    pub write_tau_ms: f32,
}

pub const AGC: AgcConfig = AgcConfig {
    target_loudness_db: -18.0,
    attack_ms: 80.0,
    release_ms: 250.0,
    min_gain_db: -18.0,
    max_gain_db: 18.0,
    tick_rate_hz: 60.0,
    write_tau_ms: 50.0,
};

#[derive(Debug, Clone, Copy)]
pub struct VoiceFocusConfig {
    /// Linear mid-band level where speech presence starts.
    pub speech_threshold: f32,
    /// Linear span above threshold over which presence goes 0 -> 1.
    pub speech_range: f32,
    pub max_ducking_db: f32,
    pub default_ducking_db: f32,
    pub write_tau_ms: f32,
    pub release_ramp_ms: f32,
}

pub const VOICE_FOCUS: VoiceFocusConfig = VoiceFocusConfig {
    speech_threshold: 0.02,
    speech_range: 0.10,
    max_ducking_db: 12.0,
    default_ducking_db: 9.0,
    write_tau_ms: 50.0,
    release_ramp_ms: 100.0,
};

// =============================================================================
// SPEECH RATE
// =============================================================================

/// Target pace the speech-rate controller steers toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetSpeechRate {
    Slow,
    Normal,
    Fast,
    #[default]
    Auto,
}

impl TargetSpeechRate {
    /// Target syllables per second.
    pub fn syllables_per_second(&self) -> f32 {
        let t = &SPEECH_RATE.targets;
        match self {
            TargetSpeechRate::Slow => t.slow,
            TargetSpeechRate::Normal => t.normal,
            TargetSpeechRate::Fast => t.fast,
            TargetSpeechRate::Auto => t.auto,
        }
    }
}

/// Upper bounds (exclusive, syllables/s) of each rate category.
#[derive(Debug, Clone, Copy)]
pub struct RateStandards {
    pub very_slow: f32,
    pub slow: f32,
    pub normal: f32,
    pub fast: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RateTargets {
    pub slow: f32,
    pub normal: f32,
    pub fast: f32,
    pub auto: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct SpeechRateConfig {
    /// Static RMS floor a syllable frame must exceed.
    pub energy_threshold: f32,
    /// Voiced frames sit below this zero-crossing rate.
    pub zcr_threshold: f32,
    /// Relative factor over the recent average energy.
    pub energy_ratio: f32,
    /// Frames averaged for the relative threshold.
    pub recent_frames: usize,
    pub max_history: usize,
    pub max_intervals: usize,
    pub min_intervals: usize,
    pub min_syllable_gap_ms: f64,
    pub standards: RateStandards,
    pub targets: RateTargets,
    pub min_playback_rate: f32,
    pub max_playback_rate: f32,
    pub deadband: f32,
    pub max_step: f32,
    pub evaluation_period_ms: f64,
    pub override_grace_ms: f64,
}

pub const SPEECH_RATE: SpeechRateConfig = SpeechRateConfig {
    energy_threshold: 0.02,
    zcr_threshold: 0.1,
    energy_ratio: 1.2,
    recent_frames: 10,
    // 5 seconds at 60 fps
    max_history: 300,
    max_intervals: 20,
    min_intervals: 5,
    min_syllable_gap_ms: 100.0,
    standards: RateStandards {
        very_slow: 2.0,
        slow: 3.0,
        normal: 4.5,
        fast: 6.0,
    },
    targets: RateTargets {
        slow: 3.0,
        normal: 4.0,
        fast: 5.0,
        auto: 4.0,
    },
    min_playback_rate: 0.5,
    max_playback_rate: 1.5,
    deadband: 0.1,
    max_step: 0.05,
    evaluation_period_ms: 2000.0,
    override_grace_ms: 30_000.0,
};

// =============================================================================
// FADES
// =============================================================================

/// Makeup fade level at the quiet end of connect/disconnect fades.
pub const FADE_FLOOR: f32 = 0.3;
pub const FADE_IN_MS: f32 = 1000.0;
pub const FADE_OUT_MS: f32 = 500.0;
/// Ramp used for compression / EQ preset changes.
pub const PRESET_RAMP_MS: f32 = 30.0;
/// Crossfade when the limiter is switched on or off.
pub const LIMITER_XFADE_MS: f32 = 30.0;
