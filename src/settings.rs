//! Configuration snapshot handed to the engine by the settings layer.
//!
//! The engine never reaches for ambient state. It is given a full
//! [`Settings`] at construction and partial [`SettingsUpdate`]s afterwards,
//! and copies each field into the one controller or graph stage that owns it.

use crate::presets::{CompressionStrength, EqPreset, TargetSpeechRate, VOICE_FOCUS};
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Manual output gain range (dB).
pub const OUTPUT_GAIN_RANGE: (f32, f32) = (-12.0, 12.0);
/// Target loudness range (dBFS).
pub const TARGET_LOUDNESS_RANGE: (f32, f32) = (-40.0, -6.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub compression_strength: CompressionStrength,
    pub target_loudness: f32,
    pub output_gain: f32,
    pub eq_preset: EqPreset,
    pub voice_focus_enabled: bool,
    pub ducking_amount: f32,
    pub auto_gain_enabled: bool,
    pub limiter_enabled: bool,
    pub speech_rate_enabled: bool,
    pub target_speech_rate: TargetSpeechRate,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compression_strength: CompressionStrength::Medium,
            target_loudness: -18.0,
            output_gain: 0.0,
            eq_preset: EqPreset::Gentle,
            voice_focus_enabled: true,
            ducking_amount: VOICE_FOCUS.default_ducking_db,
            auto_gain_enabled: true,
            limiter_enabled: true,
            speech_rate_enabled: false,
            target_speech_rate: TargetSpeechRate::Auto,
        }
    }
}

impl Settings {
    /// Merge a partial update. Numeric fields are clamped to their ranges.
    pub fn apply(&mut self, update: &SettingsUpdate) {
        if let Some(v) = update.compression_strength {
            self.compression_strength = v;
        }
        if let Some(v) = update.target_loudness {
            self.target_loudness = clamp_finite(v, TARGET_LOUDNESS_RANGE, self.target_loudness);
        }
        if let Some(v) = update.output_gain {
            self.output_gain = clamp_finite(v, OUTPUT_GAIN_RANGE, self.output_gain);
        }
        if let Some(v) = update.eq_preset {
            self.eq_preset = v;
        }
        if let Some(v) = update.voice_focus_enabled {
            self.voice_focus_enabled = v;
        }
        if let Some(v) = update.ducking_amount {
            self.ducking_amount =
                clamp_finite(v, (0.0, VOICE_FOCUS.max_ducking_db), self.ducking_amount);
        }
        if let Some(v) = update.auto_gain_enabled {
            self.auto_gain_enabled = v;
        }
        if let Some(v) = update.limiter_enabled {
            self.limiter_enabled = v;
        }
        if let Some(v) = update.speech_rate_enabled {
            self.speech_rate_enabled = v;
        }
        if let Some(v) = update.target_speech_rate {
            self.target_speech_rate = v;
        }
    }
}

fn clamp_finite(v: f32, (lo, hi): (f32, f32), fallback: f32) -> f32 {
    if v.is_finite() {
        v.clamp(lo, hi)
    } else {
        fallback
    }
}

/// Partial configuration. Absent fields leave the current value alone.
///
/// Unknown keys (UI preferences, onboarding flags) are ignored so the whole
/// stored extension config can be passed through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_strength: Option<CompressionStrength>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_loudness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_gain: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eq_preset: Option<EqPreset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_focus_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ducking_amount: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_gain_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limiter_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_rate_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_speech_rate: Option<TargetSpeechRate>,
}

impl SettingsUpdate {
    /// Parse the JSON payload of a settings-changed message.
    pub fn from_json(payload: &str) -> anyhow::Result<Self> {
        serde_json::from_str(payload).context("malformed settings update")
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_extension_defaults() {
        let s = Settings::default();
        assert_eq!(s.compression_strength, CompressionStrength::Medium);
        assert_eq!(s.eq_preset, EqPreset::Gentle);
        assert_eq!(s.target_loudness, -18.0);
        assert_eq!(s.ducking_amount, 9.0);
        assert!(s.auto_gain_enabled && s.voice_focus_enabled && s.limiter_enabled);
        assert!(!s.speech_rate_enabled);
    }

    #[test]
    fn partial_json_only_touches_named_fields() {
        let update = SettingsUpdate::from_json(
            r#"{"eqPreset":"ultra-soft","duckingAmount":6,"showOnboarding":false}"#,
        )
        .unwrap();
        let mut s = Settings::default();
        s.apply(&update);
        assert_eq!(s.eq_preset, EqPreset::UltraSoft);
        assert_eq!(s.ducking_amount, 6.0);
        assert_eq!(s.compression_strength, CompressionStrength::Medium);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut s = Settings::default();
        s.apply(&SettingsUpdate {
            ducking_amount: Some(40.0),
            output_gain: Some(f32::NAN),
            ..Default::default()
        });
        assert_eq!(s.ducking_amount, 12.0);
        assert_eq!(s.output_gain, 0.0);
    }

    #[test]
    fn bad_payload_is_an_error() {
        assert!(SettingsUpdate::from_json(r#"{"eqPreset":"loud"}"#).is_err());
        assert!(SettingsUpdate::from_json("{}").unwrap().is_empty());
    }
}
