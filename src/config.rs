//! Render configuration with TOML persistence.
//!
//! Supports loading from file and sensible defaults. Every range is
//! checked by [`RenderConfig::validate`] before any asset is decoded.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level render configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RenderConfig {
    /// Target output format
    pub audio: AudioFormatConfig,

    /// Intro music
    pub intro: IntroConfig,

    /// Outro music
    pub outro: OutroConfig,

    /// Section chime
    pub chime: ChimeConfig,

    /// Background ducking under narration
    pub ducking: DuckingConfig,

    /// Summing and normalization
    pub mixer: MixerConfig,

    /// Deliverable encoding
    pub export: ExportConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Fixed sample rate and channel count every buffer is conformed to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormatConfig {
    /// Sample rate in Hz (8000-192000)
    pub sample_rate: u32,

    /// Channel count (1 or 2)
    pub channels: u16,
}

/// Intro music configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntroConfig {
    /// Music file; no intro when unset
    pub path: Option<PathBuf>,

    /// Drop the intro with a warning instead of failing when it cannot load
    pub optional: bool,

    /// Seconds of solo music before narration starts
    pub lead_in_secs: f64,

    /// Volume (0.0-1.0)
    pub volume: f32,

    /// Loop the music when it is shorter than the narration
    pub loop_music: bool,

    /// Keep playing under the narration after the lead-in
    pub underlay: bool,

    /// Fade applied at the end of the intro
    pub fade_out_ms: u32,
}

/// Outro music configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutroConfig {
    pub path: Option<PathBuf>,

    pub optional: bool,

    /// Length the outro is trimmed to (> 0)
    pub duration_secs: f64,

    /// Volume (0.0-1.0)
    pub volume: f32,

    pub fade_in_ms: u32,

    pub fade_out_ms: u32,

    /// Requested start relative to narration end (<= 0). Negative values
    /// would overlap narration and get shifted to the narration end.
    pub start_offset_secs: f64,
}

/// Section chime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChimeConfig {
    pub path: Option<PathBuf>,

    pub optional: bool,

    /// Volume (0.0-1.0)
    pub volume: f32,
}

/// Ducking configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckingConfig {
    pub enabled: bool,

    /// Gain applied to background music while narration plays (0.0 exclusive - 1.0)
    pub ducked_level: f32,

    /// Ramp from full level down to `ducked_level`
    pub attack_ms: u32,

    /// Ramp from `ducked_level` back to full level
    pub release_ms: u32,

    /// Narration gaps shorter than this stay ducked
    pub merge_gap_ms: u32,
}

/// How a configured volume maps to a linear gain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeScale {
    /// gain = volume
    Linear,
    /// gain = -20 dB * (1 - volume)
    Decibel,
}

/// Mixer configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Maximum absolute sample value of the final mix (0.0 exclusive - 1.0)
    pub peak_ceiling: f32,

    /// Also scale quiet mixes up to the ceiling
    pub normalize_up: bool,

    pub volume_scale: VolumeScale,
}

/// Export configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// PCM bit depth (16 or 24)
    pub bits_per_sample: u16,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,

    /// Histogram precision (significant value digits)
    pub histogram_precision: u8,

    /// Maximum histogram value in milliseconds
    pub histogram_max_ms: u64,
}

impl Default for AudioFormatConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
        }
    }
}

impl Default for IntroConfig {
    fn default() -> Self {
        Self {
            path: None,
            optional: true,
            lead_in_secs: 2.0,
            volume: 0.5,
            loop_music: false,
            underlay: true,
            fade_out_ms: 1000,
        }
    }
}

impl Default for OutroConfig {
    fn default() -> Self {
        Self {
            path: None,
            optional: true,
            duration_secs: 5.0,
            volume: 0.7,
            fade_in_ms: 500,
            fade_out_ms: 1500,
            start_offset_secs: 0.0,
        }
    }
}

impl Default for ChimeConfig {
    fn default() -> Self {
        Self {
            path: None,
            optional: true,
            volume: 0.6,
        }
    }
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ducked_level: 0.25,
            attack_ms: 200,
            release_ms: 400,
            merge_gap_ms: 500,
        }
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            peak_ceiling: 0.98,
            normalize_up: false,
            volume_scale: VolumeScale::Linear,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            bits_per_sample: 16,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            histogram_precision: 2,
            histogram_max_ms: 600_000,
        }
    }
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::ValidationFailed { reason }
}

fn check_volume(section: &str, volume: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&volume) {
        return Err(invalid(format!(
            "{section} volume {volume} out of range 0.0-1.0"
        )));
    }
    Ok(())
}

impl RenderConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::LoadFailed {
            path: Box::new(path.to_path_buf()),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::InvalidFormat {
            path: Box::new(path.to_path_buf()),
            source,
        })
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::SaveFailed {
                path: Box::new(path.to_path_buf()),
                source,
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|source| ConfigError::SerializationFailed { source })?;

        std::fs::write(path, contents).map_err(|source| ConfigError::SaveFailed {
            path: Box::new(path.to_path_buf()),
            source,
        })
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("episode-mixer")
            .join("config.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8000..=192_000).contains(&self.audio.sample_rate) {
            return Err(invalid(format!(
                "Sample rate {} Hz out of range 8000-192000",
                self.audio.sample_rate
            )));
        }

        if self.audio.channels != 1 && self.audio.channels != 2 {
            return Err(invalid(format!(
                "Channel count {} must be 1 or 2",
                self.audio.channels
            )));
        }

        // Intro
        if !self.intro.lead_in_secs.is_finite() || self.intro.lead_in_secs < 0.0 {
            return Err(invalid(format!(
                "Intro lead-in {}s must be >= 0",
                self.intro.lead_in_secs
            )));
        }
        check_volume("Intro", self.intro.volume)?;

        // Outro
        if !self.outro.duration_secs.is_finite() || self.outro.duration_secs <= 0.0 {
            return Err(invalid(format!(
                "Outro duration {}s must be > 0",
                self.outro.duration_secs
            )));
        }
        check_volume("Outro", self.outro.volume)?;
        if !self.outro.start_offset_secs.is_finite() || self.outro.start_offset_secs > 0.0 {
            return Err(invalid(format!(
                "Outro start offset {}s must be <= 0 (a gap after narration would be silent)",
                self.outro.start_offset_secs
            )));
        }

        check_volume("Chime", self.chime.volume)?;

        // Ducking
        if !(self.ducking.ducked_level > 0.0 && self.ducking.ducked_level <= 1.0) {
            return Err(invalid(format!(
                "Ducked level {} out of range (0.0, 1.0]",
                self.ducking.ducked_level
            )));
        }

        // Mixer
        if !(self.mixer.peak_ceiling > 0.0 && self.mixer.peak_ceiling <= 1.0) {
            return Err(invalid(format!(
                "Peak ceiling {} out of range (0.0, 1.0]",
                self.mixer.peak_ceiling
            )));
        }

        if self.export.bits_per_sample != 16 && self.export.bits_per_sample != 24 {
            return Err(invalid(format!(
                "Bit depth {} must be 16 or 24",
                self.export.bits_per_sample
            )));
        }

        let outro_fades_ms = u64::from(self.outro.fade_in_ms) + u64::from(self.outro.fade_out_ms);
        if outro_fades_ms as f64 > self.outro.duration_secs * 1000.0 {
            tracing::warn!(
                fade_in_ms = self.outro.fade_in_ms,
                fade_out_ms = self.outro.fade_out_ms,
                duration_secs = self.outro.duration_secs,
                "Outro fades overlap; the outro will never reach full volume"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = RenderConfig::default();
        config.validate().expect("Default config should be valid");
    }

    #[test]
    fn test_config_serialization() {
        let mut config = RenderConfig::default();
        config.intro.path = Some(PathBuf::from("music/intro.mp3"));
        config.mixer.volume_scale = VolumeScale::Decibel;

        let toml_str = toml::to_string(&config).expect("Should serialize");
        assert!(toml_str.contains("volume_scale = \"decibel\""));

        let deserialized: RenderConfig = toml::from_str(&toml_str).expect("Should deserialize");
        assert_eq!(deserialized.intro, config.intro);
        assert_eq!(deserialized.mixer, config.mixer);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RenderConfig = toml::from_str(
            r#"
            [intro]
            path = "intro.wav"
            lead_in_secs = 3.5

            [ducking]
            ducked_level = 0.3
            "#,
        )
        .expect("Should deserialize");

        assert_eq!(config.intro.lead_in_secs, 3.5);
        assert_eq!(config.intro.volume, IntroConfig::default().volume);
        assert_eq!(config.ducking.ducked_level, 0.3);
        assert_eq!(config.ducking.attack_ms, 200);
        assert_eq!(config.audio.sample_rate, 44_100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_volumes() {
        let mut config = RenderConfig::default();
        config.intro.volume = 1.5;
        assert!(config.validate().is_err());

        config.intro.volume = 0.5;
        config.outro.volume = -0.1;
        assert!(config.validate().is_err());

        config.outro.volume = 0.7;
        config.chime.volume = 2.0;
        assert!(config.validate().is_err());

        config.chime.volume = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_ducked_level() {
        let mut config = RenderConfig::default();
        config.ducking.ducked_level = 0.0; // Exclusive lower bound
        assert!(config.validate().is_err());

        config.ducking.ducked_level = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_outro_timing() {
        let mut config = RenderConfig::default();
        config.outro.duration_secs = 0.0;
        assert!(config.validate().is_err());

        config.outro.duration_secs = 5.0;
        config.outro.start_offset_secs = 1.0;
        assert!(config.validate().is_err());

        config.outro.start_offset_secs = -2.0; // Allowed, shifted at build time
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_format() {
        let mut config = RenderConfig::default();
        config.audio.channels = 6;
        assert!(config.validate().is_err());

        config.audio.channels = 1;
        config.audio.sample_rate = 4000;
        assert!(config.validate().is_err());

        config.audio.sample_rate = 48_000;
        config.export.bits_per_sample = 8;
        assert!(config.validate().is_err());

        config.export.bits_per_sample = 24;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_lead_in() {
        let mut config = RenderConfig::default();
        config.intro.lead_in_secs = -1.0;
        assert!(config.validate().is_err());

        config.intro.lead_in_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = RenderConfig::default();
        config.outro.duration_secs = 8.0;
        config.save_to_file(&path).unwrap();

        let loaded = RenderConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.outro.duration_secs, 8.0);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = RenderConfig::load_or_default("/nonexistent/episode-mixer.toml");
        assert_eq!(config.audio.sample_rate, 44_100);
    }
}
