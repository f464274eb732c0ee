//! Error types for episode rendering.
//!
//! Each stage of the render owns a focused error enum; [`RenderError`]
//! wraps them so callers can match on the stage that failed.

use crate::timeline::ClipKind;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Configuration loading or range validation failed
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An intro/outro/chime or narration file could not be loaded
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Buffer construction or conversion failed
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// Timeline could not be resolved
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    /// Narration manifest could not be read
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Mixing invariant breached
    #[error("Mix error: {0}")]
    Mix(#[from] MixError),

    /// Final encode failed
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading and normalizing audio assets.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Audio asset not found: '{path}'")]
    NotFound { path: PathBuf },

    #[error("Failed to decode audio asset '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to read audio asset '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors raised while building or converting in-memory buffers.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Invalid sample rate: {rate} Hz (must be 8kHz-192kHz)")]
    InvalidSampleRate { rate: u32 },

    #[error("Unsupported channel count: {channels} (only mono/stereo supported)")]
    UnsupportedChannels { channels: u16 },

    #[error("Channel {channel} has {actual} frames, expected {expected}")]
    RaggedChannels {
        channel: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Resampling from {from} Hz to {to} Hz failed: {reason}")]
    ResampleFailed { from: u32, to: u32, reason: String },
}

/// Errors raised by the timeline builder.
#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Cannot build a timeline without narration clips")]
    EmptyTimeline,

    #[error("{kind} clip is {sample_rate} Hz / {channels} ch, timeline expects {expected_rate} Hz / {expected_channels} ch")]
    FormatMismatch {
        kind: ClipKind,
        sample_rate: u32,
        channels: u16,
        expected_rate: u32,
        expected_channels: u16,
    },
}

/// Errors raised while reading a narration manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest '{path}': {source}")]
    Read {
        path: Box<PathBuf>,
        source: std::io::Error,
    },

    #[error("Invalid manifest '{path}': {source}")]
    Parse {
        path: Box<PathBuf>,
        source: toml::de::Error,
    },

    #[error("Manifest '{path}' lists no narration segments")]
    NoSegments { path: Box<PathBuf> },
}

/// Errors raised by the mixer and envelope construction.
///
/// All of these indicate a broken contract between pipeline stages and
/// are never retryable.
#[derive(Error, Debug)]
pub enum MixError {
    #[error("Output region {start_secs:.3}s-{end_secs:.3}s is not covered by any placed clip")]
    Internal { start_secs: f64, end_secs: f64 },

    #[error("Mix plan has {clips} clips but {envelopes} envelopes were supplied")]
    EnvelopeMismatch { clips: usize, envelopes: usize },

    #[error("Invalid envelope: {reason}")]
    InvalidEnvelope { reason: String },

    #[error("Clip {index} ({kind}) is {sample_rate} Hz / {channels} ch, plan is {expected_rate} Hz / {expected_channels} ch")]
    ClipFormat {
        index: usize,
        kind: ClipKind,
        sample_rate: u32,
        channels: u16,
        expected_rate: u32,
        expected_channels: u16,
    },
}

/// Errors raised while encoding the final buffer.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to encode audio: {source}")]
    Encode { source: hound::Error },

    #[error("Unsupported bit depth: {bits} (only 16 or 24 supported)")]
    UnsupportedBitDepth { bits: u16 },

    #[error("Failed to prepare output '{path}': {source}")]
    Io {
        path: Box<PathBuf>,
        source: std::io::Error,
    },

    #[error("Failed to conform buffer for export: {0}")]
    Conform(#[from] AudioError),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file '{path}': {source}")]
    LoadFailed {
        path: Box<PathBuf>,
        source: std::io::Error,
    },

    #[error("Invalid config format in '{path}': {source}")]
    InvalidFormat {
        path: Box<PathBuf>,
        source: toml::de::Error,
    },

    #[error("Config validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Failed to save config to '{path}': {source}")]
    SaveFailed {
        path: Box<PathBuf>,
        source: std::io::Error,
    },

    #[error("Config serialization failed: {source}")]
    SerializationFailed { source: toml::ser::Error },
}

/// Result type alias for render operations
pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// Non-fatal conditions surfaced to the caller alongside a finished render.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderWarning {
    /// An asset flagged optional failed to load and was left out
    OptionalAssetDropped {
        kind: ClipKind,
        path: PathBuf,
        reason: String,
    },

    /// The outro asked to start before narration ended and was moved
    OutroShifted {
        requested_secs: f64,
        narration_end_secs: f64,
    },

    /// The intro is shorter than the configured lead-in
    LeadInShortened {
        configured_secs: f64,
        actual_secs: f64,
    },

    /// A section marker fell outside the narration span
    MarkerOutOfRange {
        offset_secs: f64,
        label: Option<String>,
    },
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderWarning::OptionalAssetDropped { kind, path, reason } => write!(
                f,
                "Optional {} asset '{}' dropped: {}",
                kind,
                path.display(),
                reason
            ),
            RenderWarning::OutroShifted {
                requested_secs,
                narration_end_secs,
            } => write!(
                f,
                "Outro requested at {:.3}s overlaps narration; moved to {:.3}s",
                requested_secs, narration_end_secs
            ),
            RenderWarning::LeadInShortened {
                configured_secs,
                actual_secs,
            } => write!(
                f,
                "Intro lead-in shortened from {:.3}s to {:.3}s (intro too short)",
                configured_secs, actual_secs
            ),
            RenderWarning::MarkerOutOfRange { offset_secs, label } => write!(
                f,
                "Section marker {:?} at {:.3}s lies outside the narration",
                label.as_deref().unwrap_or("<unlabelled>"),
                offset_secs
            ),
        }
    }
}

impl RenderError {
    /// Whether running the same render again could succeed.
    ///
    /// Only I/O-flavoured failures qualify. Mix errors are defects in the
    /// timeline contract and must surface unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            RenderError::Asset(e) => e.is_retryable(),
            RenderError::Export(ExportError::Io { .. }) => true,
            RenderError::Io(_) => true,
            _ => false,
        }
    }

    /// Message for the person running the render, without type names.
    pub fn user_message(&self) -> String {
        match self {
            RenderError::Asset(e) => e.user_message(),
            other => other.to_string(),
        }
    }

    /// Suggested next step, when there is an obvious one.
    pub fn recovery_hint(&self) -> Option<&str> {
        match self {
            RenderError::Config(e) => e.recovery_hint(),
            RenderError::Asset(e) => e.recovery_hint(),
            RenderError::Manifest(ManifestError::NoSegments { .. }) => {
                Some("Add at least one [[segment]] entry to the manifest")
            }
            RenderError::Mix(_) => Some("This is a bug; please report it with the config used"),
            _ => None,
        }
    }

    /// Process exit code used by the binary for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            RenderError::Config(_) | RenderError::Manifest(_) => 2,
            RenderError::Asset(_) => 3,
            RenderError::Timeline(_) => 4,
            RenderError::Mix(_) => 70,
            RenderError::Audio(_) | RenderError::Export(_) | RenderError::Io(_) => 1,
        }
    }
}

impl AssetError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, AssetError::Unreadable { .. })
    }

    /// Path of the asset that failed.
    pub fn path(&self) -> &std::path::Path {
        match self {
            AssetError::NotFound { path }
            | AssetError::Decode { path, .. }
            | AssetError::Unreadable { path, .. } => path,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AssetError::NotFound { path } => {
                format!("Audio file '{}' does not exist", path.display())
            }
            AssetError::Decode { path, .. } => {
                format!("Audio file '{}' is corrupt or in an unsupported format", path.display())
            }
            AssetError::Unreadable { path, .. } => {
                format!("Audio file '{}' could not be read", path.display())
            }
        }
    }

    /// Get suggested recovery action
    pub fn recovery_hint(&self) -> Option<&str> {
        match self {
            AssetError::NotFound { .. } => {
                Some("Fix the asset path or set `optional = true` to render without it")
            }
            AssetError::Decode { .. } => Some("Re-export the file as WAV, FLAC or MP3"),
            AssetError::Unreadable { .. } => Some("Check the file's permissions"),
        }
    }
}

impl ConfigError {
    /// Get suggested recovery action
    pub fn recovery_hint(&self) -> Option<&str> {
        match self {
            ConfigError::ValidationFailed { .. } => {
                Some("Check volume, duration and timing values against their allowed ranges")
            }
            ConfigError::InvalidFormat { .. } => Some("Fix the TOML syntax in the config file"),
            ConfigError::LoadFailed { .. } => {
                Some("Pass --config with an existing file or remove it to use defaults")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AudioError::InvalidSampleRate { rate: 999 };
        assert!(err.to_string().contains("999"));
        assert!(err.to_string().contains("8kHz-192kHz"));

        let err = MixError::Internal {
            start_secs: 1.5,
            end_secs: 2.25,
        };
        assert!(err.to_string().contains("1.500s-2.250s"));
    }

    #[test]
    fn test_retryable_errors() {
        let retryable = RenderError::Asset(AssetError::Unreadable {
            path: PathBuf::from("intro.mp3"),
            source: std::io::Error::other("busy"),
        });
        assert!(retryable.is_retryable());

        let missing = RenderError::Asset(AssetError::NotFound {
            path: PathBuf::from("intro.mp3"),
        });
        assert!(!missing.is_retryable());

        let internal = RenderError::Mix(MixError::Internal {
            start_secs: 0.0,
            end_secs: 1.0,
        });
        assert!(!internal.is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let err = AssetError::NotFound {
            path: PathBuf::from("music/intro.mp3"),
        };
        let msg = err.user_message();
        assert!(msg.contains("music/intro.mp3"));
        assert!(!msg.contains("Error"));
        assert_eq!(err.path(), std::path::Path::new("music/intro.mp3"));
    }

    #[test]
    fn test_recovery_hints() {
        let err = ConfigError::ValidationFailed {
            reason: "volume".to_string(),
        };
        assert!(err.recovery_hint().is_some());
        assert!(err.recovery_hint().unwrap().contains("volume"));
    }

    #[test]
    fn test_render_error_surfaces_asset_message_and_hint() {
        let err = RenderError::Asset(AssetError::NotFound {
            path: PathBuf::from("music/outro.wav"),
        });
        assert!(err.user_message().contains("does not exist"));
        assert!(err.recovery_hint().unwrap().contains("optional"));

        let err = RenderError::Timeline(TimelineError::EmptyTimeline);
        assert!(err.recovery_hint().is_none());
    }

    #[test]
    fn test_exit_codes_distinguish_stages() {
        let config = RenderError::Config(ConfigError::ValidationFailed {
            reason: String::new(),
        });
        let timeline = RenderError::Timeline(TimelineError::EmptyTimeline);
        assert_ne!(config.exit_code(), timeline.exit_code());
    }
}
