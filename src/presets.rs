//! Ducking presets for common episode styles.
//!
//! Named [`DuckingConfig`] sets selectable from the command line, so a
//! render can switch how aggressively music backs off under speech
//! without editing the config file.

use crate::config::DuckingConfig;

/// A named preset containing ducking parameters.
#[derive(Debug, Clone, Copy)]
pub struct DuckingPreset {
    /// Human-readable preset name
    pub name: &'static str,
    /// Associated ducking parameters
    pub config: DuckingConfig,
}

/// Standard presets
pub const PRESETS: &[DuckingPreset] = &[
    DuckingPreset {
        name: "Podcast Default",
        config: DuckingConfig {
            enabled: true,
            ducked_level: 0.25,
            attack_ms: 200,
            release_ms: 400,
            merge_gap_ms: 500,
        },
    },
    DuckingPreset {
        name: "Gentle",
        config: DuckingConfig {
            enabled: true,
            ducked_level: 0.5,
            attack_ms: 600,
            release_ms: 1200,
            merge_gap_ms: 1000,
        },
    },
    DuckingPreset {
        name: "Aggressive",
        config: DuckingConfig {
            enabled: true,
            ducked_level: 0.1,
            attack_ms: 80,
            release_ms: 250,
            merge_gap_ms: 300,
        },
    },
    DuckingPreset {
        name: "Off",
        config: DuckingConfig {
            enabled: false,
            ducked_level: 1.0,
            attack_ms: 0,
            release_ms: 0,
            merge_gap_ms: 0,
        },
    },
];

/// Helper to find a preset by name (case-insensitive)
pub fn find_preset(name: &str) -> Option<&'static DuckingPreset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Check if given parameters match any preset
pub fn matches_preset(config: &DuckingConfig) -> Option<&'static str> {
    PRESETS.iter().find_map(|preset| {
        if configs_equal(&preset.config, config) {
            Some(preset.name)
        } else {
            None
        }
    })
}

/// Compare two DuckingConfigs for equality (with floating point tolerance)
fn configs_equal(a: &DuckingConfig, b: &DuckingConfig) -> bool {
    const EPSILON: f32 = 0.001;

    a.enabled == b.enabled
        && (a.ducked_level - b.ducked_level).abs() < EPSILON
        && a.attack_ms == b.attack_ms
        && a.release_ms == b.release_ms
        && a.merge_gap_ms == b.merge_gap_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_have_unique_names() {
        let mut names = std::collections::HashSet::new();
        for preset in PRESETS {
            assert!(
                names.insert(preset.name),
                "Duplicate preset name: {}",
                preset.name
            );
        }
    }

    #[test]
    fn test_find_preset_by_name() {
        let preset = find_preset("gentle");
        assert!(preset.is_some());
        assert_eq!(preset.unwrap().name, "Gentle");

        let missing = find_preset("Nonexistent");
        assert!(missing.is_none());
    }

    #[test]
    fn test_default_config_matches_preset() {
        let matched = matches_preset(&DuckingConfig::default());
        assert_eq!(matched, Some("Podcast Default"));
    }

    #[test]
    fn test_custom_config_doesnt_match() {
        let custom = DuckingConfig {
            ducked_level: 0.33,
            ..DuckingConfig::default()
        };
        assert_eq!(matches_preset(&custom), None);
    }

    #[test]
    fn test_presets_pass_validation() {
        for preset in PRESETS {
            let mut config = crate::config::RenderConfig::default();
            config.ducking = preset.config;
            assert!(config.validate().is_ok(), "{} is invalid", preset.name);
        }
    }
}
