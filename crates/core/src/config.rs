use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Tunables for the whole engine. Every field has a default, so a config file
/// only needs the keys it overrides.
///
/// ```toml
/// [viewport]
/// scale_max = 50.0
///
/// [persist]
/// debounce_ms = 250
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub viewport: ViewportConfig,
    pub playback: PlaybackConfig,
    pub persist: PersistConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Pixels per timeline unit, lower bound.
    pub scale_min: f64,
    /// Pixels per timeline unit, upper bound.
    pub scale_max: f64,
    /// Wheel delta that changes the scale by a factor of `e`.
    pub zoom_sensitivity: f64,
    /// Lookback before the visible window, in timeline units.
    pub margin_left: f64,
    /// Lookahead after the visible window, in timeline units.
    pub margin_right: f64,
    /// Cap on records returned per collection for one visible window.
    pub max_visible_records: usize,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            scale_min: 0.1,
            scale_max: 100.0,
            zoom_sensitivity: 1000.0,
            margin_left: 100.0,
            margin_right: 0.0,
            max_visible_records: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Timeline units per second of media time. Timeline units are minutes.
    pub units_per_second: f64,
    /// How far past the end of a clip to look for the next one, in seconds.
    pub guard_band_seconds: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            units_per_second: 1.0 / 60.0,
            guard_band_seconds: 10.0,
        }
    }
}

impl PlaybackConfig {
    pub fn guard_band(&self) -> f64 {
        self.guard_band_seconds * self.units_per_second
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Quiet period before a view-state write.
    pub debounce_ms: u64,
    /// Longest a pending write may be deferred by continuous interaction.
    pub max_wait_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            max_wait_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Images timestamped before this year come from unset camera clocks and
    /// are dropped.
    pub earliest_image_year: i32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            earliest_image_year: 2022,
        }
    }
}

impl TimelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let vp = &self.viewport;
        if !(vp.scale_min > 0.0 && vp.scale_min <= vp.scale_max) {
            return Err(ConfigError::Invalid(
                "viewport.scale_min must be positive and not above scale_max",
            ));
        }
        if vp.zoom_sensitivity <= 0.0 {
            return Err(ConfigError::Invalid("viewport.zoom_sensitivity must be positive"));
        }
        if self.playback.units_per_second <= 0.0 {
            return Err(ConfigError::Invalid("playback.units_per_second must be positive"));
        }
        if self.persist.max_wait_ms < self.persist.debounce_ms {
            return Err(ConfigError::Invalid(
                "persist.max_wait_ms must not be below debounce_ms",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config = TimelineConfig::from_toml_str("").ok();
        assert_eq!(config, Some(TimelineConfig::default()));
    }

    #[test]
    fn partial_override() {
        let raw = "[viewport]\nscale_max = 50.0\n\n[persist]\ndebounce_ms = 250\n";
        let config = TimelineConfig::from_toml_str(raw).unwrap_or_default();
        assert_eq!(config.viewport.scale_max, 50.0);
        assert_eq!(config.viewport.scale_min, 0.1);
        assert_eq!(config.persist.debounce_ms, 250);
        assert_eq!(config.persist.max_wait_ms, 1000);
    }

    #[test]
    fn rejects_inverted_scale_bounds() {
        let raw = "[viewport]\nscale_min = 10.0\nscale_max = 1.0\n";
        assert!(matches!(
            TimelineConfig::from_toml_str(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            TimelineConfig::from_toml_str("[viewport\n"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn guard_band_is_ten_seconds_in_minutes() {
        let pb = PlaybackConfig::default();
        assert!((pb.guard_band() - 10.0 / 60.0).abs() < 1e-12);
    }
}
