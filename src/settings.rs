use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::EngineConfig;
use crate::repetition::MAX_INTERVAL_SECONDS;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Directory for everything memloop persists: `~/.config/memloop/`
pub fn config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("memloop");
    path
}

/// Returns the path to the settings file: `~/.config/memloop/settings.json`
fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Persisted application settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    // Playback
    pub volume: f32,
    pub interval_seconds: u32,
    pub last_source: Option<String>,

    // Engine
    pub fetch_timeout_secs: u64,
    pub time_update_ms: u64,

    // Window
    pub show_waveform: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            interval_seconds: 10,
            last_source: None,

            fetch_timeout_secs: 30,
            time_update_ms: 100,

            show_waveform: true,
        }
    }
}

impl AppSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = settings_path();
        match Self::load_from(&path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(SettingsError::Io(e)) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
            Err(e) => {
                log::warn!("Failed to parse settings ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Read and sanitize settings from an explicit location
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&contents)?;
        Ok(settings.sanitized())
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        let path = settings_path();
        if let Err(e) = self.save_to(&path) {
            log::warn!("Failed to write settings: {}", e);
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Clamp every field into its valid range
    pub fn sanitized(mut self) -> Self {
        self.volume = if self.volume.is_nan() {
            1.0
        } else {
            self.volume.clamp(0.0, 1.0)
        };
        self.interval_seconds = self.interval_seconds.min(MAX_INTERVAL_SECONDS);
        self.fetch_timeout_secs = self.fetch_timeout_secs.clamp(1, 120);
        self.time_update_ms = self.time_update_ms.clamp(20, 1000);
        if self.last_source.as_deref().is_some_and(|s| s.trim().is_empty()) {
            self.last_source = None;
        }
        self
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            time_update_interval: Duration::from_millis(self.time_update_ms),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = AppSettings {
            volume: 0.3,
            interval_seconds: 45,
            last_source: Some("https://example.com/verse.mp3".to_string()),
            fetch_timeout_secs: 10,
            time_update_ms: 250,
            show_waveform: false,
        };
        settings.save_to(&path).unwrap();

        assert_eq!(AppSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "interval_seconds": 20 }"#).unwrap();

        let settings = AppSettings::load_from(&path).unwrap();
        assert_eq!(settings.interval_seconds, 20);
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.time_update_ms, 100);
        assert!(settings.show_waveform);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "volume": 3.5,
                "interval_seconds": 900,
                "last_source": "   ",
                "fetch_timeout_secs": 0,
                "time_update_ms": 5
            }"#,
        )
        .unwrap();

        let settings = AppSettings::load_from(&path).unwrap();
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.interval_seconds, 300);
        assert_eq!(settings.last_source, None);
        assert_eq!(settings.fetch_timeout_secs, 1);
        assert_eq!(settings.time_update_ms, 20);
    }

    #[test]
    fn test_load_errors_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            AppSettings::load_from(&missing),
            Err(SettingsError::Io(_))
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            AppSettings::load_from(&broken),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn test_engine_config_from_settings() {
        let settings = AppSettings {
            time_update_ms: 50,
            fetch_timeout_secs: 5,
            ..AppSettings::default()
        };
        let config = settings.engine_config();
        assert_eq!(config.time_update_interval, Duration::from_millis(50));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
    }
}
