//! Application Configuration
//!
//! Scanner settings stored in TOML format. Every section falls back to its
//! defaults, so a partial file is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::capture::SamplerConfig;
use crate::catalog::LookupConfig;
use crate::text::NameRules;
use crate::vision::{EnhancementConfig, PresenceThresholds, RecognitionConfig, TrackerConfig};

/// File name of the configuration inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Detection zone and sampling cadence
    pub capture: SamplerConfig,
    /// Presence classifier thresholds
    pub presence: PresenceThresholds,
    /// Stability timing
    pub tracker: TrackerConfig,
    /// Image enhancement before recognition
    pub enhancement: EnhancementConfig,
    /// Recognition engine
    pub recognition: RecognitionConfig,
    /// Name extraction rule table
    pub text: NameRules,
    /// Catalog lookup and caching
    pub catalog: LookupConfig,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load `path` if it exists, otherwise use defaults
///
/// A malformed file is reported and ignored.
pub fn load_or_default(path: &Path) -> AppConfig {
    if !path.exists() {
        info!("Using default configuration");
        return AppConfig::default();
    }

    match load_config(path) {
        Ok(config) => {
            info!("Loaded configuration from {:?}", path);
            config
        }
        Err(e) => {
            warn!("{:#}, using defaults", e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Cadence;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        // Capture defaults
        assert!((config.capture.zone.width_pct - 0.30).abs() < 0.001);
        assert!((config.capture.zone.height_pct - 0.75).abs() < 0.001);
        assert_eq!(config.capture.cadence, Cadence::Fast);

        // Tracker defaults
        assert_eq!(config.tracker.debounce_ticks, 8);
        assert!(config.tracker.motion_check);

        // Catalog defaults
        assert_eq!(config.catalog.cache_ttl_hours, 24);
        assert_eq!(config.catalog.min_request_interval_ms, 100);
        assert_eq!(config.catalog.max_suggestions, 5);

        // Text defaults
        assert_eq!(config.text.single_letter_words, vec!['a', 'i', 'o']);
        assert!((config.text.min_letter_ratio - 0.70).abs() < 0.001);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            [capture]
            cadence = "low_power"

            [tracker]
            capture_delay_ms = 2000

            [catalog]
            base_url = "http://localhost:8080"
        "#;

        let parsed: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.capture.cadence, Cadence::LowPower);
        assert_eq!(parsed.capture.sample_width, 100);
        assert_eq!(parsed.tracker.capture_delay_ms, 2000);
        assert_eq!(parsed.tracker.cooldown_ms, 1500);
        assert_eq!(parsed.catalog.base_url, "http://localhost:8080");
        assert_eq!(parsed.catalog.rate_limit_backoff_ms, 1000);
        assert_eq!(parsed.presence, PresenceThresholds::default());
    }

    #[test]
    fn test_custom_cadence() {
        let parsed: AppConfig = toml::from_str("[capture]\ncadence = { custom = 500 }\n").unwrap();
        assert_eq!(parsed.capture.cadence, Cadence::Custom(500));
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.recognition.language = "deu".to_string();
        config.text.common_words.push("und".to_string());

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();

        let loaded = load_config(temp_file.path()).unwrap();
        assert_eq!(loaded.recognition.language, "deu");
        assert!(loaded.text.common_words.contains(&"und".to_string()));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        assert!(load_config(temp_file.path()).is_err());
        assert_eq!(load_or_default(temp_file.path()), AppConfig::default());
    }
}
