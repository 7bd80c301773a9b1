//! Application configuration.
//!
//! Loaded from `<data_dir>/config.json` at startup. Every field has a default,
//! so a partial file only overrides what it names; a missing or malformed
//! file falls back to defaults entirely.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::GlitchPolicy;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Sampling loop timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Tick interval of the capture/recognize loop (milliseconds)
    pub interval_ms: u64,
    /// Cadence of the name/level fields (milliseconds)
    pub name_level_every_ms: u64,
    /// Cadence of free-text and enemy fields (milliseconds)
    pub text_every_ms: u64,
    /// Dump every crop to the debug dir every N ticks (0 = never)
    pub debug_every_n: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 800,
            name_level_every_ms: 8000,
            text_every_ms: 2000,
            debug_every_n: 0,
        }
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Overlay tracking loop timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Position/visibility loop interval (milliseconds)
    pub tick_ms: u64,
    /// Opacity is restored this long after the host stops moving (milliseconds)
    pub fade_restore_ms: u64,
    /// Overlays hide after the app has been unfocused this long (milliseconds)
    pub blur_grace_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            fade_restore_ms: 100,
            blur_grace_ms: 100,
        }
    }
}

impl TrackingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn fade_restore(&self) -> Duration {
        Duration::from_millis(self.fade_restore_ms)
    }

    pub fn blur_grace(&self) -> Duration {
        Duration::from_millis(self.blur_grace_ms)
    }
}

/// Calibration surface behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Keep the calibration surface over a moving host
    pub follow: bool,
    /// Follow loop interval (milliseconds)
    pub follow_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            follow: true,
            follow_ms: 80,
        }
    }
}

impl CalibrationConfig {
    pub fn follow_interval(&self) -> Duration {
        Duration::from_millis(self.follow_ms.max(1))
    }
}

/// External recognition worker process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Absolute path or bare command name of the worker executable
    pub program: String,
    /// Arguments, typically the worker script
    pub args: Vec<String>,
    /// Extra environment for the worker process
    pub env: BTreeMap<String, String>,
    /// Per-request timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["ocr_worker.py".to_string()],
            env: BTreeMap::new(),
            timeout_ms: 5000,
        }
    }
}

impl WorkerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sampling: SamplingConfig,
    pub glitch: GlitchPolicy,
    pub tracking: TrackingConfig,
    pub calibration: CalibrationConfig,
    pub worker: WorkerConfig,
}

/// Loads configuration from `path` or returns defaults.
pub fn load_config_from(path: &Path) -> AppConfig {
    log::info!("Looking for config at: {}", path.display());

    if !path.exists() {
        log::info!("config.json not found. Using default config.");
        return AppConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                log::info!("Config loaded from config.json");
                config
            }
            Err(e) => {
                log::warn!("Failed to parse config.json: {}. Using defaults.", e);
                AppConfig::default()
            }
        },
        Err(e) => {
            log::warn!("Failed to read config.json: {}. Using defaults.", e);
            AppConfig::default()
        }
    }
}

fn load_config() -> AppConfig {
    load_config_from(&crate::paths::get_config_path())
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config() {
    let _ = CONFIG.set(load_config());
}

/// Returns the global configuration, loading it on first use.
pub fn get_config() -> &'static AppConfig {
    CONFIG.get_or_init(load_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json"));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.sampling.interval_ms, 800);
        assert_eq!(config.tracking.tick_ms, 50);
        assert_eq!(config.calibration.follow_ms, 80);
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"sampling":{"interval_ms":500},"glitch":{"max_jump":5.0},"worker":{"program":"/opt/ocr/bin/worker"}}"#,
        )
        .unwrap();

        let config = load_config_from(&path);
        assert_eq!(config.sampling.interval_ms, 500);
        assert_eq!(config.sampling.name_level_every_ms, 8000);
        assert_eq!(config.glitch.max_jump, 5.0);
        assert_eq!(config.glitch.window, 5);
        assert_eq!(config.worker.program, "/opt/ocr/bin/worker");
        assert_eq!(config.worker.timeout_ms, 5000);
    }

    #[test]
    fn test_malformed_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config_from(&path), AppConfig::default());
    }
}
