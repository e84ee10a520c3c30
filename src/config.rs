use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::types::ClickMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gaze: GazeConfig,
    pub blink: BlinkConfig,
    pub pupil: PupilConfig,
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    /// Seconds of steady gaze before a dwell click fires.
    pub dwell_time: f64,
    /// Pixels the gaze may wander from the fixation anchor.
    pub click_tolerance: u32,
    pub click_mode: ClickMode,
    pub calibration_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    /// Shortest closure (seconds) that counts as a click.
    pub min_duration: f64,
    /// Longest closure (seconds) that counts as a click.
    pub max_duration: f64,
    /// Eye width/height ratio above which the eye counts as closed.
    pub ratio_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PupilConfig {
    /// Threshold evaluations per eye before the binarization threshold settles.
    pub calibration_frames: usize,
    /// Expected share of dark pixels in a well-binarized eye.
    pub target_iris_size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub min_samples: usize,
    /// Maximum per-axis standard deviation of a stable sample window.
    pub stability_threshold: f64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            screen_width: 1920,
            screen_height: 1080,
            dwell_time: 0.8,
            click_tolerance: 30,
            click_mode: ClickMode::Both,
            calibration_file: PathBuf::from("calibration_params.json"),
        }
    }
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            min_duration: 0.3,
            max_duration: 1.0,
            ratio_threshold: 3.8,
        }
    }
}

impl Default for PupilConfig {
    fn default() -> Self {
        Self {
            calibration_frames: 20,
            target_iris_size: 0.48,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_samples: 30,
            stability_threshold: 0.05,
        }
    }
}

impl AppConfig {
    pub const DEFAULT_PATH: &'static str = "config.json";

    /// Load the config at `path`, falling back to defaults when the file is
    /// missing or unparsable. The result is validated and written back so new
    /// fields show up in the file.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            // Missing fields fall back to Default thanks to #[serde(default)]
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(c) => {
                    info!("Loaded configuration from {}", path.display());
                    c
                }
                Err(e) => {
                    warn!("Error parsing config: {}. Loading defaults.", e);
                    Self::default()
                }
            }
        } else {
            info!("Configuration file not found. Creating default at {}", path.display());
            Self::default()
        };

        config.validate()?;
        config.save(path)?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gaze.screen_width == 0 || self.gaze.screen_height == 0 {
            return Err(ConfigError::EmptyScreen(self.gaze.screen_width, self.gaze.screen_height));
        }
        if self.gaze.dwell_time <= 0.0 {
            return Err(ConfigError::NonPositiveDwell(self.gaze.dwell_time));
        }
        if self.blink.min_duration > self.blink.max_duration {
            return Err(ConfigError::InvertedBlinkWindow {
                min: self.blink.min_duration,
                max: self.blink.max_duration,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{ "gaze": { "dwell_time": 1.2, "click_mode": "dwell" } }"#).unwrap();
        assert_eq!(cfg.gaze.dwell_time, 1.2);
        assert_eq!(cfg.gaze.click_mode, ClickMode::Dwell);
        assert_eq!(cfg.gaze.screen_width, 1920);
        assert_eq!(cfg.blink.max_duration, 1.0);
        assert_eq!(cfg.calibration.min_samples, 30);
    }

    #[test]
    fn unknown_click_mode_is_rejected_at_parse_time() {
        let parsed = serde_json::from_str::<AppConfig>(r#"{ "gaze": { "click_mode": "wink" } }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn validate_rejects_inverted_blink_window() {
        let mut cfg = AppConfig::default();
        cfg.blink.min_duration = 2.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvertedBlinkWindow { .. })));
    }

    #[test]
    fn load_writes_back_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.gaze.click_tolerance, 30);
        assert!(path.exists());

        let reread: AppConfig = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reread.gaze.screen_height, 1080);
    }

    #[test]
    fn load_falls_back_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.gaze.click_mode, ClickMode::Both);
    }
}
