use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("screen dimensions mismatch: saved {saved_width}x{saved_height}, current {current_width}x{current_height}")]
    ScreenMismatch {
        saved_width: u32,
        saved_height: u32,
        current_width: u32,
        current_height: u32,
    },

    #[error("no samples collected for calibration target {0}")]
    MissingSamples(usize),

    #[error("least-squares solve failed: {0}")]
    Solve(&'static str),

    #[error("no calibration to save")]
    NotCalibrated,

    #[error("malformed calibration file: {0}")]
    Malformed(String),

    #[error("calibration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("calibration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid click mode '{0}' (expected dwell, blink or both)")]
    InvalidClickMode(String),

    #[error("screen size must be non-zero, got {0}x{1}")]
    EmptyScreen(u32, u32),

    #[error("blink window is empty: min {min}s > max {max}s")]
    InvertedBlinkWindow { min: f64, max: f64 },

    #[error("dwell time must be positive, got {0}s")]
    NonPositiveDwell(f64),
}
