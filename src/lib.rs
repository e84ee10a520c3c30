//! Webcam gaze tracking for hands-free device control: pupil localization,
//! five-point screen calibration, and dwell/blink click detection over a set
//! of on-screen device cards.

pub mod aoi;
pub mod blink;
pub mod calibration;
pub mod config;
pub mod dwell;
pub mod error;
pub mod eye;
pub mod gaze;
pub mod pipeline;
pub mod pupil;
pub mod synthetic;
pub mod threshold;
pub mod tracker;
pub mod types;


pub use aoi::{Aoi, AoiRegistry};
pub use calibration::GazeCalibrator;
pub use config::AppConfig;
pub use error::{CalibrationError, ConfigError};
pub use tracker::GazeTracker;
pub use types::{ClickMethod, ClickMode, DeviceClick, FrameInput, FrameResult, GazeSample};
