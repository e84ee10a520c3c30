use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A 2D point in frame (camera) coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// A position on the screen, in whole pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &PixelPoint) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for PixelPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned crop box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeSide {
    Left,
    Right,
}

impl EyeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Raw per-frame gaze ratio pair. 0.0 and 1.0 are the opposite extremes of
/// horizontal/vertical pupil travel inside the eye socket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub h_ratio: f64,
    pub v_ratio: f64,
}

impl GazeSample {
    pub fn new(h_ratio: f64, v_ratio: f64) -> Self {
        Self { h_ratio, v_ratio }
    }

    /// Gaze towards the user's right (camera left).
    pub fn is_right(&self) -> bool {
        self.h_ratio <= 0.35
    }

    pub fn is_left(&self) -> bool {
        self.h_ratio >= 0.65
    }

    pub fn is_center(&self) -> bool {
        !self.is_right() && !self.is_left()
    }
}

/// Which detector(s) may turn gaze into a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickMode {
    Dwell,
    Blink,
    #[default]
    Both,
}

impl ClickMode {
    pub fn runs_dwell(&self) -> bool {
        matches!(self, Self::Dwell | Self::Both)
    }

    pub fn runs_blink(&self) -> bool {
        matches!(self, Self::Blink | Self::Both)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dwell => "dwell",
            Self::Blink => "blink",
            Self::Both => "both",
        }
    }
}

impl FromStr for ClickMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dwell" => Ok(Self::Dwell),
            "blink" => Ok(Self::Blink),
            "both" => Ok(Self::Both),
            other => Err(ConfigError::InvalidClickMode(other.to_string())),
        }
    }
}

impl fmt::Display for ClickMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickMethod {
    Dwell,
    Blink,
}

impl ClickMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dwell => "dwell",
            Self::Blink => "blink",
        }
    }
}

/// A click that landed inside an AOI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceClick {
    pub device_id: String,
    pub action: String,
    pub position: PixelPoint,
    pub method: ClickMethod,
}

/// Six landmarks outlining one eye, in frame coordinates.
///
/// Order: outer corner, two upper-lid points, inner corner, two lower-lid
/// points (lower lid listed from the inner corner back to the outer one).
pub type EyeLandmarks = [Point; 6];

/// Landmarks for the single tracked face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub left_eye: EyeLandmarks,
    pub right_eye: EyeLandmarks,
}

/// One frame handed to the tracker: the grayscale camera image plus the
/// landmarks an external detector found in it (if any).
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub frame: GrayImage,
    pub face: Option<FaceLandmarks>,
}

/// What the gaze estimator extracted from a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EyeObservation {
    /// Present only when both pupils were located.
    pub sample: Option<GazeSample>,
    /// Reported whenever landmarks exist, independent of the pupils.
    pub blinking: bool,
    pub face_detected: bool,
    pub left_pupil: Option<Point>,
    pub right_pupil: Option<Point>,
}

impl EyeObservation {
    pub fn pupils_located(&self) -> bool {
        self.sample.is_some()
    }

    /// Midpoint between both pupils in frame coordinates.
    pub fn pupil_center(&self) -> Option<Point> {
        match (self.left_pupil, self.right_pupil) {
            (Some(l), Some(r)) => Some(l.midpoint(&r)),
            _ => None,
        }
    }
}

/// The single per-frame output of the tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub gaze_position: Option<PixelPoint>,
    pub raw_ratios: Option<GazeSample>,
    pub pupils_detected: bool,
    pub is_blinking: bool,
    pub dwell_progress: f64,
    pub click_detected: bool,
    pub click_method: Option<ClickMethod>,
    pub clicked_device: Option<DeviceClick>,
}
