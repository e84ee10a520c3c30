//! Per-eye binarization threshold search.

use image::GrayImage;
use tracing::debug;

use crate::pupil::{threshold_binary, PupilLocalizer};
use crate::types::EyeSide;

/// Pixels trimmed from each edge before measuring the iris share.
const IRIS_MARGIN: u32 = 5;

#[derive(Debug, Clone)]
pub struct ThresholdCalibrator {
    /// Samples per side before the threshold counts as settled.
    pub nb_frames: usize,
    /// Expected share of dark pixels in the trimmed eye.
    pub target_iris_size: f64,
    thresholds_left: Vec<u8>,
    thresholds_right: Vec<u8>,
    localizer: PupilLocalizer,
}

impl Default for ThresholdCalibrator {
    fn default() -> Self {
        Self::new(20, 0.48)
    }
}

impl ThresholdCalibrator {
    pub fn new(nb_frames: usize, target_iris_size: f64) -> Self {
        Self {
            nb_frames,
            target_iris_size,
            thresholds_left: Vec::new(),
            thresholds_right: Vec::new(),
            localizer: PupilLocalizer::default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.thresholds_left.len() >= self.nb_frames && self.thresholds_right.len() >= self.nb_frames
    }

    /// Mean of the thresholds chosen so far for `side`; `None` before the
    /// first evaluation.
    pub fn threshold(&self, side: EyeSide) -> Option<u8> {
        let history = self.history(side);
        if history.is_empty() {
            return None;
        }
        let sum: u32 = history.iter().map(|&t| t as u32).sum();
        Some((sum / history.len() as u32) as u8)
    }

    pub fn samples(&self, side: EyeSide) -> usize {
        self.history(side).len()
    }

    pub fn evaluate(&mut self, eye: &GrayImage, side: EyeSide) {
        let best = self.find_best_threshold(eye);
        debug!("{} eye threshold candidate {}", side.as_str(), best);
        match side {
            EyeSide::Left => self.thresholds_left.push(best),
            EyeSide::Right => self.thresholds_right.push(best),
        }
    }

    /// Exhaustive search over 5, 10, ..., 95 for the threshold whose iris
    /// share is closest to the target. Ties keep the lower threshold.
    pub fn find_best_threshold(&self, eye: &GrayImage) -> u8 {
        let prepared = self.localizer.preprocess(eye);
        let mut best = (5u8, f64::INFINITY);
        for threshold in (5u8..100).step_by(5) {
            let size = iris_size(&threshold_binary(&prepared, threshold));
            let distance = (size - self.target_iris_size).abs();
            if distance < best.1 {
                best = (threshold, distance);
            }
        }
        best.0
    }

    fn history(&self, side: EyeSide) -> &[u8] {
        match side {
            EyeSide::Left => &self.thresholds_left,
            EyeSide::Right => &self.thresholds_right,
        }
    }
}

/// Share of dark pixels in the binary frame after trimming the margin.
/// An eye smaller than the margin scores 0.
pub fn iris_size(binary: &GrayImage) -> f64 {
    let (w, h) = binary.dimensions();
    if w <= 2 * IRIS_MARGIN || h <= 2 * IRIS_MARGIN {
        return 0.0;
    }
    let mut total = 0u32;
    let mut dark = 0u32;
    for y in IRIS_MARGIN..h - IRIS_MARGIN {
        for x in IRIS_MARGIN..w - IRIS_MARGIN {
            total += 1;
            if binary.get_pixel(x, y)[0] == 0 {
                dark += 1;
            }
        }
    }
    dark as f64 / total as f64
}
