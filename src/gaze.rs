use tracing::debug;

use crate::config::{BlinkConfig, PupilConfig};
use crate::eye::EyeRegion;
use crate::pipeline::GazeEstimator;
use crate::pupil::{Pupil, PupilLocalizer};
use crate::threshold::ThresholdCalibrator;
use crate::types::{EyeObservation, EyeSide, FrameInput, GazeSample, Point};

/// Pixels subtracted from the eye extent before normalizing pupil offsets.
pub const SOCKET_MARGIN: f64 = 10.0;

// =========================================================================
// Pupil Gaze (Computer Vision)
// Isolates both eyes, binarizes them at a self-calibrated threshold and
// turns the iris centroids into gaze ratios.
// =========================================================================
pub struct PupilGazePipeline {
    localizer: PupilLocalizer,
    thresholds: ThresholdCalibrator,
    blink_ratio_threshold: f64,
}

impl Default for PupilGazePipeline {
    fn default() -> Self {
        Self::new(&PupilConfig::default(), &BlinkConfig::default())
    }
}

impl PupilGazePipeline {
    pub fn new(pupil: &PupilConfig, blink: &BlinkConfig) -> Self {
        Self {
            localizer: PupilLocalizer::default(),
            thresholds: ThresholdCalibrator::new(pupil.calibration_frames, pupil.target_iris_size),
            blink_ratio_threshold: blink.ratio_threshold,
        }
    }

    // Keep refining the threshold until enough frames were seen, then locate.
    fn detect_pupil(&mut self, eye: &EyeRegion, side: EyeSide) -> Option<Pupil> {
        if !self.thresholds.is_complete() {
            self.thresholds.evaluate(&eye.frame, side);
        }
        let threshold = self.thresholds.threshold(side)?;
        self.localizer.locate(&eye.frame, threshold)
    }
}

impl GazeEstimator for PupilGazePipeline {
    fn name(&self) -> String {
        "Pupil Gaze (Computer Vision)".to_string()
    }

    fn estimate(&mut self, input: &FrameInput) -> EyeObservation {
        let face = match &input.face {
            Some(face) => face,
            None => return EyeObservation::default(),
        };

        let left = EyeRegion::isolate(&input.frame, &face.left_eye);
        let right = EyeRegion::isolate(&input.frame, &face.right_eye);
        let (left, right) = match (left, right) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                debug!("eye crop fell outside the frame");
                return EyeObservation { face_detected: true, ..Default::default() };
            }
        };

        let blinking = match (left.blinking_ratio, right.blinking_ratio) {
            (Some(l), Some(r)) => is_blinking(l, r, self.blink_ratio_threshold),
            _ => false,
        };

        let left_pupil = self.detect_pupil(&left, EyeSide::Left);
        let right_pupil = self.detect_pupil(&right, EyeSide::Right);

        let sample = match (left_pupil, right_pupil) {
            (Some(lp), Some(rp)) => compute_gaze_sample(&lp, &left, &rp, &right),
            _ => None,
        };

        let absolute = |pupil: Option<Pupil>, eye: &EyeRegion| {
            pupil.map(|p| Point::new(eye.origin.x + p.x as f32, eye.origin.y + p.y as f32))
        };

        EyeObservation {
            sample,
            blinking,
            face_detected: true,
            left_pupil: absolute(left_pupil, &left),
            right_pupil: absolute(right_pupil, &right),
        }
    }
}

/// Pupil offset over the usable socket extent. `None` when the eye is too
/// small to leave any travel after the margin.
pub fn eye_ratio(offset: u32, extent: u32) -> Option<f64> {
    let usable = extent as f64 - SOCKET_MARGIN;
    if usable <= 0.0 {
        return None;
    }
    Some(offset as f64 / usable)
}

/// Average of the per-eye horizontal and vertical ratios.
pub fn compute_gaze_sample(
    left_pupil: &Pupil,
    left_eye: &EyeRegion,
    right_pupil: &Pupil,
    right_eye: &EyeRegion,
) -> Option<GazeSample> {
    let lh = eye_ratio(left_pupil.x, left_eye.width())?;
    let rh = eye_ratio(right_pupil.x, right_eye.width())?;
    let lv = eye_ratio(left_pupil.y, left_eye.height())?;
    let rv = eye_ratio(right_pupil.y, right_eye.height())?;
    Some(GazeSample::new((lh + rh) / 2.0, (lv + rv) / 2.0))
}

pub fn is_blinking(left_ratio: f64, right_ratio: f64, threshold: f64) -> bool {
    (left_ratio + right_ratio) / 2.0 > threshold
}
