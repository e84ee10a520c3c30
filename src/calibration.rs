use nalgebra::{DMatrix, Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::{CalibrationConfig, GazeConfig};
use crate::error::CalibrationError;
use crate::types::{GazeSample, PixelPoint};

/// Normalized screen positions of the calibration targets, in collection order:
/// top-left, top-right, center, bottom-left, bottom-right.
pub const TARGET_POSITIONS: [(f64, f64); 5] = [
    (0.15, 0.15),
    (0.85, 0.15),
    (0.5, 0.5),
    (0.15, 0.85),
    (0.85, 0.85),
];

pub const TARGET_COUNT: usize = TARGET_POSITIONS.len();

/// `screen = matrix · gaze + translation`, all in normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineCalibration {
    pub matrix: [[f64; 2]; 2],
    pub translation: [f64; 2],
}

impl AffineCalibration {
    /// Unclamped transform.
    pub fn transform(&self, h: f64, v: f64) -> (f64, f64) {
        let m = &self.matrix;
        (
            m[0][0] * h + m[0][1] * v + self.translation[0],
            m[1][0] * h + m[1][1] * v + self.translation[1],
        )
    }

    /// Raw gaze that maps onto the given normalized screen point; `None` for a
    /// singular matrix.
    pub fn invert(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let m = Matrix2::new(self.matrix[0][0], self.matrix[0][1], self.matrix[1][0], self.matrix[1][1]);
        let g = m.try_inverse()? * Vector2::new(x - self.translation[0], y - self.translation[1]);
        Some((g.x, g.y))
    }

    fn is_finite(&self) -> bool {
        self.matrix.iter().flatten().chain(self.translation.iter()).all(|x| x.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    Idle,
    Collecting(usize),
    Calibrated,
}

/// On-disk calibration record. Field names are part of the file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub screen_width: u32,
    pub screen_height: u32,
    pub calibration_matrix: [[f64; 2]; 2],
    pub translation_vector: [f64; 2],
    pub target_positions: Vec<[f64; 2]>,
    pub sample_counts: BTreeMap<usize, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProgress {
    pub current_target: usize,
    pub total_targets: usize,
    pub current_samples: usize,
    pub required_samples: usize,
    pub is_complete: bool,
    pub target_position: PixelPoint,
}

/// Five-point affine gaze calibration.
///
/// Collects raw gaze ratios while the user looks at each target in turn, then
/// fits `screen ≈ M·gaze + t` by least squares over the per-target centroids.
pub struct GazeCalibrator {
    pub screen_width: u32,
    pub screen_height: u32,
    pub min_samples: usize,
    pub stability_threshold: f64,
    samples: [Vec<GazeSample>; TARGET_COUNT],
    phase: CalibrationPhase,
    current_target: usize,
    affine: Option<AffineCalibration>,
}

impl GazeCalibrator {
    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        Self::with_config(
            &GazeConfig { screen_width, screen_height, ..GazeConfig::default() },
            &CalibrationConfig::default(),
        )
    }

    pub fn with_config(gaze: &GazeConfig, calibration: &CalibrationConfig) -> Self {
        Self {
            screen_width: gaze.screen_width,
            screen_height: gaze.screen_height,
            min_samples: calibration.min_samples,
            stability_threshold: calibration.stability_threshold,
            samples: Default::default(),
            phase: CalibrationPhase::Idle,
            current_target: 0,
            affine: None,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_calibrated(&self) -> bool {
        self.affine.is_some()
    }

    pub fn affine(&self) -> Option<&AffineCalibration> {
        self.affine.as_ref()
    }

    pub fn samples(&self, target: usize) -> &[GazeSample] {
        self.samples.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Begin a new session. A previously computed calibration stays in effect
    /// until the new one is computed.
    pub fn start(&mut self) {
        self.samples.iter_mut().for_each(Vec::clear);
        self.current_target = 0;
        self.phase = CalibrationPhase::Collecting(0);
        info!("Started calibration");
    }

    /// Drop samples and any computed calibration.
    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(Vec::clear);
        self.current_target = 0;
        self.phase = CalibrationPhase::Idle;
        self.affine = None;
        info!("Calibration reset");
    }

    /// Record a sample for the active target. Returns true once the target
    /// holds enough samples to move on.
    pub fn add_sample(&mut self, h: f64, v: f64) -> bool {
        let CalibrationPhase::Collecting(target) = self.phase else {
            debug!("sample ignored outside a calibration session");
            return false;
        };
        let bucket = &mut self.samples[target];
        bucket.push(GazeSample::new(h, v));
        bucket.len() >= self.min_samples
    }

    /// Move to the next target. After the last one the calibration is
    /// computed; `Ok(true)` means the calibrator is now calibrated.
    pub fn advance_target(&mut self) -> Result<bool, CalibrationError> {
        let target = match self.phase {
            CalibrationPhase::Collecting(t) => t,
            CalibrationPhase::Calibrated => return Ok(true),
            CalibrationPhase::Idle => return Ok(false),
        };

        self.current_target = target + 1;
        if self.current_target < TARGET_COUNT {
            self.phase = CalibrationPhase::Collecting(self.current_target);
            return Ok(false);
        }

        match self.compute_calibration() {
            Ok(affine) => {
                self.affine = Some(affine);
                self.phase = CalibrationPhase::Calibrated;
                Ok(true)
            }
            Err(e) => {
                error!("Calibration failed: {}", e);
                self.phase = CalibrationPhase::Idle;
                Err(e)
            }
        }
    }

    /// Fit the affine map from the collected samples without applying it.
    pub fn compute_calibration(&self) -> Result<AffineCalibration, CalibrationError> {
        let mut gaze_points = Vec::with_capacity(TARGET_COUNT);
        for (i, samples) in self.samples.iter().enumerate() {
            if samples.is_empty() {
                return Err(CalibrationError::MissingSamples(i));
            }
            let stable = self.filter_stable_samples(samples);
            let (gx, gy) = mean(stable);
            info!("Target {}: {} stable samples, avg=({:.3}, {:.3})", i, stable.len(), gx, gy);
            gaze_points.push((gx, gy));
        }

        let affine = fit_affine(&gaze_points, &TARGET_POSITIONS)?;
        info!("Calibration complete! matrix={:?} translation={:?}", affine.matrix, affine.translation);
        Ok(affine)
    }

    /// The trailing `min_samples` window if it is steady on both axes,
    /// otherwise every sample.
    fn filter_stable_samples<'a>(&self, samples: &'a [GazeSample]) -> &'a [GazeSample] {
        if samples.len() < self.min_samples {
            return samples;
        }
        let window = &samples[samples.len() - self.min_samples..];
        let (std_x, std_y) = std_dev(window);
        if std_x < self.stability_threshold && std_y < self.stability_threshold {
            window
        } else {
            warn!("Samples not stable (std_x={:.4}, std_y={:.4}), using all {}", std_x, std_y, samples.len());
            samples
        }
    }

    /// Calibrated normalized gaze, clamped to the unit square. Identity while
    /// uncalibrated.
    pub fn apply(&self, h: f64, v: f64) -> (f64, f64) {
        match &self.affine {
            Some(affine) => {
                let (x, y) = affine.transform(h, v);
                (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0))
            }
            None => (h, v),
        }
    }

    /// Normalized gaze to whole screen pixels, kept inside the screen.
    pub fn to_screen(&self, x: f64, y: f64) -> PixelPoint {
        let sx = (x * self.screen_width as f64) as i64;
        let sy = (y * self.screen_height as f64) as i64;
        PixelPoint::new(
            sx.clamp(0, self.screen_width as i64 - 1) as i32,
            sy.clamp(0, self.screen_height as i64 - 1) as i32,
        )
    }

    /// Active target in screen pixels; `None` once every target is done.
    pub fn current_target_position(&self) -> Option<PixelPoint> {
        let (nx, ny) = *TARGET_POSITIONS.get(self.current_target)?;
        Some(PixelPoint::new(
            (nx * self.screen_width as f64) as i32,
            (ny * self.screen_height as f64) as i32,
        ))
    }

    pub fn progress(&self) -> CalibrationProgress {
        CalibrationProgress {
            current_target: self.current_target,
            total_targets: TARGET_COUNT,
            current_samples: self.samples(self.current_target).len(),
            required_samples: self.min_samples,
            is_complete: self.is_calibrated(),
            target_position: self.current_target_position().unwrap_or_default(),
        }
    }

    pub fn snapshot(&self) -> Result<CalibrationFile, CalibrationError> {
        let affine = self.affine.ok_or(CalibrationError::NotCalibrated)?;
        Ok(CalibrationFile {
            screen_width: self.screen_width,
            screen_height: self.screen_height,
            calibration_matrix: affine.matrix,
            translation_vector: affine.translation,
            target_positions: TARGET_POSITIONS.iter().map(|&(x, y)| [x, y]).collect(),
            sample_counts: self.samples.iter().map(Vec::len).enumerate().collect(),
        })
    }

    /// Adopt a stored calibration. Rejected without touching the current state
    /// when it was made for a different screen size.
    pub fn restore(&mut self, file: &CalibrationFile) -> Result<(), CalibrationError> {
        if file.screen_width != self.screen_width || file.screen_height != self.screen_height {
            let e = CalibrationError::ScreenMismatch {
                saved_width: file.screen_width,
                saved_height: file.screen_height,
                current_width: self.screen_width,
                current_height: self.screen_height,
            };
            warn!("{}", e);
            return Err(e);
        }
        let affine = AffineCalibration {
            matrix: file.calibration_matrix,
            translation: file.translation_vector,
        };
        if !affine.is_finite() {
            return Err(CalibrationError::Malformed("non-finite coefficients".to_string()));
        }
        self.affine = Some(affine);
        self.phase = CalibrationPhase::Calibrated;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), CalibrationError> {
        let snapshot = self.snapshot().inspect_err(|_| warn!("No calibration to save"))?;
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, json).map_err(|source| CalibrationError::Io { path: path.to_path_buf(), source })?;
        info!("Calibration saved to {}", path.display());
        Ok(())
    }

    pub fn load(&mut self, path: &Path) -> Result<(), CalibrationError> {
        let file = File::open(path).map_err(|source| CalibrationError::Io { path: path.to_path_buf(), source })?;
        let stored: CalibrationFile = serde_json::from_reader(file)?;
        self.restore(&stored)?;
        info!("Calibration loaded from {}", path.display());
        Ok(())
    }
}

/// Least-squares solve of `screen ≈ [gaze | 1] · T` for the 3x2 `T`.
pub fn fit_affine(gaze: &[(f64, f64)], screen: &[(f64, f64)]) -> Result<AffineCalibration, CalibrationError> {
    let n = gaze.len().min(screen.len());
    let a = DMatrix::from_fn(n, 3, |r, c| match c {
        0 => gaze[r].0,
        1 => gaze[r].1,
        _ => 1.0,
    });
    let b = DMatrix::from_fn(n, 2, |r, c| if c == 0 { screen[r].0 } else { screen[r].1 });

    let t = a.svd(true, true).solve(&b, 1e-12).map_err(CalibrationError::Solve)?;

    let affine = AffineCalibration {
        matrix: [[t[(0, 0)], t[(1, 0)]], [t[(0, 1)], t[(1, 1)]]],
        translation: [t[(2, 0)], t[(2, 1)]],
    };
    if !affine.is_finite() {
        return Err(CalibrationError::Solve("non-finite solution"));
    }
    Ok(affine)
}

fn mean(samples: &[GazeSample]) -> (f64, f64) {
    let n = samples.len() as f64;
    let (sx, sy) = samples.iter().fold((0.0, 0.0), |(x, y), s| (x + s.h_ratio, y + s.v_ratio));
    (sx / n, sy / n)
}

/// Population standard deviation per axis.
fn std_dev(samples: &[GazeSample]) -> (f64, f64) {
    let (mx, my) = mean(samples);
    let n = samples.len() as f64;
    let (vx, vy) = samples.iter().fold((0.0, 0.0), |(x, y), s| {
        (x + (s.h_ratio - mx).powi(2), y + (s.v_ratio - my).powi(2))
    });
    ((vx / n).sqrt(), (vy / n).sqrt())
}
