//! Pupil localization: binarize an isolated eye image and take the centroid
//! of the iris blob.
//!
//! The eye image is smoothed with an edge-preserving bilateral filter, eroded
//! to eat eyelashes and speckle, then hard-thresholded. Every border the
//! contour tracer finds (outer borders and the holes they enclose) is ranked
//! by the area it encloses; the largest one is the eye-socket outline and the
//! second largest is taken as the iris.

use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::filter::bilateral::GaussianEuclideanColorDistance;
use imageproc::filter::bilateral_filter;
use imageproc::morphology::{grayscale_erode, Mask};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Pupil position inside an eye sub-image, in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pupil {
    pub x: u32,
    pub y: u32,
}

/// Raw moments of the polygon traced along one contour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Region {
    /// Green's theorem over the closed polygon. Orientation is normalized so
    /// `m00` is the enclosed area whichever way the border was traced.
    pub fn from_contour(points: &[Point<i32>]) -> Self {
        let mut region = Region { m00: 0.0, m10: 0.0, m01: 0.0 };
        if points.len() < 3 {
            return region;
        }
        for (i, p) in points.iter().enumerate() {
            let q = points[(i + 1) % points.len()];
            let (x0, y0, x1, y1) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
            let cross = x0 * y1 - x1 * y0;
            region.m00 += cross;
            region.m10 += (x0 + x1) * cross;
            region.m01 += (y0 + y1) * cross;
        }
        region.m00 /= 2.0;
        region.m10 /= 6.0;
        region.m01 /= 6.0;
        if region.m00 < 0.0 {
            region.m00 = -region.m00;
            region.m10 = -region.m10;
            region.m01 = -region.m01;
        }
        region
    }

    pub fn area(&self) -> f64 {
        self.m00
    }

    /// `(m10/m00, m01/m00)` truncated to pixels, `None` for a zero-area region.
    pub fn centroid(&self) -> Option<Pupil> {
        if self.m00 <= 0.0 {
            return None;
        }
        Some(Pupil {
            x: (self.m10 / self.m00) as u32,
            y: (self.m01 / self.m00) as u32,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PupilLocalizer {
    pub blur_diameter: u32,
    pub sigma_color: f64,
    pub sigma_space: f64,
    pub erode_iterations: u32,
}

impl Default for PupilLocalizer {
    fn default() -> Self {
        Self {
            blur_diameter: 10,
            sigma_color: 15.0,
            sigma_space: 15.0,
            erode_iterations: 3,
        }
    }
}

impl PupilLocalizer {
    /// Blur and erode; the threshold-independent half of the pipeline.
    pub fn preprocess(&self, eye: &GrayImage) -> GrayImage {
        if eye.width() == 0 || eye.height() == 0 {
            return eye.clone();
        }
        let radius = (self.blur_diameter / 2).clamp(1, u8::MAX as u32) as u8;
        let mut out = bilateral_filter(
            eye,
            radius,
            self.sigma_space as f32,
            GaussianEuclideanColorDistance::new(self.sigma_color as f32),
        );
        let kernel = Mask::square(1);
        for _ in 0..self.erode_iterations {
            out = grayscale_erode(&out, &kernel);
        }
        out
    }

    /// Full pipeline: the binary frame that should hold a single iris blob.
    pub fn binarize(&self, eye: &GrayImage, threshold: u8) -> GrayImage {
        threshold_binary(&self.preprocess(eye), threshold)
    }

    pub fn locate(&self, eye: &GrayImage, threshold: u8) -> Option<Pupil> {
        locate_in_binary(&self.binarize(eye, threshold))
    }
}

/// Second-largest contour's centroid. Fewer than two contours means there is
/// no iris distinct from the socket.
pub fn locate_in_binary(binary: &GrayImage) -> Option<Pupil> {
    let mut regions = find_regions(binary);
    if regions.len() < 2 {
        return None;
    }
    regions.sort_by(|a, b| a.area().total_cmp(&b.area()));
    regions[regions.len() - 2].centroid()
}

/// `value > threshold` becomes 255, everything else 0.
pub fn threshold_binary(img: &GrayImage, level: u8) -> GrayImage {
    threshold(img, level, ThresholdType::Binary)
}

/// Moments of every border in the binary image: the outer border of each
/// light component and the border around each dark hole inside one.
pub fn find_regions(binary: &GrayImage) -> Vec<Region> {
    find_contours::<i32>(binary)
        .iter()
        .map(|contour| Region::from_contour(&contour.points))
        .collect()
}
