//! Eye isolation from face landmarks.
//!
//! Crops the landmark bounding box (plus a small margin) out of the frame and
//! paints everything outside the eye polygon white, so the only dark things
//! left are the iris and lashes.

use image::{GrayImage, Luma};

use crate::types::{EyeLandmarks, Point, Rect};

const CROP_MARGIN: f32 = 5.0;

#[derive(Debug, Clone)]
pub struct EyeRegion {
    /// Masked eye sub-image.
    pub frame: GrayImage,
    /// Top-left corner of the crop in frame coordinates.
    pub origin: Point,
    /// Eye width over eye height; large when the lids are shut.
    pub blinking_ratio: Option<f64>,
}

impl EyeRegion {
    /// `None` when the landmark box does not overlap the frame.
    pub fn isolate(frame: &GrayImage, landmarks: &EyeLandmarks) -> Option<Self> {
        let crop = crop_box(frame, landmarks)?;
        let mut eye = image::imageops::crop_imm(frame, crop.x, crop.y, crop.width, crop.height).to_image();

        let polygon: Vec<Point> = landmarks
            .iter()
            .map(|p| Point::new(p.x - crop.x as f32, p.y - crop.y as f32))
            .collect();

        for (x, y, px) in eye.enumerate_pixels_mut() {
            if !point_in_polygon(&polygon, x as f32 + 0.5, y as f32 + 0.5) {
                *px = Luma([255]);
            }
        }

        Some(Self {
            frame: eye,
            origin: Point::new(crop.x as f32, crop.y as f32),
            blinking_ratio: blinking_ratio(landmarks),
        })
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }
}

/// Corner-to-corner distance over the distance between the lid midpoints.
pub fn blinking_ratio(landmarks: &EyeLandmarks) -> Option<f64> {
    let left = landmarks[0];
    let right = landmarks[3];
    let top = landmarks[1].midpoint(&landmarks[2]);
    let bottom = landmarks[5].midpoint(&landmarks[4]);

    let eye_width = left.distance(&right) as f64;
    let eye_height = top.distance(&bottom) as f64;
    if eye_height <= f64::EPSILON {
        // Fully shut lids: treat as an arbitrarily large ratio.
        return if eye_width > 0.0 { Some(f64::MAX) } else { None };
    }
    Some(eye_width / eye_height)
}

fn crop_box(frame: &GrayImage, landmarks: &EyeLandmarks) -> Option<Rect> {
    let (fw, fh) = frame.dimensions();
    let min_x = landmarks.iter().map(|p| p.x).fold(f32::MAX, f32::min) - CROP_MARGIN;
    let max_x = landmarks.iter().map(|p| p.x).fold(f32::MIN, f32::max) + CROP_MARGIN;
    let min_y = landmarks.iter().map(|p| p.y).fold(f32::MAX, f32::min) - CROP_MARGIN;
    let max_y = landmarks.iter().map(|p| p.y).fold(f32::MIN, f32::max) + CROP_MARGIN;

    if !(min_x.is_finite() && max_x.is_finite() && min_y.is_finite() && max_y.is_finite()) {
        return None;
    }

    let x0 = min_x.max(0.0) as u32;
    let y0 = min_y.max(0.0) as u32;
    let x1 = (max_x.max(0.0) as u32).min(fw);
    let y1 = (max_y.max(0.0) as u32).min(fh);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
}

/// Even-odd rule.
pub fn point_in_polygon(polygon: &[Point], x: f32, y: f32) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > y) != (pj.y > y) {
            let cross_x = pj.x + (y - pj.y) / (pi.y - pj.y) * (pi.x - pj.x);
            if x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::synthetic::eye_landmarks;

    fn hexagon(cx: f32, cy: f32, half_w: f32, half_h: f32) -> EyeLandmarks {
        eye_landmarks(Point::new(cx, cy), half_w, half_h)
    }

    #[test]
    fn open_eye_ratio_is_width_over_height() {
        let ratio = blinking_ratio(&hexagon(50.0, 50.0, 30.0, 15.0)).unwrap();
        assert!((ratio - 2.0).abs() < 1e-6);
    }

    #[test]
    fn closed_eye_ratio_is_large() {
        let ratio = blinking_ratio(&hexagon(50.0, 50.0, 30.0, 1.0)).unwrap();
        assert!(ratio > 3.8);
    }

    #[test]
    fn isolate_masks_outside_polygon() {
        let frame = GrayImage::from_pixel(200, 100, Luma([40]));
        let region = EyeRegion::isolate(&frame, &hexagon(60.0, 50.0, 30.0, 15.0)).unwrap();

        assert_eq!(region.origin, Point::new(25.0, 30.0));
        assert_eq!(region.width(), 70);
        assert_eq!(region.height(), 40);
        // Crop corner lies outside the eye, centre inside.
        assert_eq!(region.frame.get_pixel(0, 0)[0], 255);
        assert_eq!(region.frame.get_pixel(35, 20)[0], 40);
    }

    #[test]
    fn off_frame_landmarks_are_rejected() {
        let frame = GrayImage::from_pixel(100, 100, Luma([40]));
        assert!(EyeRegion::isolate(&frame, &hexagon(500.0, 500.0, 30.0, 15.0)).is_none());
    }

    #[test]
    fn crop_is_clamped_to_frame() {
        let frame = GrayImage::from_pixel(100, 100, Luma([40]));
        let region = EyeRegion::isolate(&frame, &hexagon(10.0, 10.0, 30.0, 15.0)).unwrap();
        assert_eq!(region.origin, Point::new(0.0, 0.0));
        assert!(region.width() <= 100);
    }
}
