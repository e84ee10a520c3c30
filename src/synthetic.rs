//! Synthetic face frames for the simulator and tests: two hexagonal eyes on
//! a flat skin tone, each with a dark radial-gradient iris placed according
//! to the requested gaze ratio.

use image::{GrayImage, Luma};

use crate::eye::point_in_polygon;
use crate::types::{EyeLandmarks, FaceLandmarks, FrameInput, GazeSample, Point};

const SKIN: u8 = 150;
const SCLERA: u8 = 220;
const IRIS_CORE: f32 = 10.0;
const IRIS_SLOPE: f32 = 4.0;

#[derive(Debug, Clone)]
pub struct SyntheticFace {
    pub width: u32,
    pub height: u32,
    pub left_center: Point,
    pub right_center: Point,
    pub eye_half_width: f32,
    pub eye_half_height: f32,
}

impl Default for SyntheticFace {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            left_center: Point::new(110.0, 120.0),
            right_center: Point::new(210.0, 120.0),
            eye_half_width: 30.0,
            eye_half_height: 15.0,
        }
    }
}

impl SyntheticFace {
    pub fn render(&self, gaze: GazeSample, eyes_closed: bool) -> FrameInput {
        let half_h = if eyes_closed { 1.0 } else { self.eye_half_height };
        let left = eye_landmarks(self.left_center, self.eye_half_width, half_h);
        let right = eye_landmarks(self.right_center, self.eye_half_width, half_h);

        let mut frame = GrayImage::from_pixel(self.width, self.height, Luma([SKIN]));
        if !eyes_closed {
            self.paint_eye(&mut frame, &left, self.left_center, gaze);
            self.paint_eye(&mut frame, &right, self.right_center, gaze);
        }

        FrameInput {
            frame,
            face: Some(FaceLandmarks { left_eye: left, right_eye: right }),
        }
    }

    fn paint_eye(&self, frame: &mut GrayImage, landmarks: &EyeLandmarks, center: Point, gaze: GazeSample) {
        let iris = Point::new(
            center.x + (gaze.h_ratio as f32 - 0.5) * self.eye_half_width,
            center.y + (gaze.v_ratio as f32 - 0.5) * self.eye_half_height * 0.8,
        );
        let x0 = (center.x - self.eye_half_width).max(0.0) as u32;
        let x1 = ((center.x + self.eye_half_width) as u32).min(self.width);
        let y0 = (center.y - self.eye_half_height).max(0.0) as u32;
        let y1 = ((center.y + self.eye_half_height) as u32).min(self.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
                if !point_in_polygon(landmarks, fx, fy) {
                    continue;
                }
                let d = Point::new(fx, fy).distance(&iris);
                let value = (IRIS_CORE + d * IRIS_SLOPE).min(SCLERA as f32);
                frame.put_pixel(x, y, Luma([value as u8]));
            }
        }
    }
}

pub fn eye_landmarks(center: Point, half_w: f32, half_h: f32) -> EyeLandmarks {
    [
        Point::new(center.x - half_w, center.y),
        Point::new(center.x - half_w / 3.0, center.y - half_h),
        Point::new(center.x + half_w / 3.0, center.y - half_h),
        Point::new(center.x + half_w, center.y),
        Point::new(center.x + half_w / 3.0, center.y + half_h),
        Point::new(center.x - half_w / 3.0, center.y + half_h),
    ]
}

/// Scripted gaze for the simulator: hold still on a point long enough to
/// dwell, blink for half a second, then sweep in a circle.
pub fn scenario(frame_index: usize) -> (GazeSample, bool) {
    const FIXATIONS: [(f64, f64); 4] = [(0.3, 0.3), (0.7, 0.3), (0.5, 0.5), (0.3, 0.7)];
    let cycle = frame_index / 100;
    let phase = frame_index % 100;
    let (fx, fy) = FIXATIONS[cycle % FIXATIONS.len()];
    match phase {
        0..=39 => (GazeSample::new(fx, fy), false),
        40..=49 => (GazeSample::new(fx, fy), true),
        _ => {
            let t = (phase - 50) as f64 * 0.125;
            (GazeSample::new(0.5 + 0.3 * t.cos(), 0.5 + 0.3 * t.sin()), false)
        }
    }
}
