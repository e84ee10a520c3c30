use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::types::PixelPoint;

/// Click by closing both eyes for a deliberate, bounded duration.
///
/// The click lands where the user was looking just before closing their
/// eyes; no gaze is trusted while the lids are shut.
#[derive(Debug, Clone)]
pub struct BlinkClickDetector {
    min_duration: Duration,
    max_duration: Duration,
    blink_start: Option<Instant>,
    blinking: bool,
    last_open_gaze: Option<PixelPoint>,
}

impl Default for BlinkClickDetector {
    fn default() -> Self {
        Self::new(Duration::from_millis(300), Duration::from_secs(1))
    }
}

impl BlinkClickDetector {
    pub fn new(min_duration: Duration, max_duration: Duration) -> Self {
        Self {
            min_duration,
            max_duration,
            blink_start: None,
            blinking: false,
            last_open_gaze: None,
        }
    }

    pub fn is_blinking(&self) -> bool {
        self.blinking
    }

    pub fn last_open_gaze(&self) -> Option<PixelPoint> {
        self.last_open_gaze
    }

    pub fn update(&mut self, is_blinking: bool, gaze: Option<PixelPoint>) -> Option<PixelPoint> {
        self.update_at(is_blinking, gaze, Instant::now())
    }

    /// The click, if any, is reported at the gaze recorded before the
    /// closure, not at `gaze` from the reopening frame.
    pub fn update_at(&mut self, is_blinking: bool, gaze: Option<PixelPoint>, now: Instant) -> Option<PixelPoint> {
        let click = match (self.blinking, is_blinking) {
            (false, true) => {
                self.blink_start = Some(now);
                self.blinking = true;
                None
            }
            (true, false) => {
                self.blinking = false;
                self.blink_start.take().and_then(|start| self.judge(now.saturating_duration_since(start)))
            }
            _ => None,
        };

        if !is_blinking {
            if let Some(p) = gaze {
                self.last_open_gaze = Some(p);
            }
        }
        click
    }

    fn judge(&self, duration: Duration) -> Option<PixelPoint> {
        if duration >= self.min_duration && duration <= self.max_duration {
            info!("Blink click detected: {:.2}s", duration.as_secs_f64());
            self.last_open_gaze
        } else {
            debug!("Ignoring {:.2}s eye closure", duration.as_secs_f64());
            None
        }
    }

    /// Abandon any closure in progress. The last open-eye gaze is kept.
    pub fn reset(&mut self) {
        self.blink_start = None;
        self.blinking = false;
    }
}
