use std::time::{Duration, Instant};
use tracing::debug;

use crate::types::PixelPoint;

/// Click by holding the gaze within `tolerance` pixels of a fixation anchor
/// for `dwell_time`.
#[derive(Debug, Clone)]
pub struct DwellClickDetector {
    dwell_time: Duration,
    tolerance: f64,
    fixation: Option<(PixelPoint, Instant)>,
}

impl Default for DwellClickDetector {
    fn default() -> Self {
        Self::new(Duration::from_millis(800), 30)
    }
}

impl DwellClickDetector {
    pub fn new(dwell_time: Duration, tolerance: u32) -> Self {
        Self {
            dwell_time,
            tolerance: tolerance as f64,
            fixation: None,
        }
    }

    pub fn dwell_time(&self) -> Duration {
        self.dwell_time
    }

    pub fn set_dwell_time(&mut self, dwell_time: Duration) {
        self.dwell_time = dwell_time;
    }

    pub fn anchor(&self) -> Option<PixelPoint> {
        self.fixation.map(|(p, _)| p)
    }

    pub fn update(&mut self, point: PixelPoint) -> Option<PixelPoint> {
        self.update_at(point, Instant::now())
    }

    /// Returns the anchor when the dwell completes.
    pub fn update_at(&mut self, point: PixelPoint, now: Instant) -> Option<PixelPoint> {
        let Some((anchor, start)) = self.fixation else {
            self.fixation = Some((point, now));
            return None;
        };

        if anchor.distance(&point) > self.tolerance {
            // Moved away: a new fixation starts here.
            self.fixation = Some((point, now));
            return None;
        }

        if now.saturating_duration_since(start) >= self.dwell_time {
            debug!("Dwell click at {}", anchor);
            self.reset();
            return Some(anchor);
        }
        None
    }

    pub fn progress(&self) -> f64 {
        self.progress_at(Instant::now())
    }

    /// Fraction of the dwell time elapsed, capped at 1.0.
    pub fn progress_at(&self, now: Instant) -> f64 {
        match self.fixation {
            Some((_, start)) if !self.dwell_time.is_zero() => {
                let elapsed = now.saturating_duration_since(start).as_secs_f64();
                (elapsed / self.dwell_time.as_secs_f64()).min(1.0)
            }
            Some(_) => 1.0,
            None => 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.fixation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(50);

    #[test]
    fn steady_gaze_clicks_once_at_anchor() {
        let mut dwell = DwellClickDetector::new(Duration::from_millis(800), 30);
        let t0 = Instant::now();
        let p = PixelPoint::new(400, 300);

        let mut clicks = Vec::new();
        // 800ms + one extra frame
        for i in 0..=17 {
            if let Some(c) = dwell.update_at(p, t0 + FRAME * i) {
                clicks.push((i, c));
            }
        }
        assert_eq!(clicks, vec![(16, p)]);
    }

    #[test]
    fn small_jitter_keeps_first_anchor() {
        let mut dwell = DwellClickDetector::new(Duration::from_millis(200), 30);
        let t0 = Instant::now();
        assert_eq!(dwell.update_at(PixelPoint::new(100, 100), t0), None);
        assert_eq!(dwell.update_at(PixelPoint::new(120, 110), t0 + FRAME), None);
        assert_eq!(
            dwell.update_at(PixelPoint::new(90, 95), t0 + FRAME * 4),
            Some(PixelPoint::new(100, 100))
        );
        assert_eq!(dwell.anchor(), None);
    }

    #[test]
    fn drift_beyond_tolerance_never_clicks() {
        let mut dwell = DwellClickDetector::new(Duration::from_millis(800), 30);
        let t0 = Instant::now();
        for i in 0..200u32 {
            let p = PixelPoint::new(31 * i as i32, 0);
            assert_eq!(dwell.update_at(p, t0 + FRAME * i), None);
        }
    }

    #[test]
    fn progress_grows_and_caps() {
        let mut dwell = DwellClickDetector::new(Duration::from_secs(1), 30);
        let t0 = Instant::now();
        assert_eq!(dwell.progress_at(t0), 0.0);

        dwell.update_at(PixelPoint::new(5, 5), t0);
        assert!((dwell.progress_at(t0 + Duration::from_millis(250)) - 0.25).abs() < 1e-9);
        assert_eq!(dwell.progress_at(t0 + Duration::from_secs(3)), 1.0);

        dwell.reset();
        assert_eq!(dwell.progress_at(t0 + Duration::from_secs(3)), 0.0);
    }

    #[test]
    fn restart_resets_timer() {
        let mut dwell = DwellClickDetector::new(Duration::from_millis(500), 30);
        let t0 = Instant::now();
        dwell.update_at(PixelPoint::new(0, 0), t0);
        dwell.update_at(PixelPoint::new(500, 500), t0 + Duration::from_millis(400));
        assert_eq!(dwell.update_at(PixelPoint::new(500, 500), t0 + Duration::from_millis(600)), None);
        assert_eq!(
            dwell.update_at(PixelPoint::new(500, 500), t0 + Duration::from_millis(900)),
            Some(PixelPoint::new(500, 500))
        );
    }
}
