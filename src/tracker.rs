use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::aoi::{Aoi, AoiRegistry, GRID_CARD_HEIGHT, GRID_COLUMNS};
use crate::blink::BlinkClickDetector;
use crate::calibration::{CalibrationProgress, GazeCalibrator};
use crate::config::AppConfig;
use crate::dwell::DwellClickDetector;
use crate::error::CalibrationError;
use crate::gaze::PupilGazePipeline;
use crate::pipeline::GazeEstimator;
use crate::types::{
    ClickMethod, ClickMode, DeviceClick, EyeObservation, FrameInput, FrameResult, GazeSample, PixelPoint,
};

pub type ClickCallback = Box<dyn FnMut(&DeviceClick)>;

/// Turns frames into calibrated screen gaze and click events.
///
/// Owns every piece of per-session state; callers drive it from a single loop.
pub struct GazeTracker {
    estimator: Box<dyn GazeEstimator>,
    calibrator: GazeCalibrator,
    dwell: DwellClickDetector,
    blink: BlinkClickDetector,
    click_mode: ClickMode,
    aois: AoiRegistry,
    click_callback: Option<ClickCallback>,
    last_observation: EyeObservation,
}

impl GazeTracker {
    pub fn new(config: &AppConfig, estimator: Box<dyn GazeEstimator>) -> Self {
        let gaze = &config.gaze;
        let blink = &config.blink;
        info!(
            "GazeTracker initialized: {}x{} using {}",
            gaze.screen_width,
            gaze.screen_height,
            estimator.name()
        );
        Self {
            estimator,
            calibrator: GazeCalibrator::with_config(gaze, &config.calibration),
            dwell: DwellClickDetector::new(seconds(gaze.dwell_time, 0.8), gaze.click_tolerance),
            blink: BlinkClickDetector::new(seconds(blink.min_duration, 0.3), seconds(blink.max_duration, 1.0)),
            click_mode: gaze.click_mode,
            aois: AoiRegistry::new(),
            click_callback: None,
            last_observation: EyeObservation::default(),
        }
    }

    /// Tracker backed by the pupil-localization pipeline.
    pub fn with_pupil_pipeline(config: &AppConfig) -> Self {
        Self::new(config, Box::new(PupilGazePipeline::new(&config.pupil, &config.blink)))
    }

    pub fn update(&mut self, input: &FrameInput) -> FrameResult {
        self.update_at(input, Instant::now())
    }

    pub fn update_at(&mut self, input: &FrameInput, now: Instant) -> FrameResult {
        let observation = self.estimator.estimate(input);
        let mut result = FrameResult {
            pupils_detected: observation.pupils_located(),
            is_blinking: observation.blinking,
            ..FrameResult::default()
        };

        let click = match observation.sample {
            Some(sample) => self.track(sample, &observation, now, &mut result),
            None => self.lose_gaze(&observation, now),
        };

        if let Some((position, method)) = click {
            self.dispatch_click(position, method, &mut result);
        }

        self.last_observation = observation;
        result
    }

    fn track(
        &mut self,
        sample: GazeSample,
        observation: &EyeObservation,
        now: Instant,
        result: &mut FrameResult,
    ) -> Option<(PixelPoint, ClickMethod)> {
        let (x, y) = self.calibrator.apply(sample.h_ratio, sample.v_ratio);
        let position = self.calibrator.to_screen(x, y);
        result.gaze_position = Some(position);
        result.raw_ratios = Some(sample);

        let mut dwell_click = None;
        if self.click_mode.runs_dwell() {
            dwell_click = self.dwell.update_at(position, now);
            result.dwell_progress = self.dwell.progress_at(now);
        }

        let mut blink_click = None;
        if self.click_mode.runs_blink() {
            blink_click = self.blink.update_at(observation.blinking, Some(position), now);
        }

        // Dwell is evaluated first and wins a same-frame tie.
        dwell_click
            .map(|p| (p, ClickMethod::Dwell))
            .or(blink_click.map(|p| (p, ClickMethod::Blink)))
    }

    /// No usable gaze this frame. Closed lids hide the pupils, so an ongoing
    /// closure keeps being timed instead of being thrown away.
    fn lose_gaze(&mut self, observation: &EyeObservation, now: Instant) -> Option<(PixelPoint, ClickMethod)> {
        self.dwell.reset();

        let mut click = None;
        if self.click_mode.runs_blink() && observation.face_detected {
            click = self.blink.update_at(observation.blinking, None, now);
        }
        if !observation.blinking {
            self.blink.reset();
        }
        click.map(|p| (p, ClickMethod::Blink))
    }

    fn dispatch_click(&mut self, position: PixelPoint, method: ClickMethod, result: &mut FrameResult) {
        result.click_detected = true;
        result.click_method = Some(method);

        let Some(aoi) = self.aois.hit_test(position.x, position.y) else {
            debug!("{} click at {} outside every AOI", method.as_str(), position);
            return;
        };
        let click = DeviceClick {
            device_id: aoi.device_id.clone(),
            action: aoi.action.clone(),
            position,
            method,
        };
        info!("Click on {} ({}) at {} via {}", click.device_id, click.action, position, method.as_str());
        if let Some(callback) = self.click_callback.as_mut() {
            callback(&click);
        }
        result.clicked_device = Some(click);
    }

    pub fn estimator_name(&self) -> String {
        self.estimator.name()
    }

    /// Observation from the most recent frame, including pupil positions.
    pub fn last_observation(&self) -> &EyeObservation {
        &self.last_observation
    }

    pub fn set_click_callback(&mut self, callback: impl FnMut(&DeviceClick) + 'static) {
        self.click_callback = Some(Box::new(callback));
    }

    pub fn click_mode(&self) -> ClickMode {
        self.click_mode
    }

    pub fn set_click_mode(&mut self, mode: ClickMode) {
        info!("Click mode set to {}", mode);
        self.click_mode = mode;
        self.dwell.reset();
        self.blink.reset();
    }

    pub fn dwell_time(&self) -> Duration {
        self.dwell.dwell_time()
    }

    pub fn set_dwell_time(&mut self, dwell_time: Duration) {
        info!("Dwell time set to {:.2}s", dwell_time.as_secs_f64());
        self.dwell.set_dwell_time(dwell_time);
    }

    // AOIs

    pub fn add_aoi(&mut self, aoi: Aoi) {
        self.aois.add(aoi);
    }

    pub fn clear_aois(&mut self) {
        self.aois.clear();
    }

    /// Replace every AOI with a card grid for `devices`.
    pub fn rebuild_aoi_grid<S: AsRef<str>>(&mut self, devices: &[S]) {
        self.aois.rebuild_grid(devices, self.calibrator.screen_width, GRID_COLUMNS, GRID_CARD_HEIGHT);
    }

    pub fn aois(&self) -> &AoiRegistry {
        &self.aois
    }

    // Calibration

    pub fn calibrator(&self) -> &GazeCalibrator {
        &self.calibrator
    }

    pub fn start_calibration(&mut self) {
        self.calibrator.start();
    }

    /// Feed the last frame's raw ratios to the active target. False when the
    /// last frame had no gaze or the target still needs more samples.
    pub fn add_calibration_sample(&mut self) -> bool {
        match self.last_observation.sample {
            Some(s) => self.calibrator.add_sample(s.h_ratio, s.v_ratio),
            None => false,
        }
    }

    pub fn next_calibration_target(&mut self) -> Result<bool, CalibrationError> {
        self.calibrator.advance_target()
    }

    pub fn calibration_progress(&self) -> CalibrationProgress {
        self.calibrator.progress()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrator.is_calibrated()
    }

    pub fn reset_calibration(&mut self) {
        self.calibrator.reset();
    }

    pub fn save_calibration(&self, path: &Path) -> Result<(), CalibrationError> {
        self.calibrator.save(path)
    }

    pub fn load_calibration(&mut self, path: &Path) -> Result<(), CalibrationError> {
        self.calibrator.load(path)
    }
}

fn seconds(value: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ScriptedEstimator;
    use image::GrayImage;
    use std::cell::RefCell;
    use std::rc::Rc;

    const FRAME: Duration = Duration::from_millis(50);

    fn open(h: f64, v: f64) -> EyeObservation {
        EyeObservation {
            sample: Some(GazeSample::new(h, v)),
            face_detected: true,
            ..Default::default()
        }
    }

    fn closed() -> EyeObservation {
        EyeObservation { blinking: true, face_detected: true, ..Default::default() }
    }

    fn tracker(mode: ClickMode, script: Vec<EyeObservation>) -> GazeTracker {
        let mut config = AppConfig::default();
        config.gaze.click_mode = mode;
        GazeTracker::new(&config, Box::new(ScriptedEstimator::new(script)))
    }

    fn blank() -> FrameInput {
        FrameInput { frame: GrayImage::new(1, 1), face: None }
    }

    /// Feed `n` frames at 50ms spacing starting at `t0`.
    fn run(tracker: &mut GazeTracker, t0: Instant, n: u32) -> Vec<FrameResult> {
        (0..n).map(|i| tracker.update_at(&blank(), t0 + FRAME * i)).collect()
    }

    fn recorder(tracker: &mut GazeTracker) -> Rc<RefCell<Vec<DeviceClick>>> {
        let clicks = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&clicks);
        tracker.set_click_callback(move |c| sink.borrow_mut().push(c.clone()));
        clicks
    }

    #[test]
    fn gaze_loss_yields_empty_result_and_resets_dwell() {
        let mut script = vec![open(0.5, 0.5); 10];
        script.push(EyeObservation::default());
        script.extend(vec![open(0.5, 0.5); 10]);
        let mut tracker = tracker(ClickMode::Dwell, script);

        let results = run(&mut tracker, Instant::now(), 21);
        let lost = &results[10];
        assert!(!lost.pupils_detected);
        assert_eq!(lost.gaze_position, None);
        assert_eq!(lost.raw_ratios, None);
        assert_eq!(lost.dwell_progress, 0.0);
        // 500ms on either side of the gap never adds up to a dwell.
        assert!(results.iter().all(|r| !r.click_detected));
    }

    #[test]
    fn uncalibrated_gaze_maps_ratios_straight_to_pixels() {
        let mut tracker = tracker(ClickMode::Dwell, vec![open(0.25, 0.5)]);
        let result = tracker.update(&blank());
        assert_eq!(result.gaze_position, Some(PixelPoint::new(480, 540)));
        assert_eq!(result.raw_ratios, Some(GazeSample::new(0.25, 0.5)));
        assert!(result.pupils_detected);
    }

    #[test]
    fn dwell_click_hits_aoi_and_fires_callback_once() {
        let mut tracker = tracker(ClickMode::Dwell, vec![open(0.05, 0.05); 20]);
        tracker.add_aoi(Aoi::new(0, 0, 200, 200, "lamp", "toggle"));
        let clicks = recorder(&mut tracker);

        let results = run(&mut tracker, Instant::now(), 20);
        let fired: Vec<_> = results.iter().filter(|r| r.click_detected).collect();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].click_method, Some(ClickMethod::Dwell));
        assert_eq!(fired[0].clicked_device.as_ref().unwrap().device_id, "lamp");

        let clicks = clicks.borrow();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].position, PixelPoint::new(96, 54));
        assert_eq!(clicks[0].action, "toggle");
    }

    #[test]
    fn click_outside_aois_skips_callback() {
        let mut tracker = tracker(ClickMode::Dwell, vec![open(0.9, 0.9); 20]);
        tracker.add_aoi(Aoi::new(0, 0, 200, 200, "lamp", "toggle"));
        let clicks = recorder(&mut tracker);

        let results = run(&mut tracker, Instant::now(), 20);
        assert!(results.iter().any(|r| r.click_detected && r.clicked_device.is_none()));
        assert!(clicks.borrow().is_empty());
    }

    #[test]
    fn both_mode_prefers_dwell_on_same_frame() {
        let mut blinking = open(0.05, 0.05);
        blinking.blinking = true;
        // Anchor at t=0, eyes shut from t=200ms, reopened at t=800ms: the
        // dwell completes on the same frame the blink is released.
        let mut script = vec![open(0.05, 0.05); 4];
        script.extend(vec![blinking; 12]);
        script.push(open(0.05, 0.05));
        let mut tracker = tracker(ClickMode::Both, script);
        tracker.add_aoi(Aoi::new(0, 0, 200, 200, "lamp", "toggle"));
        let clicks = recorder(&mut tracker);

        let results = run(&mut tracker, Instant::now(), 17);
        let last = &results[16];
        assert!(last.click_detected);
        assert_eq!(last.click_method, Some(ClickMethod::Dwell));
        assert_eq!(results.iter().filter(|r| r.click_detected).count(), 1);
        assert_eq!(clicks.borrow().len(), 1);
    }

    #[test]
    fn blink_click_survives_pupils_disappearing() {
        let mut script = vec![open(0.05, 0.05); 2];
        script.extend(vec![closed(); 10]);
        script.push(open(0.6, 0.6));
        let mut tracker = tracker(ClickMode::Blink, script);
        tracker.add_aoi(Aoi::new(0, 0, 200, 200, "lamp", "toggle"));
        let clicks = recorder(&mut tracker);

        let results = run(&mut tracker, Instant::now(), 13);
        assert!(results[5].is_blinking);
        let released = &results[12];
        assert_eq!(released.click_method, Some(ClickMethod::Blink));
        assert_eq!(clicks.borrow()[0].position, PixelPoint::new(96, 54));
    }

    #[test]
    fn blink_released_while_gaze_lost_is_reported() {
        let mut script = vec![open(0.05, 0.05)];
        script.extend(vec![closed(); 10]);
        script.push(EyeObservation { face_detected: true, ..Default::default() });
        let mut tracker = tracker(ClickMode::Blink, script);

        let results = run(&mut tracker, Instant::now(), 12);
        let released = &results[11];
        assert!(released.click_detected);
        assert_eq!(released.gaze_position, None);
        assert!(!released.pupils_detected);
    }

    #[test]
    fn gaze_lost_blink_release_hits_aoi_at_pre_blink_gaze() {
        let mut script = vec![open(0.05, 0.05)];
        script.extend(vec![closed(); 10]);
        script.push(EyeObservation { face_detected: true, ..Default::default() });
        let mut tracker = tracker(ClickMode::Blink, script);
        tracker.add_aoi(Aoi::new(0, 0, 200, 200, "lamp", "toggle"));
        let clicks = recorder(&mut tracker);

        let results = run(&mut tracker, Instant::now(), 12);
        let released = &results[11];
        // The frame itself carries no gaze; only the click keeps a position.
        assert_eq!(released.gaze_position, None);
        assert_eq!(released.raw_ratios, None);
        assert_eq!(released.dwell_progress, 0.0);
        assert_eq!(released.click_method, Some(ClickMethod::Blink));
        let device = released.clicked_device.as_ref().expect("device click");
        assert_eq!(device.device_id, "lamp");
        assert_eq!(device.position, PixelPoint::new(96, 54));
        assert_eq!(clicks.borrow().len(), 1);
    }

    #[test]
    fn shorter_dwell_time_clicks_sooner() {
        let mut tracker = tracker(ClickMode::Dwell, vec![open(0.05, 0.05); 5]);
        tracker.set_dwell_time(Duration::from_millis(200));
        assert_eq!(tracker.dwell_time(), Duration::from_millis(200));

        let results = run(&mut tracker, Instant::now(), 5);
        let first = results.iter().position(|r| r.click_detected);
        assert_eq!(first, Some(4));
    }

    #[test]
    fn losing_the_face_abandons_a_blink() {
        let mut script = vec![open(0.05, 0.05)];
        script.extend(vec![closed(); 4]);
        script.push(EyeObservation::default());
        script.extend(vec![open(0.05, 0.05); 2]);
        let mut tracker = tracker(ClickMode::Blink, script);

        let results = run(&mut tracker, Instant::now(), 8);
        assert!(results.iter().all(|r| !r.click_detected));
    }

    #[test]
    fn dwell_mode_ignores_blinks() {
        let mut script = vec![open(0.05, 0.05)];
        script.extend(vec![closed(); 10]);
        script.push(open(0.5, 0.5));
        let mut tracker = tracker(ClickMode::Dwell, script);

        let results = run(&mut tracker, Instant::now(), 12);
        assert!(results.iter().all(|r| !r.click_detected));
    }

    #[test]
    fn calibration_sample_needs_a_gaze_frame() {
        let mut config = AppConfig::default();
        config.calibration.min_samples = 2;
        let script = vec![EyeObservation::default(), open(0.4, 0.4), open(0.4, 0.4)];
        let mut tracker = GazeTracker::new(&config, Box::new(ScriptedEstimator::new(script)));
        tracker.start_calibration();

        tracker.update(&blank());
        assert!(!tracker.add_calibration_sample());
        assert_eq!(tracker.calibration_progress().current_samples, 0);

        tracker.update(&blank());
        assert!(!tracker.add_calibration_sample());
        tracker.update(&blank());
        assert!(tracker.add_calibration_sample());
        assert_eq!(tracker.calibration_progress().current_samples, 2);
        assert_eq!(tracker.next_calibration_target().unwrap(), false);
        assert_eq!(tracker.calibration_progress().current_target, 1);
    }

    #[test]
    fn switching_mode_clears_detectors() {
        let mut tracker = tracker(ClickMode::Dwell, vec![open(0.05, 0.05); 20]);
        let t0 = Instant::now();
        run(&mut tracker, t0, 10);
        tracker.set_click_mode(ClickMode::Both);
        let r = tracker.update_at(&blank(), t0 + FRAME * 10);
        assert!(r.dwell_progress < 0.01);
        assert_eq!(tracker.click_mode(), ClickMode::Both);
    }
}
