use gaze_home::calibration::TARGET_POSITIONS;
use gaze_home::synthetic::{self, SyntheticFace};
use gaze_home::types::{ClickMethod, GazeSample};
use gaze_home::{AppConfig, GazeTracker};
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_millis(50);

/// Run the five-point calibration on synthetic eyes; returns the next free frame index.
fn calibrate(tracker: &mut GazeTracker, face: &SyntheticFace, t0: Instant) -> u32 {
    let mut frame = 0u32;
    tracker.start_calibration();
    for &(x, y) in TARGET_POSITIONS.iter() {
        let input = face.render(GazeSample::new(x, y), false);
        loop {
            tracker.update_at(&input, t0 + FRAME * frame);
            frame += 1;
            if tracker.add_calibration_sample() {
                break;
            }
            assert!(frame < 1000, "pupils were never located");
        }
        tracker.next_calibration_target().unwrap();
    }
    frame
}

#[test]
fn verify_config_integrity() {
    let config: AppConfig = serde_json::from_str(include_str!("../config.json")).unwrap();
    config.validate().unwrap();
    assert_eq!(config.gaze.click_tolerance, 30);
}

#[test]
fn calibrated_gaze_lands_near_targets() {
    let config = AppConfig::default();
    let face = SyntheticFace::default();
    let mut tracker = GazeTracker::with_pupil_pipeline(&config);

    calibrate(&mut tracker, &face, Instant::now());
    assert!(tracker.is_calibrated());
    assert!(tracker.calibration_progress().is_complete);

    for &(x, y) in TARGET_POSITIONS.iter() {
        let result = tracker.update(&face.render(GazeSample::new(x, y), false));
        let pos = result.gaze_position.expect("gaze should be tracked");
        let (tx, ty) = (x * 1920.0, y * 1080.0);
        assert!((pos.x as f64 - tx).abs() < 192.0, "x: {} vs {}", pos.x, tx);
        assert!((pos.y as f64 - ty).abs() < 108.0, "y: {} vs {}", pos.y, ty);
    }
}

#[test]
fn scenario_produces_dwell_and_blink_clicks() {
    let config = AppConfig::default();
    let face = SyntheticFace::default();
    let mut tracker = GazeTracker::with_pupil_pipeline(&config);
    let t0 = Instant::now();
    let start = calibrate(&mut tracker, &face, t0);
    // Three full rows of cards: everything above y=600 belongs to a device.
    tracker.rebuild_aoi_grid(&["lamp", "fan", "tv", "heater", "blinds", "kettle", "radio", "door", "alarm"]);

    let results: Vec<_> = (0..100)
        .map(|i| {
            let (gaze, closed) = synthetic::scenario(i);
            tracker.update_at(&face.render(gaze, closed), t0 + FRAME * (start + i as u32))
        })
        .collect();

    // Two seconds of fixation fit at least two 0.8s dwells.
    let dwell_clicks = results[..40]
        .iter()
        .filter(|r| r.click_method == Some(ClickMethod::Dwell))
        .count();
    assert!(dwell_clicks >= 2, "only {} dwell clicks", dwell_clicks);

    assert!(results[40..50].iter().all(|r| r.is_blinking && !r.pupils_detected));
    let released = &results[50];
    assert_eq!(released.click_method, Some(ClickMethod::Blink));

    for r in results.iter().filter(|r| r.click_detected) {
        let device = r.clicked_device.as_ref().expect("fixation point lies inside the card grid");
        let hit = tracker.aois().iter().find(|a| a.device_id == device.device_id).unwrap();
        assert!(hit.contains(device.position.x, device.position.y));
    }
}

#[test]
fn calibration_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.gaze.calibration_file = dir.path().join("calibration_params.json");
    let face = SyntheticFace::default();

    let mut tracker = GazeTracker::with_pupil_pipeline(&config);
    calibrate(&mut tracker, &face, Instant::now());
    tracker.save_calibration(&config.gaze.calibration_file).unwrap();

    let mut restarted = GazeTracker::with_pupil_pipeline(&config);
    assert!(!restarted.is_calibrated());
    restarted.load_calibration(&config.gaze.calibration_file).unwrap();
    assert!(restarted.is_calibrated());
    assert_eq!(restarted.calibrator().affine(), tracker.calibrator().affine());

    config.gaze.screen_width = 1280;
    let mut other_screen = GazeTracker::with_pupil_pipeline(&config);
    assert!(other_screen.load_calibration(&config.gaze.calibration_file).is_err());
    assert!(!other_screen.is_calibrated());
}
