use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod args;

use args::{Args, CalibrationCommand, Command, SessionArgs};
use gaze_home::calibration::{GazeCalibrator, TARGET_POSITIONS};
use gaze_home::synthetic::{self, SyntheticFace};
use gaze_home::types::{FaceLandmarks, FrameInput, FrameResult, GazeSample};
use gaze_home::{AppConfig, GazeTracker};

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the per-frame JSON.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "gaze_home=info".into()))
        .init();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;

    match args.command {
        Command::Simulate { frames, calibrate, session } => simulate(&config, frames, calibrate, &session),
        Command::Replay { dir, session } => replay(&config, &dir, &session),
        Command::Calibration { action: CalibrationCommand::Inspect { file } } => {
            inspect(&config, file.as_deref().unwrap_or(&config.gaze.calibration_file))
        }
    }
}

// =========================================================================
// Session plumbing
// =========================================================================

fn build_tracker(config: &AppConfig, session: &SessionArgs) -> GazeTracker {
    let mut tracker = GazeTracker::with_pupil_pipeline(config);
    if let Some(mode) = session.mode {
        tracker.set_click_mode(mode);
    }
    tracker.set_click_callback(|click| {
        eprintln!(
            "{}",
            format!(
                "Click: {} -> {} at {} ({})",
                click.device_id,
                click.action,
                click.position,
                click.method.as_str()
            )
            .green()
        );
    });
    tracker
}

fn load_saved_calibration(tracker: &mut GazeTracker, path: &Path) {
    match tracker.load_calibration(path) {
        Ok(()) => info!("Using calibration from {}", path.display()),
        Err(e) => warn!("Running uncalibrated: {}", e),
    }
}

fn emit(result: &FrameResult) -> Result<()> {
    println!("{}", serde_json::to_string(result)?);
    Ok(())
}

#[derive(Default)]
struct SessionStats {
    frames: usize,
    gaze_frames: usize,
    blink_frames: usize,
    clicks: usize,
    device_clicks: usize,
}

impl SessionStats {
    fn record(&mut self, result: &FrameResult) {
        self.frames += 1;
        self.gaze_frames += result.pupils_detected as usize;
        self.blink_frames += result.is_blinking as usize;
        self.clicks += result.click_detected as usize;
        self.device_clicks += result.clicked_device.is_some() as usize;
    }

    fn print(&self, tracker: &GazeTracker) {
        let pct = |n: usize| if self.frames == 0 { 0.0 } else { 100.0 * n as f64 / self.frames as f64 };
        eprintln!("{}", "--------------------------------------------------".dimmed());
        eprintln!("Session finished {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        eprintln!("Estimator:   {}", tracker.estimator_name());
        eprintln!("Click mode:  {}", tracker.click_mode());
        eprintln!("Dwell time:  {:.2}s", tracker.dwell_time().as_secs_f64());
        eprintln!(
            "Calibrated:  {}",
            if tracker.is_calibrated() { "yes".green() } else { "no".yellow() }
        );
        eprintln!("Frames:      {}", self.frames);
        eprintln!("Gaze found:  {} ({:.1}%)", self.gaze_frames, pct(self.gaze_frames));
        eprintln!("Blinking:    {} ({:.1}%)", self.blink_frames, pct(self.blink_frames));
        eprintln!("Clicks:      {} ({} on devices)", self.clicks.to_string().bold(), self.device_clicks);
    }
}

// =========================================================================
// simulate
// =========================================================================

fn simulate(config: &AppConfig, frames: usize, calibrate: bool, session: &SessionArgs) -> Result<()> {
    let face = SyntheticFace::default();
    let mut tracker = build_tracker(config, session);
    let mut clock = Clock::new(session.interval_ms);

    if calibrate {
        run_calibration(&mut tracker, &face, &mut clock)?;
        tracker
            .save_calibration(&config.gaze.calibration_file)
            .with_context(|| format!("saving {}", config.gaze.calibration_file.display()))?;
    } else {
        load_saved_calibration(&mut tracker, &config.gaze.calibration_file);
    }

    // Cards go up after calibration so the steady target stares cannot click them.
    tracker.rebuild_aoi_grid(session.aoi_devices.as_slice());

    let mut stats = SessionStats::default();
    for i in 0..frames {
        let (gaze, closed) = synthetic::scenario(i);
        let result = tracker.update_at(&face.render(gaze, closed), clock.tick());
        stats.record(&result);
        emit(&result)?;
    }
    stats.print(&tracker);
    Ok(())
}

/// Look at each target until it holds enough samples, then move on.
fn run_calibration(tracker: &mut GazeTracker, face: &SyntheticFace, clock: &mut Clock) -> Result<()> {
    tracker.start_calibration();
    let required = tracker.calibration_progress().required_samples;

    for (i, &(x, y)) in TARGET_POSITIONS.iter().enumerate() {
        let frame = face.render(GazeSample::new(x, y), false);
        let mut attempts = 0;
        loop {
            tracker.update_at(&frame, clock.tick());
            if tracker.add_calibration_sample() {
                break;
            }
            attempts += 1;
            if attempts > required * 4 {
                bail!("calibration target {} never produced enough gaze samples", i);
            }
        }
        let progress = tracker.calibration_progress();
        eprintln!(
            "{}",
            format!(
                "Target {}/{} at {}: {} samples",
                i + 1,
                progress.total_targets,
                progress.target_position,
                progress.current_samples
            )
            .cyan()
        );
        tracker.next_calibration_target()?;
    }

    if !tracker.is_calibrated() {
        bail!("calibration did not complete");
    }
    eprintln!("{}", "Calibration complete".green().bold());
    Ok(())
}

/// Frame timestamps at a fixed cadence, independent of how fast we render.
struct Clock {
    start: Instant,
    interval: Duration,
    frame: u32,
}

impl Clock {
    fn new(interval_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            interval: Duration::from_millis(interval_ms),
            frame: 0,
        }
    }

    fn tick(&mut self) -> Instant {
        let now = self.start + self.interval * self.frame;
        self.frame += 1;
        now
    }
}

// =========================================================================
// replay
// =========================================================================

fn replay(config: &AppConfig, dir: &Path, session: &SessionArgs) -> Result<()> {
    let mut frames: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_frame_image(p))
        .collect();
    frames.sort();
    if frames.is_empty() {
        bail!("no frame_*.png files in {}", dir.display());
    }
    info!("Replaying {} frames from {}", frames.len(), dir.display());

    let mut tracker = build_tracker(config, session);
    load_saved_calibration(&mut tracker, &config.gaze.calibration_file);
    tracker.rebuild_aoi_grid(session.aoi_devices.as_slice());

    let mut clock = Clock::new(session.interval_ms);
    let mut stats = SessionStats::default();
    for path in &frames {
        let now = clock.tick();
        let input = match load_frame(path) {
            Ok(input) => input,
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        let result = tracker.update_at(&input, now);
        stats.record(&result);
        emit(&result)?;
    }
    stats.print(&tracker);
    Ok(())
}

fn is_frame_image(path: &Path) -> bool {
    let stem_ok = path
        .file_stem()
        .map_or(false, |s| s.to_string_lossy().starts_with("frame_"));
    stem_ok && path.extension().map_or(false, |e| e == "png")
}

/// Grayscale frame plus its sidecar landmarks. A missing sidecar or a `null`
/// one means no face was found in that frame.
fn load_frame(path: &Path) -> Result<FrameInput> {
    let frame = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_luma8();

    let sidecar = path.with_extension("json");
    let face = if sidecar.exists() {
        let content = fs::read_to_string(&sidecar)?;
        serde_json::from_str::<Option<FaceLandmarks>>(&content)
            .with_context(|| format!("parsing landmarks {}", sidecar.display()))?
    } else {
        None
    };
    Ok(FrameInput { frame, face })
}

// =========================================================================
// calibration inspect
// =========================================================================

fn inspect(config: &AppConfig, path: &Path) -> Result<()> {
    let mut calibrator = GazeCalibrator::with_config(&config.gaze, &config.calibration);
    calibrator
        .load(path)
        .with_context(|| format!("loading calibration {}", path.display()))?;
    let Some(affine) = calibrator.affine().copied() else {
        bail!("{} holds no calibration", path.display());
    };

    println!("{}", format!("Calibration: {}", path.display()).bold());
    println!("Screen:      {}x{}", calibrator.screen_width, calibrator.screen_height);
    println!("Matrix:      [{:>9.4} {:>9.4}]", affine.matrix[0][0], affine.matrix[0][1]);
    println!("             [{:>9.4} {:>9.4}]", affine.matrix[1][0], affine.matrix[1][1]);
    println!("Translation: [{:>9.4} {:>9.4}]", affine.translation[0], affine.translation[1]);
    println!("{}", "--------------------------------------------------".dimmed());

    for (i, &(x, y)) in TARGET_POSITIONS.iter().enumerate() {
        let pixel = calibrator.to_screen(x, y);
        match affine.invert(x, y) {
            Some((h, v)) => println!("Target {} at {:<12} <- gaze ({:.3}, {:.3})", i, pixel.to_string(), h, v),
            None => println!("Target {} at {:<12} <- {}", i, pixel.to_string(), "singular transform".red()),
        }
    }
    Ok(())
}
