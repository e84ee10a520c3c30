use anyhow::{bail, Context, Result};
use chrono::prelude::*;
use clap::Parser;
use colored::*;
use gaze_home::config::AppConfig;
use gaze_home::calibration::GazeCalibrator;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Measure how well a saved calibration maps labelled gaze samples onto
/// their screen targets.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Calibration file to evaluate
    calibration: PathBuf,

    /// JSON list of {h, v, target_x, target_y} points (targets in pixels)
    points: PathBuf,

    /// Configuration file providing the screen size
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Write a detailed JSON report here
    #[arg(long)]
    report: Option<PathBuf>,
}

// =========================================================================
// Data Structures
// =========================================================================

#[derive(Debug, Deserialize)]
struct DataPoint {
    h: f64,
    v: f64,
    target_x: f64,
    target_y: f64,
}

#[derive(Serialize)]
struct HistogramBin {
    range: &'static str,
    count: usize,
}

#[derive(Serialize)]
struct ReportSummary {
    mean_error: f64,
    std_dev: f64,
    max_error: f64,
    histogram: Vec<HistogramBin>,
}

#[derive(Serialize)]
struct ReportEntry {
    h: f64,
    v: f64,
    target_x: f64,
    target_y: f64,
    calibrated_x: i32,
    calibrated_y: i32,
    delta_pixels: f64,
    error_percent: f64,
}

#[derive(Serialize)]
struct DetailedReport {
    timestamp: String,
    calibration: String,
    screen_width: u32,
    screen_height: u32,
    summary: ReportSummary,
    entries: Vec<ReportEntry>,
}

const BUCKETS: [(f64, &str); 5] = [
    (50.0, "0-50px"),
    (100.0, "50-100px"),
    (200.0, "100-200px"),
    (500.0, "200-500px"),
    (f64::INFINITY, "500px+"),
];

fn evaluate(calibrator: &GazeCalibrator, points: &[DataPoint]) -> (ReportSummary, Vec<ReportEntry>) {
    let diag = (calibrator.screen_width as f64).hypot(calibrator.screen_height as f64);
    let mut hist_counts = [0usize; BUCKETS.len()];
    let mut entries = Vec::with_capacity(points.len());

    for p in points {
        let (x, y) = calibrator.apply(p.h, p.v);
        let screen = calibrator.to_screen(x, y);
        let delta = (screen.x as f64 - p.target_x).hypot(screen.y as f64 - p.target_y);

        let bucket = BUCKETS.iter().position(|(upper, _)| delta < *upper).unwrap_or(BUCKETS.len() - 1);
        hist_counts[bucket] += 1;

        entries.push(ReportEntry {
            h: p.h,
            v: p.v,
            target_x: p.target_x,
            target_y: p.target_y,
            calibrated_x: screen.x,
            calibrated_y: screen.y,
            delta_pixels: delta,
            error_percent: delta / diag * 100.0,
        });
    }

    let n = entries.len() as f64;
    let mean_error = entries.iter().map(|e| e.delta_pixels).sum::<f64>() / n;
    let variance = entries.iter().map(|e| (e.delta_pixels - mean_error).powi(2)).sum::<f64>() / n;
    let max_error = entries.iter().map(|e| e.delta_pixels).fold(0.0, f64::max);

    let histogram = BUCKETS
        .iter()
        .zip(hist_counts)
        .map(|(&(_, range), count)| HistogramBin { range, count })
        .collect();

    (
        ReportSummary { mean_error, std_dev: variance.sqrt(), max_error, histogram },
        entries,
    )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "gaze_home=warn".into()))
        .init();
    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    let mut calibrator = GazeCalibrator::with_config(&config.gaze, &config.calibration);
    calibrator
        .load(&args.calibration)
        .with_context(|| format!("loading calibration {}", args.calibration.display()))?;

    let file = File::open(&args.points).with_context(|| format!("opening {}", args.points.display()))?;
    let points: Vec<DataPoint> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", args.points.display()))?;
    if points.is_empty() {
        bail!("{} contains no points", args.points.display());
    }

    println!("Analyzing {} points against {}", points.len(), args.calibration.display());
    let (summary, entries) = evaluate(&calibrator, &points);

    println!("--------------------------------------------------");
    let mean = format!("{:.1}px", summary.mean_error);
    let mean = match summary.mean_error {
        e if e < 50.0 => mean.green(),
        e if e < 150.0 => mean.yellow(),
        _ => mean.red(),
    };
    println!("Mean Error: {}", mean);
    println!("Std Dev:    {:.1}px", summary.std_dev);
    println!("Max Error:  {:.1}px", summary.max_error);
    println!("--------------------------------------------------");
    let widest = summary.histogram.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    for bin in &summary.histogram {
        let bar = "#".repeat(bin.count * 40 / widest);
        println!("{:>10} | {:<40} {}", bin.range, bar, bin.count);
    }

    if let Some(path) = &args.report {
        let report = DetailedReport {
            timestamp: Local::now().to_rfc3339(),
            calibration: args.calibration.display().to_string(),
            screen_width: calibrator.screen_width,
            screen_height: calibrator.screen_height,
            summary,
            entries,
        };
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Report saved to {}", path.display());
    }

    Ok(())
}
