use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use gaze_home::types::ClickMode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, default_value = "config.json", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive the tracker with synthetic eyes and print one JSON result per frame
    Simulate {
        /// Number of frames to generate
        #[arg(short, long, default_value_t = 300)]
        frames: usize,

        /// Run a scripted five-point calibration first and save it
        #[arg(long)]
        calibrate: bool,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Replay recorded frames (frame_*.png with frame_*.json landmarks)
    Replay {
        /// Directory holding the recording
        dir: PathBuf,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Calibration file utilities
    Calibration {
        #[command(subcommand)]
        action: CalibrationCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CalibrationCommand {
    /// Show the stored transform and where each target lands
    Inspect {
        /// Calibration file (defaults to the configured one)
        file: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug)]
pub struct SessionArgs {
    /// Click mode override (dwell, blink, both)
    #[arg(long)]
    pub mode: Option<ClickMode>,

    /// Devices laid out as AOI cards, comma separated
    #[arg(long, value_delimiter = ',', default_value = "lamp,fan,tv,heater")]
    pub aoi_devices: Vec<String>,

    /// Milliseconds between frames
    #[arg(long, default_value_t = 50)]
    pub interval_ms: u64,
}
