use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vid2bnd::engine::{DitherAlgorithm, Rational, Scale};

#[derive(Parser)]
#[command(name = "vid2bnd")]
#[command(about = "Convert videos into 1-bit playback bundles", long_about = None)]
pub struct Cli {
    /// Source video file (must contain exactly one video and one audio stream)
    #[arg(value_name = "SOURCE")]
    pub source: Option<PathBuf>,

    /// Output bundle path
    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Dithering algorithm for the black/white conversion (overrides config)
    #[arg(long, value_enum, conflicts_with = "threshold")]
    pub dither: Option<DitherAlgorithm>,

    /// Luma cutoff 0-255: pixels at or above become white (disables dithering)
    #[arg(long, conflicts_with = "dither")]
    pub threshold: Option<u8>,

    /// Output frame rate, integer or fraction like 30000/1001 (defaults to source rate)
    #[arg(long)]
    pub frame_rate: Option<Rational>,

    /// Output geometry as WIDTHxHEIGHT, at most 128x64 (defaults to best fit)
    #[arg(long)]
    pub scale: Option<Scale>,

    /// Audio sample rate in Hz (defaults to source rate)
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Print the ffmpeg commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress the parameter summary and progress bar
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Probe a video file and show the stream properties that drive encoding
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Show the header of an existing bundle
    Inspect {
        /// Path to the bundle file
        bundle: PathBuf,
    },

    /// Download a video with yt-dlp for later encoding
    Fetch {
        /// Video page URL
        url: String,

        /// Where to write the video (defaults to vid.mp4)
        output: Option<PathBuf>,

        /// Re-encode the audio at triple volume after downloading
        #[arg(long)]
        boost_volume: bool,

        /// Keep the pre-boost download next to the boosted file
        #[arg(long)]
        keep_intermediate: bool,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
