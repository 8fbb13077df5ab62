//! Command-line argument definitions

use clap::Args;
use std::path::PathBuf;

/// Diary record options shared by crop and trim
#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    /// Save the result as a diary record with this name
    #[arg(long)]
    pub save_as: Option<String>,

    /// Description stored with the record
    #[arg(long, default_value = "")]
    pub description: String,
}

/// Arguments for the crop command
#[derive(Args, Debug)]
pub struct CropArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Left edge of the region
    #[arg(short)]
    pub x: f64,

    /// Top edge of the region
    #[arg(short)]
    pub y: f64,

    /// Region width
    #[arg(long)]
    pub width: f64,

    /// Region height
    #[arg(long)]
    pub height: f64,

    /// Width of the display surface the region was drawn on; coordinates
    /// are in source pixels when omitted
    #[arg(long, requires = "surface_height")]
    pub surface_width: Option<f64>,

    /// Height of the display surface the region was drawn on
    #[arg(long, requires = "surface_width")]
    pub surface_height: Option<f64>,

    #[command(flatten)]
    pub record: RecordArgs,
}

/// Arguments for the trim command
#[derive(Args, Debug)]
pub struct TrimArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Start time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub start: String,

    /// End time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub end: String,

    #[command(flatten)]
    pub record: RecordArgs,
}

/// Arguments for the thumbnail command
#[derive(Args, Debug)]
pub struct ThumbnailArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Frame time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(long, default_value = "0")]
    pub at: String,
}

/// Arguments for the compress command
#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Quality preset: high, medium or low
    #[arg(short, long, default_value = "medium")]
    pub quality: String,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,
}
