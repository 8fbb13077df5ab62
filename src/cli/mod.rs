//! CLI module for DiaryCut
//!
//! This module handles command-line argument parsing and command execution.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod args;
pub mod commands;

/// DiaryCut video diary processor
///
/// Crops, trims, compresses and thumbnails video diary clips through a
/// size-bounded cache, so repeating a request never re-encodes.
#[derive(Parser, Debug)]
#[command(name = "diarycut")]
#[command(about = "DiaryCut - cached crop, trim and compress for video diary clips")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./diarycut.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding derived files and the cache index
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Logging level or filter directive
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Skip ffmpeg and return sources unchanged
    #[arg(long, global = true)]
    pub passthrough: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crop a rectangular region out of a video
    Crop(args::CropArgs),
    /// Cut a time range out of a video
    Trim(args::TrimArgs),
    /// Extract a single frame as JPEG
    Thumbnail(args::ThumbnailArgs),
    /// Re-encode a video at a quality preset
    Compress(args::CompressArgs),
    /// Print width, height and duration of a video
    Probe(args::ProbeArgs),
    /// Inspect or reset the derived-file cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Bytes used by cached files
    Size,
    /// Delete every cached file
    Clear,
}
