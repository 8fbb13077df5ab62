//! DiaryCut CLI
//!
//! Crops, trims, compresses and thumbnails video diary clips. Results are
//! cached by (source, operation), so repeating a request is instant.
//!
//! # Usage
//!
//! ```bash
//! diarycut crop --input diary.mp4 -x 100 -y 50 --width 300 --height 300
//! diarycut trim --input diary.mp4 --start 00:00:02 --end 00:00:09 --save-as "Morning walk"
//! diarycut cache size
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;

use diarycut::adapters::init_tracing;
use diarycut::app::DefaultAppContainer;
use diarycut::cli::{commands, CacheCommands, Cli, Commands};
use diarycut::config_initialization::resolve_configuration;

/// Main entry point for the DiaryCut CLI application
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_configuration(&cli)?;
    init_tracing(&config.logging);

    info!("Starting DiaryCut");
    let container = DefaultAppContainer::new(&config).await?;

    match cli.command {
        Commands::Crop(args) => commands::crop(&container, args).await?,
        Commands::Trim(args) => commands::trim(&container, args).await?,
        Commands::Thumbnail(args) => commands::thumbnail(&container, args).await?,
        Commands::Compress(args) => commands::compress(&container, args).await?,
        Commands::Probe(args) => commands::probe(&container, args).await?,
        Commands::Cache(CacheCommands::Size) => commands::cache_size(&container).await?,
        Commands::Cache(CacheCommands::Clear) => commands::cache_clear(&container).await?,
    }

    info!("DiaryCut completed successfully");
    Ok(())
}
