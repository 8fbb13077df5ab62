//! Configuration initialization and hierarchy management

use std::path::{Path, PathBuf};

use crate::adapters::toml_config::{AppConfig, TranscoderMode, DEFAULT_CONFIG_FILE};
use crate::cli::Cli;
use crate::error::{DiaryCutError, DiaryCutResult};

/// Build configuration following precedence: CLI > Env > File > Defaults
pub fn resolve_configuration(cli: &Cli) -> DiaryCutResult<AppConfig> {
    let mut config = load_config_file(cli.config.as_deref())?;
    apply_environment_overrides(&mut config, |name| std::env::var(name).ok())?;
    apply_cli_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

/// Load the explicit config file, else `diarycut.toml` when present, else defaults
fn load_config_file(explicit: Option<&Path>) -> DiaryCutResult<AppConfig> {
    match explicit {
        Some(path) => AppConfig::load(path),
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.exists() {
                AppConfig::load(fallback)
            } else {
                Ok(AppConfig::default())
            }
        }
    }
}

/// Apply `DIARYCUT_*` variables; `lookup` abstracts the process environment
pub fn apply_environment_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> DiaryCutResult<()> {
    if let Some(dir) = lookup("DIARYCUT_CACHE_DIR") {
        config.cache.dir = PathBuf::from(dir);
    }
    if let Some(bytes) = lookup("DIARYCUT_MAX_CACHE_BYTES") {
        config.cache.max_size_bytes = bytes.trim().parse().map_err(|_| DiaryCutError::InvalidConfig {
            message: format!("DIARYCUT_MAX_CACHE_BYTES must be a byte count, got {}", bytes),
        })?;
    }
    if let Some(mode) = lookup("DIARYCUT_TRANSCODER_MODE") {
        config.transcoder.mode = TranscoderMode::parse(&mode)?;
    }
    if let Some(path) = lookup("DIARYCUT_FFMPEG_PATH") {
        config.transcoder.ffmpeg_path = PathBuf::from(path);
    }
    if let Some(path) = lookup("DIARYCUT_FFPROBE_PATH") {
        config.transcoder.ffprobe_path = PathBuf::from(path);
    }
    if let Some(level) = lookup("DIARYCUT_LOG_LEVEL") {
        config.logging.level = level;
    }
    Ok(())
}

/// Apply global CLI flags
pub fn apply_cli_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(dir) = &cli.cache_dir {
        config.cache.dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    if cli.passthrough {
        config.transcoder.mode = TranscoderMode::Passthrough;
    }
}
