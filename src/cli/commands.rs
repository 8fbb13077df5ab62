//! Command implementations

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::app::{AppContainer, SessionHandle, VideoProcessingService};
use crate::cli::args::{CompressArgs, CropArgs, ProbeArgs, RecordArgs, ThumbnailArgs, TrimArgs};
use crate::domain::errors::DomainError;
use crate::domain::model::*;
use crate::engine::session::CommitOutcome;
use crate::ports::RecordStorePort;

#[derive(Serialize)]
struct ResultReport<'a> {
    #[serde(flatten)]
    result: &'a ProcessingResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<CropRegion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<RecordId>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn to_pixels(value: f64, name: &str) -> Result<u32, DomainError> {
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
        return Err(DomainError::InvalidParameters(format!(
            "{} must be a non-negative pixel count, got {}",
            name, value
        )));
    }
    Ok(value.round() as u32)
}

/// Commit the session, cancelling it on Ctrl-C
async fn commit_interruptible(service: &VideoProcessingService, handle: SessionHandle) -> Result<ProcessingResult> {
    let commit = service.commit(handle);
    tokio::pin!(commit);

    let outcome = tokio::select! {
        outcome = &mut commit => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling");
            service.cancel(handle)?;
            commit.await
        }
    };
    match outcome? {
        CommitOutcome::Completed(result) => Ok(result),
        CommitOutcome::Cancelled => Err(anyhow::anyhow!("Operation cancelled")),
    }
}

async fn save_record(
    container: &dyn AppContainer,
    record: &RecordArgs,
    result: &ProcessingResult,
) -> Result<Option<RecordId>> {
    let Some(name) = &record.save_as else {
        return Ok(None);
    };
    let id = container
        .records()
        .save_record(NewRecord::from_result(name, &record.description, result))
        .await
        .context("Failed to save diary record")?;
    Ok(Some(id))
}

/// Execute the crop command through an edit session
pub async fn crop(container: &dyn AppContainer, args: CropArgs) -> Result<()> {
    info!("Cropping {}", args.input.display());
    let service = container.service();
    let handle = service.open_session(&args.input, EditMode::Region).await?;

    let outcome = async {
        let region = match (args.surface_width, args.surface_height) {
            (Some(width), Some(height)) => service.update_region_from_display(
                handle,
                DisplayRegion {
                    x: args.x,
                    y: args.y,
                    width: args.width,
                    height: args.height,
                },
                DisplaySize { width, height },
            )?,
            _ => service.update_region(
                handle,
                CropRegion::new(
                    to_pixels(args.x, "x")?,
                    to_pixels(args.y, "y")?,
                    to_pixels(args.width, "width")?,
                    to_pixels(args.height, "height")?,
                ),
            )?,
        };
        info!("Region: {}", region);
        let result = commit_interruptible(&service, handle).await?;
        Ok::<_, anyhow::Error>((region, result))
    }
    .await;
    service.close_session(handle).await?;

    let (region, result) = outcome?;
    let record_id = save_record(container, &args.record, &result).await?;
    print_json(&ResultReport {
        result: &result,
        region: Some(region),
        range: None,
        record_id,
    })
}

/// Execute the trim command through an edit session
pub async fn trim(container: &dyn AppContainer, args: TrimArgs) -> Result<()> {
    let start = TimeSpec::parse(&args.start)
        .map_err(|e| anyhow::anyhow!("Invalid start time '{}': {}", args.start, e))?;
    let end = TimeSpec::parse(&args.end)
        .map_err(|e| anyhow::anyhow!("Invalid end time '{}': {}", args.end, e))?;
    if start.seconds >= end.seconds {
        return Err(anyhow::anyhow!("Start time must be before end time"));
    }
    info!("Trimming {} from {} to {}", args.input.display(), start, end);

    let service = container.service();
    let handle = service.open_session(&args.input, EditMode::TimeRange).await?;

    let outcome = async {
        let range = service.update_time_range(handle, start.seconds, end.seconds)?;
        if (range.start - start.seconds).abs() > 1e-3 || (range.end - end.seconds).abs() > 1e-3 {
            warn!("Requested range adjusted to {}", range);
        }
        let result = commit_interruptible(&service, handle).await?;
        Ok::<_, anyhow::Error>((range, result))
    }
    .await;
    service.close_session(handle).await?;

    let (range, result) = outcome?;
    let record_id = save_record(container, &args.record, &result).await?;
    print_json(&ResultReport {
        result: &result,
        region: None,
        range: Some(range),
        record_id,
    })
}

/// Execute the thumbnail command
pub async fn thumbnail(container: &dyn AppContainer, args: ThumbnailArgs) -> Result<()> {
    let at = TimeSpec::parse(&args.at)
        .map_err(|e| anyhow::anyhow!("Invalid time '{}': {}", args.at, e))?;
    run_operation(
        container,
        &args.input,
        Operation::ExtractThumbnail { at_seconds: at.seconds },
    )
    .await
}

/// Execute the compress command
pub async fn compress(container: &dyn AppContainer, args: CompressArgs) -> Result<()> {
    let quality = CompressQuality::parse(&args.quality)?;
    run_operation(container, &args.input, Operation::Compress { quality }).await
}

async fn run_operation(container: &dyn AppContainer, input: &Path, operation: Operation) -> Result<()> {
    info!("Running {} on {}", operation.tag(), input.display());
    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let result = container
        .service()
        .transcode_with_cancel(input, operation, &cancel)
        .await;
    interrupt.abort();

    let result = result?;
    print_json(&ResultReport {
        result: &result,
        region: None,
        range: None,
        record_id: None,
    })
}

/// Execute the probe command
pub async fn probe(container: &dyn AppContainer, args: ProbeArgs) -> Result<()> {
    let media = container
        .service()
        .probe(&args.input)
        .await
        .with_context(|| format!("Failed to probe {}", args.input.display()))?;
    print_json(&media)
}

/// Execute `cache size`
pub async fn cache_size(container: &dyn AppContainer) -> Result<()> {
    let bytes = container.service().cache_size_bytes().await;
    print_json(&serde_json::json!({ "size_bytes": bytes }))
}

/// Execute `cache clear`
pub async fn cache_clear(container: &dyn AppContainer) -> Result<()> {
    let removed = container.service().clear_cache().await?;
    print_json(&serde_json::json!({ "removed_entries": removed }))
}
