//! End-to-end tests of the processing service with fake transcoder and probe

mod common;

use std::sync::Arc;
use tempfile::TempDir;

use common::*;
use diarycut::adapters::toml_config::TranscoderMode;
use diarycut::app::AppContainer;
use diarycut::domain::errors::{DomainError, ErrorKind};
use diarycut::domain::model::*;
use diarycut::engine::{CommitOutcome, ProgressStatus, SessionState};
use diarycut::ports::RecordStorePort;

fn completed(outcome: CommitOutcome) -> ProcessingResult {
    match outcome {
        CommitOutcome::Completed(result) => result,
        CommitOutcome::Cancelled => panic!("commit was cancelled"),
    }
}

#[tokio::test]
async fn test_identical_crop_is_transcoded_once() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(1000);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");
    let region = CropRegion::new(100, 50, 300, 300);

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    service.update_region(handle, region).unwrap();
    let first = completed(service.commit(handle).await.unwrap());
    assert!(!first.from_cache);
    assert_eq!(first.duration_seconds, 12.4);
    let size_after_first = service.cache_size_bytes().await;
    assert_eq!(size_after_first, 1000);

    service.update_region(handle, region).unwrap();
    let second = completed(service.commit(handle).await.unwrap());
    assert!(second.from_cache);
    assert_eq!(second.output_path, first.output_path);

    assert_eq!(transcoder.calls(), 1);
    assert_eq!(service.cache_size_bytes().await, size_after_first);
    assert!(transcoder.commands()[0].to_string().contains("crop=300:300:100:50"));
}

#[tokio::test]
async fn test_separate_sessions_share_the_cache() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    for _ in 0..2 {
        let handle = service.open_session(&source, EditMode::TimeRange).await.unwrap();
        service.update_time_range(handle, 2.0, 9.0).unwrap();
        completed(service.commit(handle).await.unwrap());
        service.close_session(handle).await.unwrap();
    }
    assert_eq!(transcoder.calls(), 1);
    assert_eq!(service.session_count(), 0);
}

#[tokio::test]
async fn test_eviction_removes_as_many_oldest_entries_as_needed() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.cache.max_size_bytes = 1000;
    let transcoder = FakeTranscoder::new(400);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let mut outputs = Vec::new();
    for x in [0, 10, 20] {
        let result = service
            .transcode(&source, Operation::Crop(CropRegion::new(x, 0, 300, 300)))
            .await
            .unwrap();
        outputs.push(result.output_path);
    }

    assert_eq!(service.cache_size_bytes().await, 400);
    assert!(!outputs[0].exists());
    assert!(!outputs[1].exists());
    assert!(outputs[2].exists());

    // The surviving entry is still a hit
    service
        .transcode(&source, Operation::Crop(CropRegion::new(20, 0, 300, 300)))
        .await
        .unwrap();
    assert_eq!(transcoder.calls(), 3);
}

#[tokio::test]
async fn test_cancel_leaves_no_residue() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    transcoder.set_blocking(true);

    let committing = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.commit(handle).await })
    };
    transcoder.wait_started().await;
    assert_eq!(service.state(handle).unwrap(), SessionState::Processing);
    assert!(service.cancel(handle).unwrap());

    let outcome = committing.await.unwrap().unwrap();
    assert_eq!(outcome, CommitOutcome::Cancelled);
    assert_eq!(service.state(handle).unwrap(), SessionState::Cancelled);
    assert_eq!(service.progress(handle).unwrap().status, ProgressStatus::Idle);
    assert!(cache_files(&config).is_empty());
    assert_eq!(service.cache_size_bytes().await, 0);

    // Nothing was cached, so the retry transcodes again
    transcoder.set_blocking(false);
    let result = completed(service.commit(handle).await.unwrap());
    assert!(!result.from_cache);
    assert_eq!(transcoder.calls(), 2);
}

#[tokio::test]
async fn test_cancel_during_thumbnail_leaves_no_residue() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.session.generate_thumbnails = true;
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    transcoder.set_blocking_thumbnails(true);

    let committing = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.commit(handle).await })
    };
    transcoder.wait_started().await;
    assert_eq!(transcoder.calls(), 2);
    assert!(service.cancel(handle).unwrap());

    let outcome = committing.await.unwrap().unwrap();
    assert_eq!(outcome, CommitOutcome::Cancelled);
    assert_eq!(service.state(handle).unwrap(), SessionState::Cancelled);
    assert!(cache_files(&config).is_empty());
    assert_eq!(service.cache_size_bytes().await, 0);

    // The main output was dropped along with the thumbnail, so a retry transcodes both
    transcoder.set_blocking_thumbnails(false);
    let result = completed(service.commit(handle).await.unwrap());
    assert!(!result.from_cache);
    assert!(result.thumbnail_path.is_some());
    assert_eq!(transcoder.calls(), 4);
}

#[tokio::test]
async fn test_close_session_during_processing() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    transcoder.set_blocking(true);
    let committing = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.commit(handle).await })
    };
    transcoder.wait_started().await;

    service.close_session(handle).await.unwrap();

    assert_eq!(committing.await.unwrap().unwrap(), CommitOutcome::Cancelled);
    assert!(cache_files(&config).is_empty());
    let err = service.state(handle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownSession);
}

#[tokio::test]
async fn test_second_commit_while_processing_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    transcoder.set_blocking(true);
    let committing = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.commit(handle).await })
    };
    transcoder.wait_started().await;

    let err = service.commit(handle).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionBusy);

    service.cancel(handle).unwrap();
    assert_eq!(committing.await.unwrap().unwrap(), CommitOutcome::Cancelled);
    assert_eq!(transcoder.calls(), 1);
}

#[tokio::test]
async fn test_invalid_region_never_reaches_transcoder() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    let err = service
        .update_region(handle, CropRegion::new(0, 0, 50, 300))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);

    let err = service
        .transcode(&source, Operation::Crop(CropRegion::new(1800, 0, 300, 300)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    assert_eq!(transcoder.calls(), 0);
}

#[tokio::test]
async fn test_failed_commit_keeps_parameters_for_retry() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    let region = service
        .update_region(handle, CropRegion::new(100, 50, 300, 300))
        .unwrap();
    transcoder.fail_with(Some(DomainError::TranscodeFailed("exit status 1".to_string())));
    let mut states = service.subscribe_state(handle).unwrap();

    let err = service.commit(handle).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TranscodeFailed);
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), SessionState::Failed);
    assert_eq!(service.state(handle).unwrap(), SessionState::Failed);
    assert_eq!(service.region(handle).unwrap(), Some(region));
    let failure = service.last_failure(handle).unwrap().unwrap();
    assert_eq!(failure.kind, ErrorKind::TranscodeFailed);
    let progress = service.progress(handle).unwrap();
    assert_eq!(progress.status, ProgressStatus::Error);
    assert_eq!(progress.value, 0.0);
    assert!(cache_files(&config).is_empty());

    // Retrying straight from Failed is allowed
    transcoder.fail_with(None);
    completed(service.commit(handle).await.unwrap());
    assert!(service.last_failure(handle).unwrap().is_none());
    assert_eq!(service.state(handle).unwrap(), SessionState::Completed);
}

#[tokio::test]
async fn test_edit_after_failure_returns_to_ready() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    transcoder.fail_with(Some(DomainError::TranscodeFailed("exit status 1".to_string())));
    service.commit(handle).await.unwrap_err();
    assert_eq!(service.state(handle).unwrap(), SessionState::Failed);

    service
        .update_region(handle, CropRegion::new(0, 0, 400, 400))
        .unwrap();
    assert_eq!(service.state(handle).unwrap(), SessionState::Ready);
    assert!(service.last_failure(handle).unwrap().is_some());
}

#[tokio::test]
async fn test_stale_entry_is_reproduced() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");
    let operation = Operation::Compress { quality: CompressQuality::Low };

    let first = service.transcode(&source, operation).await.unwrap();
    std::fs::remove_file(&first.output_path).unwrap();

    let second = service.transcode(&source, operation).await.unwrap();
    assert!(!second.from_cache);
    assert!(second.output_path.exists());
    assert_eq!(transcoder.calls(), 2);
    assert_eq!(service.cache_size_bytes().await, 100);
}

#[tokio::test]
async fn test_commit_uses_last_update_before_settling() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    for x in [0, 40, 80, 120] {
        service
            .update_region(handle, CropRegion::new(x, 0, 300, 300))
            .unwrap();
    }
    completed(service.commit(handle).await.unwrap());

    let commands = transcoder.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].to_string().contains("crop=300:300:120:0"));
}

#[tokio::test]
async fn test_display_region_is_scaled_to_source() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    let region = service
        .update_region_from_display(
            handle,
            DisplayRegion {
                x: 50.0,
                y: 25.0,
                width: 150.0,
                height: 150.0,
            },
            DisplaySize {
                width: 960.0,
                height: 540.0,
            },
        )
        .unwrap();
    assert_eq!(region, CropRegion::new(100, 50, 300, 300));
}

#[tokio::test]
async fn test_time_range_adjusts_to_minimum_segment() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::TimeRange).await.unwrap();
    let range = service.update_time_range(handle, 3.0, 5.0).unwrap();
    assert_eq!(range, TimeRange { start: 3.0, end: 8.0 });

    let result = completed(service.commit(handle).await.unwrap());
    assert_eq!(result.duration_seconds, 5.0);
    let line = transcoder.commands()[0].to_string();
    assert!(line.contains("-ss 00:00:03.000"));
    assert!(line.contains("-t 5.000"));
}

#[tokio::test]
async fn test_progress_subscription_reports_success() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    let progress = service.subscribe_progress(handle).unwrap();
    assert_eq!(progress.borrow().status, ProgressStatus::Idle);

    completed(service.commit(handle).await.unwrap());
    let snapshot = *progress.borrow();
    assert_eq!(snapshot.status, ProgressStatus::Success);
    assert_eq!(snapshot.value, 1.0);
}

#[tokio::test]
async fn test_thumbnail_is_cached_with_the_output() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.session.generate_thumbnails = true;
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    let first = completed(service.commit(handle).await.unwrap());
    let thumbnail = first.thumbnail_path.clone().unwrap();
    assert!(thumbnail.exists());
    assert_eq!(thumbnail.extension().unwrap(), "jpg");
    assert_eq!(transcoder.calls(), 2);

    let second = completed(service.commit(handle).await.unwrap());
    assert_eq!(second.thumbnail_path, Some(thumbnail));
    assert_eq!(transcoder.calls(), 2);
}

#[tokio::test]
async fn test_passthrough_returns_source_without_caching() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.transcoder.mode = TranscoderMode::Passthrough;
    config.transcoder.passthrough_delay_ms = 10;
    let transcoder = FakeTranscoder::new(100);
    let container = container(&config, transcoder.clone(), FakeProbe::new(1920, 1080, 12.4)).await;
    assert!(container.capability().is_passthrough());
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let handle = service.open_session(&source, EditMode::Region).await.unwrap();
    let result = completed(service.commit(handle).await.unwrap());
    assert_eq!(result.output_path, source);
    assert_eq!(service.cache_size_bytes().await, 0);
    assert_eq!(transcoder.calls(), 0);
}

#[tokio::test]
async fn test_missing_source_fails_to_open() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let container = container(&config, FakeTranscoder::new(100), FakeProbe::new(1920, 1080, 12.4)).await;

    let err = container
        .service()
        .open_session(dir.path().join("missing.mp4"), EditMode::Region)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
}

#[tokio::test]
async fn test_result_can_be_saved_as_record() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let container = container(&config, FakeTranscoder::new(100), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    let result = service
        .transcode(&source, Operation::Trim(TimeRange::new(0.0, 6.0).unwrap()))
        .await
        .unwrap();
    let id = container
        .records()
        .save_record(NewRecord::from_result("Morning", "walk", &result))
        .await
        .unwrap();

    let saved = std::fs::read_to_string(config.records_path()).unwrap();
    assert!(saved.contains(&id.to_string()));
    assert!(saved.contains("\"duration_seconds\":6.0"));
}

#[tokio::test]
async fn test_clear_cache_empties_directory() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let container = container(&config, FakeTranscoder::new(100), FakeProbe::new(1920, 1080, 12.4)).await;
    let service = container.service();
    let source = write_source(dir.path(), "diary.mp4");

    service
        .transcode(&source, Operation::Compress { quality: CompressQuality::High })
        .await
        .unwrap();
    assert_eq!(cache_files(&config).len(), 1);

    assert_eq!(service.clear_cache().await.unwrap(), 1);
    assert!(cache_files(&config).is_empty());
    assert_eq!(service.cache_size_bytes().await, 0);
    assert!(source.exists());
}
