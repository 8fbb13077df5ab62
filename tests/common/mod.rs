#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use diarycut::adapters::toml_config::{AppConfig, TranscoderMode};
use diarycut::adapters::{JsonlRecordStore, LocalFsAdapter};
use diarycut::app::{DefaultAppContainer, Ports};
use diarycut::domain::errors::DomainError;
use diarycut::domain::model::MediaInfo;
use diarycut::ports::{ProbePort, TranscodeCommand, TranscoderPort};

/// Transcoder double that writes a fixed-size output and records every command
pub struct FakeTranscoder {
    output_bytes: usize,
    calls: AtomicUsize,
    block_until_cancelled: AtomicBool,
    block_thumbnails: AtomicBool,
    failure: Mutex<Option<DomainError>>,
    commands: Mutex<Vec<TranscodeCommand>>,
    started: Notify,
}

impl FakeTranscoder {
    pub fn new(output_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            output_bytes,
            calls: AtomicUsize::new(0),
            block_until_cancelled: AtomicBool::new(false),
            block_thumbnails: AtomicBool::new(false),
            failure: Mutex::new(None),
            commands: Mutex::new(Vec::new()),
            started: Notify::new(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_blocking(&self, blocking: bool) {
        self.block_until_cancelled.store(blocking, Ordering::SeqCst);
    }

    /// Block only thumbnail extractions, letting the main output through
    pub fn set_blocking_thumbnails(&self, blocking: bool) {
        self.block_thumbnails.store(blocking, Ordering::SeqCst);
    }

    pub fn fail_with(&self, error: Option<DomainError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn commands(&self) -> Vec<TranscodeCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Wait until a blocking run has started (and written its partial output)
    pub async fn wait_started(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.started.notified())
            .await
            .expect("transcoder never started");
    }
}

#[async_trait]
impl TranscoderPort for FakeTranscoder {
    async fn run(&self, command: &TranscodeCommand, cancel: &CancellationToken) -> Result<(), DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.commands.lock().unwrap().push(command.clone());

        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        let is_thumbnail = command.output.extension().map(|e| e == "jpg").unwrap_or(false);
        if self.block_until_cancelled.load(Ordering::SeqCst)
            || (is_thumbnail && self.block_thumbnails.load(Ordering::SeqCst))
        {
            std::fs::write(&command.output, b"partial").unwrap();
            self.started.notify_one();
            cancel.cancelled().await;
            return Err(DomainError::Cancelled);
        }
        std::fs::write(&command.output, vec![7u8; self.output_bytes]).unwrap();
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Probe double reporting the same media info for every existing file
pub struct FakeProbe {
    media: MediaInfo,
}

impl FakeProbe {
    pub fn new(width: u32, height: u32, duration: f64) -> Arc<Self> {
        Arc::new(Self {
            media: MediaInfo::new(width, height, duration).unwrap(),
        })
    }
}

#[async_trait]
impl ProbePort for FakeProbe {
    async fn probe(&self, source: &Path) -> Result<MediaInfo, DomainError> {
        if source.exists() {
            Ok(self.media)
        } else {
            Err(DomainError::SourceUnavailable(format!("{} not found", source.display())))
        }
    }
}

pub fn test_config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.cache.dir = root.join("cache");
    config.transcoder.mode = TranscoderMode::Ffmpeg;
    config.session.debounce_ms = 10;
    config.session.generate_thumbnails = false;
    config.records.path = Some(root.join("records.jsonl"));
    config
}

pub fn write_source(root: &Path, name: &str) -> PathBuf {
    let path = root.join(name);
    std::fs::write(&path, b"source video").unwrap();
    path
}

pub async fn container(config: &AppConfig, transcoder: Arc<FakeTranscoder>, probe: Arc<FakeProbe>) -> DefaultAppContainer {
    let ports = Ports {
        transcoder,
        probe,
        fs: Arc::new(LocalFsAdapter::new()),
        records: Arc::new(JsonlRecordStore::new(config.records_path())),
    };
    DefaultAppContainer::with_ports(config, ports).await.unwrap()
}

/// Files in the cache directory other than the index
pub fn cache_files(config: &AppConfig) -> Vec<PathBuf> {
    std::fs::read_dir(&config.cache.dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| !p.file_name().unwrap().to_string_lossy().starts_with("index.json"))
        .collect()
}
