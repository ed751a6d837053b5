use std::{
    collections::HashMap,
    fs,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use anyhow::{anyhow, Context, Result};
use blob_store::ObjectStoreClient;
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    config::TransferConfig,
    dir_events::{self, DirEvent},
    manifest,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    Uploaded(PathBuf),
    /// The header did not match; the file stays where it is.
    Rejected(PathBuf),
    UploadFailed(PathBuf),
}

/// Size and modification time of a file when it was last looked at. A file
/// whose stamp changes is handled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(metadata: &fs::Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// Uploads every file that is written anywhere below a directory, one at a
/// time, once its header has the expected shape. Files are never deleted.
pub struct DirectoryWatcher {
    dir: PathBuf,
    destination: String,
    header: Vec<String>,
    poll_interval: Duration,
    store: Arc<dyn ObjectStoreClient>,
    seen: HashMap<PathBuf, FileStamp>,
}

impl DirectoryWatcher {
    pub fn new(config: &TransferConfig, store: Arc<dyn ObjectStoreClient>) -> Result<Self> {
        config.validate_watch()?;
        let watch = &config.watch;
        Ok(Self {
            dir: watch
                .dir
                .clone()
                .ok_or_else(|| anyhow!("watch directory is required"))?,
            destination: watch.destination.clone().unwrap_or_default(),
            header: watch.header.clone(),
            poll_interval: Duration::from_secs(watch.poll_interval_secs),
            store,
            seen: HashMap::new(),
        })
    }

    fn list_files(&self) -> Result<HashMap<PathBuf, FileStamp>> {
        let mut files = HashMap::new();
        collect_files(&self.dir, &mut files)
            .with_context(|| format!("listing watch directory {}", self.dir.display()))?;
        Ok(files)
    }

    /// Marks everything already in the tree as seen.
    pub fn prime(&mut self) -> Result<()> {
        self.seen = self.list_files()?;
        info!(
            dir = %self.dir.display(),
            existing = self.seen.len(),
            "watching for new files"
        );
        Ok(())
    }

    /// Handles files that appeared or changed since the previous scan. A file
    /// that is removed and created again counts as new, and one that was
    /// caught half written is retried once it grows or is rewritten.
    pub async fn scan_once(&mut self) -> Result<Vec<WatchOutcome>> {
        let current = self.list_files()?;
        let mut changed: Vec<PathBuf> = current
            .iter()
            .filter(|(path, stamp)| self.seen.get(*path) != Some(*stamp))
            .map(|(path, _)| path.clone())
            .collect();
        changed.sort();
        self.seen = current;

        let mut outcomes = Vec::with_capacity(changed.len());
        for path in changed {
            info!("Received created event - {}", path.display());
            outcomes.push(self.handle_created(path).await);
        }
        Ok(outcomes)
    }

    /// Handles a file the kernel reported as written. Returns `None` when the
    /// file is gone or was already handled in its current state.
    pub async fn handle_written(&mut self, path: PathBuf) -> Option<WatchOutcome> {
        let metadata = fs::metadata(&path).ok().filter(fs::Metadata::is_file)?;
        let stamp = FileStamp::of(&metadata);
        if self.seen.get(&path) == Some(&stamp) {
            debug!(path = %path.display(), "already handled");
            return None;
        }
        self.seen.insert(path.clone(), stamp);
        info!("Received created event - {}", path.display());
        Some(self.handle_created(path).await)
    }

    async fn handle_created(&self, path: PathBuf) -> WatchOutcome {
        let header: Vec<&str> = self.header.iter().map(String::as_str).collect();
        if let Err(e) = manifest::validate_header(&path, &header) {
            error!("File {} is not a valid csv file: {}", file_name(&path), e);
            return WatchOutcome::Rejected(path);
        }
        match self.store.upload(&path, &self.destination).await {
            Ok(()) => {
                info!(destination = %self.destination, "uploaded {}", file_name(&path));
                WatchOutcome::Uploaded(path)
            }
            Err(e) => {
                error!("Exception while copying {}: {}", file_name(&path), e);
                WatchOutcome::UploadFailed(path)
            }
        }
    }

    async fn scan_logged(&mut self) {
        if let Err(e) = self.scan_once().await {
            error!("watch scan failed: {:?}", e);
        }
    }

    /// Handles change notifications until `shutdown` resolves. Falls back to
    /// polling every `poll_interval` when notifications are unavailable.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut polling = match dir_events::spawn_watch_thread(&self.dir, tx) {
            Ok(_) => false,
            Err(e) => {
                warn!(
                    "directory notifications unavailable, polling every {:?}: {:?}",
                    self.poll_interval, e
                );
                true
            }
        };
        self.prime()?;

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received, stopping watcher");
                    return Ok(());
                }
                event = rx.recv(), if !polling => match event {
                    Some(DirEvent::Written(path)) => {
                        self.handle_written(path).await;
                    }
                    Some(DirEvent::Rescan) => self.scan_logged().await,
                    Some(DirEvent::Unavailable(reason)) => {
                        warn!("directory notifications stopped, falling back to polling: {}", reason);
                        polling = true;
                    }
                    None => {
                        warn!("directory notifications stopped, falling back to polling");
                        polling = true;
                    }
                },
                _ = interval.tick(), if polling => self.scan_logged().await,
            }
        }
    }
}

fn collect_files(dir: &Path, files: &mut HashMap<PathBuf, FileStamp>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if let Err(e) = collect_files(&path, files) {
                warn!(dir = %path.display(), "skipping unreadable directory: {}", e);
            }
            continue;
        }
        if let Ok(metadata) = fs::metadata(&path) {
            if metadata.is_file() {
                files.insert(path, FileStamp::of(&metadata));
            }
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
