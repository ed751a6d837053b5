use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use blob_store::{ObjectStoreClient, StoreError};
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

pub const TEST_HEADER: &str = "NO#,Frequency,week,Category,Type,claimcnt,File Name";

pub fn init_test_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
    let _ = subscriber::set_global_default(
        tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_test_writer()
                .with_filter(env_filter),
        ),
    );
}

/// In-memory store that records uploads and fails the puts and directory
/// creations it is told to.
#[derive(Default)]
pub struct ScriptedStore {
    directories: Mutex<HashSet<String>>,
    uploads: Mutex<Vec<(String, String)>>,
    failing_puts: HashSet<String>,
    failing_mkdirs: HashSet<String>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_put(mut self, file_name: &str) -> Self {
        self.failing_puts.insert(file_name.to_string());
        self
    }

    pub fn fail_mkdir(mut self, remote_dir: &str) -> Self {
        self.failing_mkdirs.insert(remote_dir.to_string());
        self
    }

    /// `(file name, remote directory)` for every successful put, in order.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn uploaded_to(&self, remote_dir: &str) -> Vec<String> {
        self.uploads()
            .into_iter()
            .filter(|(_, dir)| dir == remote_dir)
            .map(|(file_name, _)| file_name)
            .collect()
    }
}

#[async_trait]
impl ObjectStoreClient for ScriptedStore {
    async fn directory_exists(&self, path: &str) -> bool {
        self.directories.lock().unwrap().contains(path)
    }

    async fn make_directories(&self, path: &str) -> Result<(), StoreError> {
        if self.failing_mkdirs.contains(path) {
            return Err(StoreError::MkdirFailed {
                path: path.to_string(),
                stderr: "mkdir: Permission denied".to_string(),
            });
        }
        self.directories.lock().unwrap().insert(path.to_string());
        Ok(())
    }

    async fn put(&self, local_path: &Path, remote_dir: &str) -> Result<(), StoreError> {
        let file_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let failed = |stderr: &str| StoreError::UploadFailed {
            local: local_path.to_string_lossy().to_string(),
            remote_dir: remote_dir.to_string(),
            stderr: stderr.to_string(),
        };
        if !local_path.is_file() {
            return Err(failed("put: No such file or directory"));
        }
        if self.failing_puts.contains(&file_name) {
            return Err(failed("put: connection reset"));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((file_name, remote_dir.to_string()));
        Ok(())
    }
}

/// Writes a manifest listing `rows` of `(type, file name)` into `dir`.
pub fn write_manifest(dir: &Path, name: &str, rows: &[(&str, &str)]) -> PathBuf {
    let mut contents = format!("{TEST_HEADER}\n");
    for (i, (category, file_name)) in rows.iter().enumerate() {
        contents.push_str(&format!(
            "{},Daily,1,Claims,{},{},{}\n",
            i + 1,
            category,
            i * 10,
            file_name
        ));
    }
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

pub fn write_feed_files(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), format!("id,amount\n1,{name}\n")).unwrap();
    }
}
