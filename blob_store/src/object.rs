use std::{path::Path as LocalPath, sync::Arc};

use async_trait::async_trait;
use object_store::{parse_url, path::Path, ObjectStore, WriteMultipart};
use tokio::{fs::File, io::AsyncReadExt};
use tracing::{debug, info, warn};
use url::Url;

use super::{ObjectStoreClient, StoreError};

const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Store backed by the `object_store` crate. Directories are key prefixes,
/// so creating one is a no-op and a directory exists once something has been
/// written beneath it.
#[derive(Clone)]
pub struct ObjectStoreBackend {
    object_store: Arc<dyn ObjectStore>,
    path: Path,
}

impl ObjectStoreBackend {
    pub fn new(url_str: &str) -> Result<Self, StoreError> {
        let url = url_str
            .parse::<Url>()
            .map_err(|e| StoreError::InvalidConfig(format!("{url_str}: {e}")))?;
        let (object_store, path) =
            parse_url(&url).map_err(|e| StoreError::InvalidConfig(format!("{url_str}: {e}")))?;
        info!("using object store at: {}", url_str);
        Ok(Self {
            object_store: Arc::from(object_store),
            path,
        })
    }

    pub fn get_object_store(&self) -> Arc<dyn ObjectStore> {
        self.object_store.clone()
    }

    /// Resolves a slash separated remote directory beneath the store root.
    pub fn resolve(&self, remote_dir: &str) -> Path {
        remote_dir
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.path.clone(), |path, part| path.child(part))
    }

    async fn write_file(&self, local_path: &LocalPath, key: &Path) -> object_store::Result<u64> {
        let mut file = File::open(local_path).await.map_err(local_error)?;

        let m = self.object_store.put_multipart(key).await?;
        let mut w = WriteMultipart::new(m);
        match copy_chunks(&mut file, &mut w).await {
            Ok(size_bytes) => {
                w.finish().await?;
                Ok(size_bytes)
            }
            Err(e) => {
                if let Err(abort_err) = w.abort().await {
                    warn!(key = %key, "failed to abort multipart upload: {}", abort_err);
                }
                Err(e)
            }
        }
    }
}

fn local_error(e: std::io::Error) -> object_store::Error {
    object_store::Error::Generic {
        store: "local",
        source: Box::new(e),
    }
}

async fn copy_chunks(file: &mut File, w: &mut WriteMultipart) -> object_store::Result<u64> {
    let mut size_bytes = 0;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await.map_err(local_error)?;
        if n == 0 {
            return Ok(size_bytes);
        }
        w.wait_for_capacity(1).await?;
        size_bytes += n as u64;
        w.write(&buf[..n]);
    }
}

#[async_trait]
impl ObjectStoreClient for ObjectStoreBackend {
    async fn directory_exists(&self, path: &str) -> bool {
        let prefix = self.resolve(path);
        match self.object_store.list_with_delimiter(Some(&prefix)).await {
            Ok(listing) => !listing.objects.is_empty() || !listing.common_prefixes.is_empty(),
            Err(e) => {
                debug!(path, "listing failed, treating directory as missing: {:?}", e);
                false
            }
        }
    }

    async fn make_directories(&self, path: &str) -> Result<(), StoreError> {
        debug!(path, "object stores have no directories, nothing to create");
        Ok(())
    }

    async fn put(&self, local_path: &LocalPath, remote_dir: &str) -> Result<(), StoreError> {
        let upload_failed = |stderr: String| StoreError::UploadFailed {
            local: local_path.to_string_lossy().to_string(),
            remote_dir: remote_dir.to_string(),
            stderr,
        };
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| upload_failed("local path has no file name".to_string()))?;

        let key = self.resolve(remote_dir).child(file_name);
        let size_bytes = self
            .write_file(local_path, &key)
            .await
            .map_err(|e| upload_failed(e.to_string()))?;
        debug!(key = %key, size_bytes, "object written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[tokio::test]
    async fn test_put_into_memory_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let local = temp_dir.path().join("x_REJECTED_CVS_PAID.csv");
        fs::write(&local, "a,b\n1,2\n").unwrap();

        let store = ObjectStoreBackend::new("memory:///").unwrap();
        assert!(!store.directory_exists("invalid/2021/03/15").await);
        store.upload(&local, "invalid/2021/03/15").await.unwrap();
        assert!(store.directory_exists("invalid/2021/03/15").await);
        assert!(store.directory_exists("invalid/2021").await);

        let key = store.resolve("invalid/2021/03/15").child("x_REJECTED_CVS_PAID.csv");
        let bytes = store
            .get_object_store()
            .get(&key)
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_put_missing_local_file_fails() {
        let store = ObjectStoreBackend::new("memory:///").unwrap();
        let err = store
            .put(LocalPath::new("/nonexistent/feed.csv"), "valid")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UploadFailed { .. }));
        assert!(!store.directory_exists("valid").await);
    }

    #[tokio::test]
    async fn test_file_url_writes_under_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let local = temp_dir.path().join("feed.csv");
        fs::write(&local, "data").unwrap();
        let root = temp_dir.path().join("remote");
        fs::create_dir_all(&root).unwrap();

        let store = ObjectStoreBackend::new(&format!("file://{}", root.to_str().unwrap())).unwrap();
        store.upload(&local, "2021/01/15").await.unwrap();
        assert_eq!(
            fs::read_to_string(root.join("2021/01/15/feed.csv")).unwrap(),
            "data"
        );
    }

    fn files_under(dir: &LocalPath) -> Vec<std::path::PathBuf> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                files.extend(files_under(&path));
            } else {
                files.push(path);
            }
        }
        files
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_read_aborts_multipart_upload() {
        let temp_dir = tempfile::tempdir().unwrap();
        // Opening a directory succeeds, reading it does not.
        let local = temp_dir.path().join("feed.csv");
        fs::create_dir(&local).unwrap();
        let root = temp_dir.path().join("remote");
        fs::create_dir_all(&root).unwrap();

        let store = ObjectStoreBackend::new(&format!("file://{}", root.to_str().unwrap())).unwrap();
        let err = store.put(&local, "2021/01/15").await.unwrap_err();
        assert!(matches!(err, StoreError::UploadFailed { .. }));
        assert!(files_under(&root).is_empty());
    }
}
