//! Remote storage used by the transfer pipeline.
//!
//! The pipeline only needs three things from a store: ask whether a
//! directory exists, create one recursively, and put a local file into a
//! directory. [`ObjectStoreClient`] captures exactly that, and
//! [`ObjectStoreClient::upload`] combines them into the upload protocol used
//! for every file.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod hadoop;
pub mod object;

pub use hadoop::HadoopCliStore;
pub use object::ObjectStoreBackend;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("unable to create remote directory {path}: {stderr}")]
    MkdirFailed { path: String, stderr: String },

    #[error("unable to copy {local} to {remote_dir}: {stderr}")]
    UploadFailed {
        local: String,
        remote_dir: String,
        stderr: String,
    },

    #[error("invalid blob storage configuration: {0}")]
    InvalidConfig(String),
}

/// Result of one external store invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

fn default_program() -> String {
    "hadoop".to_string()
}

fn default_base_args() -> Vec<String> {
    vec!["fs".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlobStorageConfig {
    /// Shell out to the hadoop file system CLI.
    Hadoop {
        #[serde(default = "default_program")]
        program: String,
        #[serde(default = "default_base_args")]
        base_args: Vec<String>,
    },
    /// Any store `object_store` can open from a URL (`file://`, `s3://`,
    /// `memory://`).
    ObjectStore { url: String },
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        BlobStorageConfig::Hadoop {
            program: default_program(),
            base_args: default_base_args(),
        }
    }
}

#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn directory_exists(&self, path: &str) -> bool;

    async fn make_directories(&self, path: &str) -> Result<(), StoreError>;

    async fn put(&self, local_path: &Path, remote_dir: &str) -> Result<(), StoreError>;

    /// Creates `remote_dir` when it is missing, then puts the file into it.
    /// There is exactly one attempt per call.
    async fn upload(&self, local_path: &Path, remote_dir: &str) -> Result<(), StoreError> {
        if !self.directory_exists(remote_dir).await {
            debug!(remote_dir, "destination directory missing, creating it");
            self.make_directories(remote_dir).await?;
        }
        self.put(local_path, remote_dir).await
    }
}

pub fn build_client(config: &BlobStorageConfig) -> Result<Arc<dyn ObjectStoreClient>, StoreError> {
    match config {
        BlobStorageConfig::Hadoop { program, base_args } => Ok(Arc::new(HadoopCliStore::new(
            program.clone(),
            base_args.clone(),
        ))),
        BlobStorageConfig::ObjectStore { url } => Ok(Arc::new(ObjectStoreBackend::new(url)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_to_hadoop_fs() {
        let config: BlobStorageConfig = serde_json::from_str(r#"{"kind": "hadoop"}"#).unwrap();
        assert_eq!(config, BlobStorageConfig::default());
    }

    #[test]
    fn test_object_store_config() {
        let config: BlobStorageConfig =
            serde_json::from_str(r#"{"kind": "object_store", "url": "memory:///"}"#).unwrap();
        assert_eq!(
            config,
            BlobStorageConfig::ObjectStore {
                url: "memory:///".to_string()
            }
        );
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn test_build_client_rejects_bad_url() {
        let config = BlobStorageConfig::ObjectStore {
            url: "not a url".to_string(),
        };
        assert!(matches!(
            build_client(&config),
            Err(StoreError::InvalidConfig(_))
        ));
    }
}
