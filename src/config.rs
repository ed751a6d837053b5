use std::path::PathBuf;

use anyhow::{anyhow, Result};
use blob_store::BlobStorageConfig;
use data_model::{PipelineVariant, MANIFEST_HEADER};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "FEED_TRANSFER_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub dir: Option<PathBuf>,
    pub destination: Option<String>,
    /// Columns a new file must carry to be uploaded.
    pub header: Vec<String>,
    pub poll_interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            dir: None,
            destination: None,
            header: MANIFEST_HEADER.iter().map(|c| c.to_string()).collect(),
            poll_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub source_dir: PathBuf,
    pub valid_root: String,
    pub invalid_root: Option<String>,
    pub ledger_dir: PathBuf,
    pub variant: PipelineVariant,
    pub log_dir: PathBuf,
    pub structured_logging: bool,
    pub blob_storage: BlobStorageConfig,
    pub watch: WatchConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            source_dir: PathBuf::new(),
            valid_root: String::new(),
            invalid_root: None,
            ledger_dir: PathBuf::from("./track"),
            variant: PipelineVariant::default(),
            log_dir: PathBuf::from("./log"),
            structured_logging: false,
            blob_storage: BlobStorageConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl TransferConfig {
    /// Defaults, then the optional YAML file, then `FEED_TRANSFER_*`
    /// environment variables (`__` separates nested keys).
    pub fn load(path: Option<&str>) -> Result<TransferConfig> {
        let mut figment = Figment::new().merge(Serialized::defaults(TransferConfig::default()));
        if let Some(path) = path {
            let config_str = std::fs::read_to_string(path)
                .map_err(|e| anyhow!("unable to read config file {}: {}", path, e))?;
            figment = figment.merge(Yaml::string(&config_str));
        }
        let config: TransferConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_dir.as_os_str().is_empty() {
            return Err(anyhow!("source directory is required"));
        }
        if self.valid_root.is_empty() {
            return Err(anyhow!("valid destination root is required"));
        }
        if self.variant.uploads_invalid()
            && self.invalid_root.as_deref().map_or(true, str::is_empty)
        {
            return Err(anyhow!(
                "the {} variant requires an invalid destination root",
                self.variant
            ));
        }
        Ok(())
    }

    pub fn validate_watch(&self) -> Result<()> {
        if self.watch.dir.is_none() {
            return Err(anyhow!("watch directory is required"));
        }
        if self.watch.destination.as_deref().map_or(true, str::is_empty) {
            return Err(anyhow!("watch destination is required"));
        }
        if self.watch.header.is_empty() {
            return Err(anyhow!("watch header must name at least one column"));
        }
        if self.watch.poll_interval_secs == 0 {
            return Err(anyhow!("watch poll interval must be at least one second"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn transfer_config() -> TransferConfig {
        TransferConfig {
            source_dir: PathBuf::from("/incoming"),
            valid_root: "/hdfs/valid".to_string(),
            invalid_root: Some("/hdfs/invalid".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_yaml_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(
            &path,
            r#"
source_dir: /incoming
valid_root: /hdfs/valid
variant: legacy
blob_storage:
  kind: object_store
  url: file:///tmp/remote
watch:
  poll_interval_secs: 30
"#,
        )
        .unwrap();

        let config = TransferConfig::load(path.to_str()).unwrap();
        assert_eq!(config.source_dir, PathBuf::from("/incoming"));
        assert_eq!(config.variant, PipelineVariant::Legacy);
        assert_eq!(config.ledger_dir, PathBuf::from("./track"));
        assert_eq!(
            config.blob_storage,
            BlobStorageConfig::ObjectStore {
                url: "file:///tmp/remote".to_string()
            }
        );
        assert_eq!(config.watch.poll_interval_secs, 30);
        assert_eq!(config.watch.header.len(), MANIFEST_HEADER.len());
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_config_file() {
        assert!(TransferConfig::load(Some("/nonexistent/feed-transfer.yaml")).is_err());
    }

    #[test]
    fn test_validate_requires_roots() {
        transfer_config().validate().unwrap();

        let mut config = transfer_config();
        config.source_dir = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = transfer_config();
        config.valid_root.clear();
        assert!(config.validate().is_err());

        let mut config = transfer_config();
        config.invalid_root = None;
        assert!(config.validate().is_err());
        config.variant = PipelineVariant::Legacy;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_watch() {
        let mut config = TransferConfig::default();
        assert!(config.validate_watch().is_err());
        config.watch.dir = Some(PathBuf::from("/incoming"));
        config.watch.destination = Some("/hdfs/raw".to_string());
        config.validate_watch().unwrap();
        config.watch.poll_interval_secs = 0;
        assert!(config.validate_watch().is_err());
    }
}
