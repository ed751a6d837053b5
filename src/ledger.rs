use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use data_model::LedgerEntry;
use tracing::info;

use crate::error::TransferError;

/// Directory of per-manifest transfer records, one JSON file each.
pub struct TransferLedger {
    dir: PathBuf,
}

impl TransferLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn entry_path(&self, manifest: &str) -> PathBuf {
        self.dir.join(format!("{manifest}_tracker.json"))
    }

    /// Persists `entry`, replacing any record left by an earlier run of the
    /// same manifest.
    pub fn write(&self, entry: &LedgerEntry) -> Result<PathBuf, TransferError> {
        let path = self.entry_path(&entry.manifest);
        write_json(&self.dir, &path, entry).map_err(|source| TransferError::Ledger {
            path: path.clone(),
            source,
        })?;
        info!(
            manifest = %entry.manifest,
            transferred = entry.transferred.len(),
            "transfer ledger written to {}",
            path.display()
        );
        Ok(path)
    }

    pub fn read(&self, manifest: &str) -> anyhow::Result<Option<LedgerEntry>> {
        let path = self.entry_path(manifest);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading ledger {}", path.display()))?;
        let entry = serde_json::from_str(&contents)
            .with_context(|| format!("parsing ledger {}", path.display()))?;
        Ok(Some(entry))
    }
}

fn write_json(dir: &Path, path: &Path, entry: &LedgerEntry) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let json = serde_json::to_string_pretty(entry)?;
    fs::write(path, json)?;
    Ok(())
}
