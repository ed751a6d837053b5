//! Per-manifest transfer state machine.
//!
//! Each manifest moves through
//! `Discovered -> PreflightChecked -> {Aborted | Uploading} -> LedgerWritten
//! -> {CleanedUp | Retained}`. Local files are deleted only when every feed
//! file of the batch and the manifest itself reached the store; a batch that
//! is not fully transferred is left on disk exactly as it was found so the
//! next run can try again.

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::Result;
use blob_store::ObjectStoreClient;
use data_model::LedgerEntry;
use regex::Regex;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    classifier::PatternTable,
    config::TransferConfig,
    error::TransferError,
    ledger::TransferLedger,
    manifest,
    partition,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestOutcome {
    /// Valid feed files were missing locally; nothing was uploaded and no
    /// ledger entry was written.
    Aborted { missing: Vec<String> },
    /// At least one upload failed; the ledger was written and nothing was
    /// deleted.
    Retained { failed: Vec<String> },
    /// Everything was uploaded and the local batch removed.
    CleanedUp { deleted: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub cleaned_up: usize,
    pub retained: usize,
    pub aborted: usize,
    pub failed: usize,
    pub missing_files: usize,
    pub failed_uploads: usize,
    pub deleted_files: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &ManifestOutcome) {
        match outcome {
            ManifestOutcome::Aborted { missing } => {
                self.aborted += 1;
                self.missing_files += missing.len();
            }
            ManifestOutcome::Retained { failed } => {
                self.retained += 1;
                self.failed_uploads += failed.len();
            }
            ManifestOutcome::CleanedUp { deleted } => {
                self.cleaned_up += 1;
                self.deleted_files += deleted;
            }
        }
    }
}

pub struct BatchOrchestrator {
    config: TransferConfig,
    store: Arc<dyn ObjectStoreClient>,
    patterns: PatternTable,
    ledger: TransferLedger,
    manifest_pattern: Regex,
}

impl BatchOrchestrator {
    pub fn new(config: TransferConfig, store: Arc<dyn ObjectStoreClient>) -> Result<Self> {
        config.validate()?;
        let manifest_pattern = Regex::new(&format!(
            r"^csv_Tracker_[0-9]+\.{}$",
            config.variant.manifest_extension()
        ))?;
        Ok(Self {
            ledger: TransferLedger::new(&config.ledger_dir),
            patterns: PatternTable::new()?,
            manifest_pattern,
            config,
            store,
        })
    }

    /// Root for invalid feed files, or `None` when this variant drops them.
    fn invalid_root(&self) -> Option<&str> {
        if !self.config.variant.uploads_invalid() {
            return None;
        }
        self.config.invalid_root.as_deref()
    }

    fn source_path(&self, file_name: &str) -> PathBuf {
        self.config.source_dir.join(file_name)
    }

    /// Manifest file names in the source directory, sorted.
    pub fn discover(&self) -> Result<Vec<String>, TransferError> {
        let dir = &self.config.source_dir;
        let entries = fs::read_dir(dir).map_err(|source| TransferError::Discovery {
            dir: dir.clone(),
            source,
        })?;

        let mut manifests = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| TransferError::Discovery {
                dir: dir.clone(),
                source,
            })?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.manifest_pattern.is_match(&name) && entry.path().is_file() {
                manifests.push(name);
            }
        }
        manifests.sort();
        Ok(manifests)
    }

    /// Processes every manifest in the source directory. Only a failure to
    /// list the directory stops the run.
    pub async fn run(&self) -> Result<RunSummary, TransferError> {
        let manifests = self.discover()?;
        info!(
            source_dir = %self.config.source_dir.display(),
            count = manifests.len(),
            "discovered manifests"
        );

        let mut summary = RunSummary {
            discovered: manifests.len(),
            ..Default::default()
        };
        for manifest_name in &manifests {
            let span = info_span!("manifest", name = %manifest_name);
            match self.process_manifest(manifest_name).instrument(span).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    error!(manifest = %manifest_name, "leaving manifest untouched: {}", e);
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    pub async fn process_manifest(
        &self,
        manifest_name: &str,
    ) -> Result<ManifestOutcome, TransferError> {
        let rows = manifest::read(&self.source_path(manifest_name))?;
        let mut classification = self.patterns.classify(&rows);
        debug!(
            valid = classification.valid.len(),
            invalid = classification.invalid.len(),
            "manifest classified"
        );
        if self.invalid_root().is_none() && !classification.invalid.is_empty() {
            debug!(
                dropped = ?classification.invalid,
                "variant has no invalid bucket, dropping files that do not match"
            );
            classification.invalid.clear();
        }

        match self.ledger.read(manifest_name) {
            Ok(Some(previous)) => info!(
                previously_transferred = previous.transferred.len(),
                "retrying manifest with an earlier transfer record"
            ),
            Ok(None) => {}
            Err(e) => warn!(
                ledger = %self.ledger.entry_path(manifest_name).display(),
                "earlier transfer record is unreadable and will be replaced: {:?}",
                e
            ),
        }

        let missing = self.preflight(&classification.valid);
        if !missing.is_empty() {
            info!(
                ?missing,
                "Aborting as not all feed files are present at the source, will retry next run"
            );
            return Ok(ManifestOutcome::Aborted { missing });
        }

        let extension = self.config.variant.manifest_extension();
        let partition =
            partition::derive(manifest_name, extension, self.config.variant.date_layout())?;
        let valid_dir = partition.under(&self.config.valid_root);

        let mut entry = LedgerEntry::new(manifest_name);
        let mut failed = Vec::new();
        for file_name in &classification.valid {
            if self.upload(file_name, &valid_dir).await {
                entry.transferred.push(file_name.clone());
            } else {
                failed.push(file_name.clone());
            }
        }
        if let Some(invalid_root) = self.invalid_root() {
            let invalid_dir = partition.under(invalid_root);
            for file_name in &classification.invalid {
                if !self.upload(file_name, &invalid_dir).await {
                    failed.push(file_name.clone());
                }
            }
        }

        self.ledger.write(&entry)?;

        if !failed.is_empty() {
            warn!(
                ?failed,
                transferred = entry.transferred.len(),
                "partially uploaded, keeping every local file of the batch"
            );
            return Ok(ManifestOutcome::Retained { failed });
        }
        if !self.upload(manifest_name, &valid_dir).await {
            warn!("manifest upload failed, keeping every local file of the batch");
            return Ok(ManifestOutcome::Retained {
                failed: vec![manifest_name.to_string()],
            });
        }

        let batch = classification
            .valid
            .iter()
            .chain(classification.invalid.iter())
            .map(String::as_str)
            .chain(std::iter::once(manifest_name));
        let deleted = self.delete_files(batch);
        info!(deleted, destination = %valid_dir, "batch transferred and removed locally");
        Ok(ManifestOutcome::CleanedUp { deleted })
    }

    /// Valid feed files that are not regular files in the source directory.
    fn preflight(&self, files: &[String]) -> Vec<String> {
        files
            .iter()
            .filter(|file_name| !self.source_path(file_name).is_file())
            .cloned()
            .collect()
    }

    async fn upload(&self, file_name: &str, remote_dir: &str) -> bool {
        let local = self.source_path(file_name);
        match self.store.upload(&local, remote_dir).await {
            Ok(()) => {
                debug!(file_name, remote_dir, "uploaded");
                true
            }
            Err(e) => {
                error!(file_name, remote_dir, "upload failed: {}", e);
                false
            }
        }
    }

    fn delete_files<'a>(&self, files: impl Iterator<Item = &'a str>) -> usize {
        let mut deleted = 0;
        for file_name in files {
            let path = self.source_path(file_name);
            if !path.exists() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => error!(path = %path.display(), "failed to delete local file: {}", e),
            }
        }
        deleted
    }
}
