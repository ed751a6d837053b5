use std::path::PathBuf;

/// Failures of a transfer run. Everything except [`TransferError::Discovery`]
/// is confined to the manifest being processed and ends with the run moving
/// on to the next one.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransferError {
    #[error("invalid manifest {}: {reason}", path.display())]
    ManifestFormat { path: PathBuf, reason: String },

    #[error("could not derive a destination partition from manifest name {file_name}")]
    PathDerivation { file_name: String },

    #[error("failed to list manifests in {}: {source}", dir.display())]
    Discovery {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write transfer ledger {}: {source}", path.display())]
    Ledger {
        path: PathBuf,
        source: anyhow::Error,
    },
}
