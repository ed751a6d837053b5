use std::{path::Path, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CommandOutput, ObjectStoreClient, StoreError};

/// Store backed by the `hadoop fs` command line.
///
/// Each operation is one blocking child process with no timeout; a hung
/// command stalls the caller.
pub struct HadoopCliStore {
    program: String,
    base_args: Vec<String>,
}

impl HadoopCliStore {
    pub fn new(program: String, base_args: Vec<String>) -> Self {
        Self { program, base_args }
    }

    pub async fn run_cmd(&self, args: &[&str]) -> CommandOutput {
        let mut full_args: Vec<&str> = self.base_args.iter().map(String::as_str).collect();
        full_args.extend_from_slice(args);
        info!(
            "Running system command: {} {}",
            self.program,
            full_args.join(" ")
        );

        let output = Command::new(&self.program)
            .args(&full_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => CommandOutput {
                status: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
            Err(e) => CommandOutput {
                status: -1,
                stdout: String::new(),
                stderr: format!("failed to execute {}: {}", self.program, e),
            },
        }
    }
}

#[async_trait]
impl ObjectStoreClient for HadoopCliStore {
    async fn directory_exists(&self, path: &str) -> bool {
        let output = self.run_cmd(&["-test", "-d", path]).await;
        debug!(path, status = output.status, "directory test finished");
        output.success()
    }

    async fn make_directories(&self, path: &str) -> Result<(), StoreError> {
        let output = self.run_cmd(&["-mkdir", "-p", path]).await;
        if !output.success() {
            return Err(StoreError::MkdirFailed {
                path: path.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn put(&self, local_path: &Path, remote_dir: &str) -> Result<(), StoreError> {
        let local = local_path.to_string_lossy().to_string();
        let output = self.run_cmd(&["-put", local.as_str(), remote_dir]).await;
        if !output.success() {
            return Err(StoreError::UploadFailed {
                local,
                remote_dir: remote_dir.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}
