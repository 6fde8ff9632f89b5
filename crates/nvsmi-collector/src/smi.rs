use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nvsmi_core::SmiConfig;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Output format requested from nvidia-smi on every query.
pub const CSV_FORMAT: &str = "--format=csv,noheader,nounits";

#[derive(Error, Debug)]
pub enum SmiError {
    #[error("{0} not found - is the NVIDIA driver installed?")]
    NotFound(String),
    #[error("Failed to execute nvidia-smi: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("nvidia-smi timed out after {0:?}")]
    Timeout(Duration),
    #[error("nvidia-smi failed ({status}): {output}")]
    Failed { status: String, output: String },
}

/// Source of raw CSV text for a list of `--query-gpu` fields.
#[async_trait]
pub trait SmiRunner: Send + Sync {
    async fn query(&self, fields: &[&str]) -> Result<String, SmiError>;
}

/// Runs the real `nvidia-smi` binary. The child is killed if it outlives the timeout.
pub struct NvidiaSmi {
    binary: PathBuf,
    timeout: Duration,
}

impl NvidiaSmi {
    pub fn new(config: &SmiConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: config.timeout,
        }
    }

    pub fn query_arg(fields: &[&str]) -> String {
        format!("--query-gpu={}", fields.join(","))
    }
}

#[async_trait]
impl SmiRunner for NvidiaSmi {
    async fn query(&self, fields: &[&str]) -> Result<String, SmiError> {
        let query = Self::query_arg(fields);
        debug!(binary = %self.binary.display(), %query, "Running nvidia-smi");

        let child = Command::new(&self.binary)
            .arg(&query)
            .arg(CSV_FORMAT)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    SmiError::NotFound(self.binary.display().to_string())
                }
                _ => SmiError::Spawn(e),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| SmiError::Timeout(self.timeout))??;

        if !output.status.success() {
            // nvidia-smi reports most failures on stdout
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(SmiError::Failed {
                status: output.status.to_string(),
                output: format!("{}\n{}", stderr, stdout).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
