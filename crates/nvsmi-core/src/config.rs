use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{NvsmiError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub listen_address: SocketAddr,
    pub telemetry_path: String,
    pub smi: SmiConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 9101)),
            telemetry_path: "/metrics".to_string(),
            smi: SmiConfig::default(),
        }
    }
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.telemetry_path.starts_with('/') {
            return Err(NvsmiError::Config(format!(
                "telemetry path must start with '/': {}",
                self.telemetry_path
            )));
        }
        self.smi.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmiConfig {
    pub binary: PathBuf,
    pub timeout: Duration,
}

impl Default for SmiConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("nvidia-smi"),
            timeout: Duration::from_secs(10),
        }
    }
}

impl SmiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.binary.as_os_str().is_empty() {
            return Err(NvsmiError::Config("nvidia-smi binary path is empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(NvsmiError::Config("nvidia-smi timeout must be non-zero".into()));
        }
        Ok(())
    }
}
