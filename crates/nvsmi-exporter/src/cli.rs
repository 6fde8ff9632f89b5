use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use nvsmi_core::{ExporterConfig, SmiConfig};

#[derive(Parser, Debug)]
#[command(name = "nvsmi-exporter", version)]
#[command(about = "Prometheus exporter for GPU telemetry reported by nvidia-smi", long_about = None)]
pub struct Cli {
    /// Listening address
    #[arg(
        long,
        visible_alias = "addr",
        env = "NVSMI_EXPORTER_LISTEN",
        default_value = "127.0.0.1:9101"
    )]
    pub listen_address: SocketAddr,

    /// Path the metrics are served on
    #[arg(long, env = "NVSMI_EXPORTER_PATH", default_value = "/metrics")]
    pub telemetry_path: String,

    /// nvidia-smi binary to run on every scrape
    #[arg(long = "nvidia-smi", env = "NVSMI_EXPORTER_BINARY", default_value = "nvidia-smi")]
    pub nvidia_smi: PathBuf,

    /// Kill nvidia-smi if it has not finished after this many milliseconds
    #[arg(long, env = "NVSMI_EXPORTER_TIMEOUT_MS", default_value = "10000")]
    pub smi_timeout_ms: u64,
}

impl Cli {
    pub fn into_config(self) -> ExporterConfig {
        ExporterConfig {
            listen_address: self.listen_address,
            telemetry_path: self.telemetry_path,
            smi: SmiConfig {
                binary: self.nvidia_smi,
                timeout: Duration::from_millis(self.smi_timeout_ms),
            },
        }
    }
}
