use std::path::PathBuf;

/// Runtime configuration, read from the environment by the embedding process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the WAL. Created on `Engine::open` if missing.
    pub data_dir: PathBuf,
    /// Compact the WAL once this many appends have accumulated.
    pub compact_threshold: u64,
    /// Prometheus exporter port; `None` disables the exporter.
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ATRIUM_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let compact_threshold: u64 = std::env::var("ATRIUM_COMPACT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let metrics_port: Option<u16> = std::env::var("ATRIUM_METRICS_PORT")
            .ok()
            .and_then(|s| s.parse().ok());
        Self {
            data_dir: PathBuf::from(data_dir),
            compact_threshold,
            metrics_port,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}
