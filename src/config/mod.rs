use serde::Deserialize;
use std::path::PathBuf;
use std::{fs, path::Path};

/// Runtime configuration for a single delivery queue.
///
/// Every queue instance owns its own copy; two queues sharing a
/// `storage_dir` stay independent because snapshot files are keyed by
/// queue name.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueueConfig {
    /// Directory holding the snapshot files for this installation.
    pub storage_dir: PathBuf,
    /// Hard capacity; enqueue is refused once the ledger reaches it.
    pub max_size: usize,
    /// Delivery attempts before an item is dropped as failed.
    pub max_attempts: u32,
    /// Base backoff delay; doubles per additional failed attempt.
    pub retry_delay_ms: u64,
    /// Interval between snapshot writes.
    pub persist_interval_ms: u64,
    /// Delay between processing cycles.
    pub process_interval_ms: u64,
    /// Maximum ready items handed to one processing cycle.
    pub batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./bridgeq-data"),
            max_size: 1000,
            max_attempts: 3,
            retry_delay_ms: 1000,
            persist_interval_ms: 30_000,
            process_interval_ms: 1000,
            batch_size: 10,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<QueueConfig, anyhow::Error> {
    let raw: String = fs::read_to_string(path)?;
    let config: QueueConfig = toml::from_str(&raw)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let cfg = QueueConfig::default();
        assert!(cfg.max_size > 0);
        assert!(cfg.max_attempts > 0);
        assert!(cfg.retry_delay_ms > 0);
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "max_size = 42\nretry_delay_ms = 250").unwrap();
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.max_size, 42);
        assert_eq!(cfg.retry_delay_ms, 250);
        assert_eq!(cfg.max_attempts, QueueConfig::default().max_attempts);
    }
}
