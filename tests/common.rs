use std::sync::Once;

use bridgeq::QueueConfig;
use tempfile::TempDir;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        bridgeq::logging::init_logging();
    });
}

pub fn config_in(dir: &TempDir) -> QueueConfig {
    QueueConfig {
        storage_dir: dir.path().to_path_buf(),
        max_size: 10,
        max_attempts: 3,
        retry_delay_ms: 100,
        persist_interval_ms: 60_000,
        process_interval_ms: 5,
        batch_size: 3,
    }
}
