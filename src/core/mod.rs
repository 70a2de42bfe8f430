//! BridgeQ core module.
//!
//! Defines the delivery-queue engine:
//! - Queue items and their retry lifecycle
//! - The snapshot store (primary + backup file, crash recovery)
//! - The ledger and its admission/ordering invariants
//! - The self-rescheduling processing loop
//! - Derived statistics

pub mod error;
pub mod item;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use error::QueueError;
pub use item::{ItemStatus, QueueItem};
pub use queue::DeliveryQueue;
pub use scheduler::ProcessingLoop;
pub use stats::StatsView;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as epoch milliseconds; the single clock the engine uses.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
