//! BridgeQ – the persistent delivery queue behind a smart-home bridge.
//!
//! This crate exports
//!  * `core`    – queue item, ledger, snapshot store, processing loop
//!  * `config`  – TOML-driven runtime configuration
//!  * `logging` – tracing subscriber setup
//!
//! The bridge's accessory/transform layers construct a [`DeliveryQueue`]
//! per direction (outbound commands, inbound attribute updates), call its
//! enqueue/mark operations, and read its statistics. Everything network-
//! facing lives outside this crate.
//!
//! [`DeliveryQueue`]: core::queue::DeliveryQueue

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod logging;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{load_config, QueueConfig};
pub use core::item::{ItemStatus, QueueItem};
pub use core::queue::DeliveryQueue;
pub use core::stats::StatsView;
