//! Queue items and their retry lifecycle.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::now_ms;

/// Lifecycle state of an item while it sits in the ledger.
///
/// There is no terminal state: completion and retry exhaustion remove
/// the item instead of transitioning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Retry,
}

/// A single buffered bridge message plus its retry bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Unique within one queue instance: `{queue}-{enqueue_ms}-{suffix}`.
    pub id: String,
    /// Opaque caller payload; the queue never inspects it.
    pub data: Value,
    /// Higher priority is processed earlier.
    pub priority: i64,
    /// Enqueue time, epoch milliseconds.
    pub timestamp: u64,
    /// Failed delivery attempts so far; never exceeds `max_attempts`.
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt: Option<u64>,
}

impl QueueItem {
    pub fn new(queue_name: &str, data: Value, priority: i64, max_attempts: u32) -> Self {
        let now = now_ms();
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}-{}-{}", queue_name, now, &suffix[..8]),
            data,
            priority,
            timestamp: now,
            attempts: 0,
            max_attempts,
            status: ItemStatus::Pending,
            last_error: None,
            last_attempt: None,
            next_attempt: None,
        }
    }

    /// Whether the item is eligible for the next processing cycle.
    pub fn is_ready(&self, now: u64) -> bool {
        match self.status {
            ItemStatus::Pending => true,
            ItemStatus::Retry => self.next_attempt.map_or(true, |at| at <= now),
            ItemStatus::Processing => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_item_starts_pending_with_zero_attempts() {
        let item = QueueItem::new("outbound", json!({"cmd": "on"}), 5, 3);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.max_attempts, 3);
        assert!(item.id.starts_with("outbound-"));
        assert!(item.last_error.is_none());
    }

    #[test]
    fn ids_are_unique() {
        let a = QueueItem::new("q", json!(1), 0, 3);
        let b = QueueItem::new("q", json!(1), 0, 3);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn readiness_follows_status_and_backoff() {
        let mut item = QueueItem::new("q", json!(null), 0, 3);
        assert!(item.is_ready(now_ms()));

        item.status = ItemStatus::Processing;
        assert!(!item.is_ready(now_ms()));

        item.status = ItemStatus::Retry;
        let now = now_ms();
        item.next_attempt = Some(now + 10_000);
        assert!(!item.is_ready(now));
        item.next_attempt = Some(now);
        assert!(item.is_ready(now));
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let item = QueueItem::new("q", json!("x"), 2, 3);
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["status"], "pending");
        assert!(v.get("maxAttempts").is_some());
        assert!(v.get("lastError").is_none());
    }
}
