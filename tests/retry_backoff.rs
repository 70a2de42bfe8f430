mod common;

use bridgeq::{DeliveryQueue, ItemStatus};
use serde_json::json;
use tempfile::TempDir;
use tokio::time::{sleep, Duration};

#[tokio::test]
async fn exhausting_max_attempts_drops_the_item() {
    common::init_logging();
    let dir = TempDir::new().unwrap();
    let q = DeliveryQueue::new("retry", common::config_in(&dir)).await;

    let id = q.enqueue(json!({"cmd": "set-level"}), 0).unwrap();

    // max_attempts = 3: two failures schedule retries, the third drops.
    q.mark_failed(&id, "timeout").unwrap();
    assert_eq!(q.len(), 1);
    q.mark_failed(&id, "timeout").unwrap();
    assert_eq!(q.len(), 1);
    q.mark_failed(&id, "timeout").unwrap();
    assert!(q.is_empty());

    let stats = q.stats();
    assert_eq!(stats.counters.failed, 1);
    assert_eq!(stats.counters.retried, 2);
    // A dropped item cannot be failed again.
    assert!(q.mark_failed(&id, "timeout").is_err());
}

#[tokio::test]
async fn backoff_doubles_per_attempt() {
    common::init_logging();
    let dir = TempDir::new().unwrap();
    let q = DeliveryQueue::new("retry", common::config_in(&dir)).await;

    let id = q.enqueue(json!("x"), 0).unwrap();

    q.mark_failed(&id, "e1").unwrap();
    let first = q.peek().unwrap();
    assert_eq!(
        first.next_attempt.unwrap() - first.last_attempt.unwrap(),
        100
    );

    q.mark_failed(&id, "e2").unwrap();
    let second = q.peek().unwrap();
    assert_eq!(
        second.next_attempt.unwrap() - second.last_attempt.unwrap(),
        200
    );
    assert_eq!(second.last_error.as_deref(), Some("e2"));
}

#[tokio::test]
async fn retry_item_becomes_ready_after_backoff_elapses() {
    common::init_logging();
    let dir = TempDir::new().unwrap();
    let q = DeliveryQueue::new("retry", common::config_in(&dir)).await;

    let id = q.enqueue(json!("x"), 0).unwrap();
    q.mark_failed(&id, "transient").unwrap();

    assert!(q.ready_items(None).is_empty());
    assert_eq!(q.peek().unwrap().status, ItemStatus::Retry);

    // retry_delay_ms = 100 in the shared test config.
    sleep(Duration::from_millis(150)).await;
    let ready = q.ready_items(None);
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, id);

    // Eligible again through dequeue as well.
    let claimed = q.dequeue().unwrap();
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.status, ItemStatus::Processing);
}

#[tokio::test]
async fn completion_after_retry_counts_once() {
    common::init_logging();
    let dir = TempDir::new().unwrap();
    let q = DeliveryQueue::new("retry", common::config_in(&dir)).await;

    let id = q.enqueue(json!("x"), 0).unwrap();
    q.mark_failed(&id, "transient").unwrap();
    q.mark_completed(&id).unwrap();

    let stats = q.stats();
    assert_eq!(stats.counters.processed, 1);
    assert_eq!(stats.counters.retried, 1);
    assert_eq!(stats.counters.failed, 0);
    assert!(q.is_empty());
}
