//! The delivery queue: ledger, lifecycle operations, persistence tick.
//!
//! One `DeliveryQueue` buffers one direction of bridge traffic. The
//! ledger keeps items in descending priority with FIFO order among equal
//! priorities; capacity is enforced at admission and never by eviction.
//!
//! Every mutation takes the ledger lock for its whole body, so queue
//! operations are atomic with respect to each other; the persistence
//! tick and the processing loop interleave only between operations.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::core::error::QueueError;
use crate::core::item::{ItemStatus, QueueItem};
use crate::core::now_ms;
use crate::core::scheduler::{BatchHandler, ProcessingLoop};
use crate::core::stats::{utilization_percent, QueueCounters, StatsView};
use crate::core::store::{Snapshot, SnapshotStore};

/// State shared between the queue facade, the persistence tick and the
/// processing loop.
pub(crate) struct QueueCore {
    pub(crate) name: String,
    pub(crate) config: QueueConfig,
    ledger: Mutex<Vec<QueueItem>>,
    counters: QueueCounters,
    store: SnapshotStore,
}

impl QueueCore {
    fn new(name: &str, config: QueueConfig) -> Self {
        let store = SnapshotStore::new(&config.storage_dir, name);
        Self {
            name: name.to_string(),
            config,
            ledger: Mutex::new(Vec::new()),
            counters: QueueCounters::default(),
            store,
        }
    }

    fn restore(&self, snapshot: Snapshot) {
        let mut ledger = self.ledger.lock();
        *ledger = snapshot.queue;
        self.counters.restore(&snapshot.stats);
    }

    fn enqueue(&self, data: Value, priority: i64) -> Result<String, QueueError> {
        use std::sync::atomic::Ordering;

        let mut ledger = self.ledger.lock();
        if ledger.len() >= self.config.max_size {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(queue = %self.name, size = ledger.len(), "queue full, refusing item");
            return Err(QueueError::Full);
        }

        let item = QueueItem::new(&self.name, data, priority, self.config.max_attempts);
        let id = item.id.clone();

        // Descending priority, FIFO among equals: insert before the first
        // strictly-lower-priority item.
        match ledger.iter().position(|it| it.priority < priority) {
            Some(pos) => ledger.insert(pos, item),
            None => ledger.push(item),
        }
        self.counters.added.fetch_add(1, Ordering::Relaxed);
        debug!(queue = %self.name, id = %id, priority, "enqueued item");
        Ok(id)
    }

    /// Marks the head-most ready item as `processing` and returns a
    /// copy. Non-removing: the item stays in the ledger until
    /// `mark_completed`/`mark_failed` settles it.
    fn dequeue(&self) -> Option<QueueItem> {
        let now = now_ms();
        let mut ledger = self.ledger.lock();
        let item = ledger.iter_mut().find(|it| it.is_ready(now))?;
        item.status = ItemStatus::Processing;
        Some(item.clone())
    }

    fn peek(&self) -> Option<QueueItem> {
        self.ledger.lock().first().cloned()
    }

    fn mark_completed(&self, id: &str) -> Result<(), QueueError> {
        use std::sync::atomic::Ordering;

        let mut ledger = self.ledger.lock();
        let pos = ledger
            .iter()
            .position(|it| it.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        ledger.remove(pos);
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        debug!(queue = %self.name, id, "item completed");
        Ok(())
    }

    fn mark_failed(&self, id: &str, error: &str) -> Result<(), QueueError> {
        use std::sync::atomic::Ordering;

        let mut ledger = self.ledger.lock();
        let pos = ledger
            .iter()
            .position(|it| it.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        let now = now_ms();
        let item = &mut ledger[pos];
        item.attempts += 1;
        item.last_error = Some(error.to_string());
        item.last_attempt = Some(now);

        if item.attempts >= item.max_attempts {
            let attempts = item.attempts;
            ledger.remove(pos);
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(queue = %self.name, id, attempts, error, "retries exhausted, dropping item");
        } else {
            // Backoff doubles per additional attempt, keyed to the base
            // delay, saturating once the doubling outgrows u64.
            let exponent = u32::min(item.attempts - 1, 63);
            let delay = self.config.retry_delay_ms.saturating_mul(1u64 << exponent);
            item.status = ItemStatus::Retry;
            item.next_attempt = Some(now.saturating_add(delay));
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
            debug!(queue = %self.name, id, attempts = item.attempts, delay_ms = delay, "item scheduled for retry");
        }
        Ok(())
    }

    fn ready_items(&self, limit: Option<usize>) -> Vec<QueueItem> {
        let now = now_ms();
        let ledger = self.ledger.lock();
        let iter = ledger.iter().filter(|it| it.is_ready(now)).cloned();
        match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    /// One processing cycle's selection: up to `limit` ready items, each
    /// transitioned to `processing` before being handed out.
    pub(crate) fn take_ready_batch(&self, limit: usize) -> Vec<QueueItem> {
        let now = now_ms();
        let mut ledger = self.ledger.lock();
        let mut batch = Vec::new();
        for item in ledger.iter_mut() {
            if batch.len() >= limit {
                break;
            }
            if item.is_ready(now) {
                item.status = ItemStatus::Processing;
                batch.push(item.clone());
            }
        }
        batch
    }

    fn clear(&self) {
        self.ledger.lock().clear();
        self.counters.reset();
        info!(queue = %self.name, "queue cleared");
    }

    fn stats(&self) -> StatsView {
        let now = now_ms();
        let ledger = self.ledger.lock();
        let mut ready = 0;
        let mut retrying = 0;
        let mut processing = 0;
        for item in ledger.iter() {
            if item.is_ready(now) {
                ready += 1;
            }
            match item.status {
                ItemStatus::Retry => retrying += 1,
                ItemStatus::Processing => processing += 1,
                ItemStatus::Pending => {}
            }
        }
        let counters = self.counters.snapshot();
        let since_last_persist_ms = (counters.last_persisted > 0)
            .then(|| now.saturating_sub(counters.last_persisted));
        StatsView {
            size: ledger.len(),
            ready,
            retrying,
            processing,
            since_last_persist_ms,
            utilization_percent: utilization_percent(ledger.len(), self.config.max_size),
            counters,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            queue: self.ledger.lock().clone(),
            stats: self.counters.snapshot(),
            timestamp: now_ms(),
            queue_name: self.name.clone(),
        }
    }

    pub(crate) async fn persist_now(&self) {
        use std::sync::atomic::Ordering;

        let snapshot = self.snapshot();
        if self.store.persist(&snapshot).await {
            self.counters
                .last_persisted
                .store(now_ms(), Ordering::Relaxed);
        }
    }
}

/// Handle to one named delivery queue.
///
/// Construction restores the last snapshot and starts the persistence
/// tick; [`DeliveryQueue::start`] additionally starts the processing
/// loop. Drop without [`DeliveryQueue::dispose`] abandons the final
/// persist, losing at most one persistence interval of mutations.
pub struct DeliveryQueue {
    core: Arc<QueueCore>,
    processing: ProcessingLoop,
    persist_stop: watch::Sender<bool>,
    persist_task: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryQueue {
    /// Creates a queue with no batch handler; cycles still select ready
    /// items and mark them processing (see [`ProcessingLoop`]).
    pub async fn new(name: &str, config: QueueConfig) -> Self {
        Self::with_handler(name, config, None).await
    }

    /// Creates a queue whose processing cycles hand each selected batch
    /// to `handler`.
    pub async fn with_handler(
        name: &str,
        config: QueueConfig,
        handler: Option<BatchHandler>,
    ) -> Self {
        SnapshotStore::ensure_dir(&config.storage_dir).await;

        let core = Arc::new(QueueCore::new(name, config));
        let snapshot = core.store.load().await;
        let restored = snapshot.queue.len();
        core.restore(snapshot);
        if restored > 0 {
            info!(queue = %name, items = restored, "restored queue from snapshot");
        }

        let processing = ProcessingLoop::new(Arc::clone(&core), handler);
        // A watch channel keeps the stop signal latched, so teardown
        // cannot lose it to a task that has not been polled yet.
        let (persist_stop, persist_rx) = watch::channel(false);
        let persist_task = Self::spawn_persist_tick(Arc::clone(&core), persist_rx);

        Self {
            core,
            processing,
            persist_stop,
            persist_task: Mutex::new(Some(persist_task)),
        }
    }

    fn spawn_persist_tick(core: Arc<QueueCore>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = Duration::from_millis(core.config.persist_interval_ms.max(1));
        tokio::spawn(async move {
            let mut tick = interval(period);
            // The first interval tick fires immediately; skip it so the
            // first persist happens one full period after startup.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => core.persist_now().await,
                    // Ok on a stop signal, Err once the queue handle is
                    // dropped; both end the tick.
                    _ = stop.changed() => break,
                }
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Admits an item, returning its generated id, or `Err(Full)` when
    /// the ledger is at capacity.
    pub fn enqueue(&self, data: Value, priority: i64) -> Result<String, QueueError> {
        self.core.enqueue(data, priority)
    }

    /// Claims the head-most ready item, marking it `processing`. The
    /// item stays in the ledger so it can be settled by id afterwards.
    pub fn dequeue(&self) -> Option<QueueItem> {
        self.core.dequeue()
    }

    pub fn peek(&self) -> Option<QueueItem> {
        self.core.peek()
    }

    /// Settles an item as delivered: removes it and counts it processed.
    pub fn mark_completed(&self, id: &str) -> Result<(), QueueError> {
        self.core.mark_completed(id)
    }

    /// Records a failed delivery attempt. The item is either scheduled
    /// for retry with doubled backoff, or dropped once `max_attempts`
    /// is reached.
    pub fn mark_failed(&self, id: &str, error: &str) -> Result<(), QueueError> {
        self.core.mark_failed(id, error)
    }

    /// Items eligible for processing right now, in ledger order.
    pub fn ready_items(&self, limit: Option<usize>) -> Vec<QueueItem> {
        self.core.ready_items(limit)
    }

    pub fn len(&self) -> usize {
        self.core.ledger.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.ledger.lock().is_empty()
    }

    pub fn stats(&self) -> StatsView {
        self.core.stats()
    }

    /// Starts the processing loop; idempotent.
    pub fn start(&self) {
        self.processing.start();
    }

    /// Stops the processing loop; a later `start` resumes it.
    pub fn stop(&self) {
        self.processing.stop();
    }

    /// Empties the ledger, zeroes every counter and persists the empty
    /// state immediately.
    pub async fn clear(&self) {
        self.core.clear();
        self.core.persist_now().await;
    }

    /// Stops both recurring tasks and writes a final snapshot.
    /// Best-effort: an enqueue racing with disposal may miss the final
    /// snapshot.
    pub async fn dispose(&self) {
        self.processing.stop();
        let _ = self.persist_stop.send(true);
        let task = self.persist_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.core.persist_now().await;
        info!(queue = %self.core.name, "queue disposed");
    }
}
