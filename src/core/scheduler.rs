//! Self-rescheduling batch-processing loop.
//!
//! Each cycle selects up to `batch_size` ready items and transitions
//! them to `processing`; the next cycle is scheduled only once the
//! current one finishes, so cycles never overlap. Dispatching the batch
//! to a consumer is an extension point: the embedding bridge supplies a
//! [`BatchHandler`], and without one a cycle's sole effect is the
//! selection and status transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::core::item::QueueItem;
use crate::core::queue::QueueCore;

/// Hook invoked with each non-empty batch a cycle selects.
///
/// The loop never reverts item status when a handler fails; settling
/// each item via `mark_completed`/`mark_failed` is the handler's job.
pub type BatchHandler = Arc<dyn Fn(Vec<QueueItem>) + Send + Sync>;

pub struct ProcessingLoop {
    core: Arc<QueueCore>,
    handler: Option<BatchHandler>,
    running: Arc<AtomicBool>,
    stop: Mutex<Option<watch::Sender<bool>>>,
}

impl ProcessingLoop {
    pub(crate) fn new(core: Arc<QueueCore>, handler: Option<BatchHandler>) -> Self {
        Self {
            core,
            handler,
            running: Arc::new(AtomicBool::new(false)),
            stop: Mutex::new(None),
        }
    }

    /// Starts the loop; calling it while already running is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(queue = %self.core.name, "processing loop started");

        let core = Arc::clone(&self.core);
        let handler = self.handler.clone();
        let running = Arc::clone(&self.running);
        // One channel per run: the stop signal stays latched, so it is
        // seen even when the task has not been polled yet.
        let (stop_tx, mut stop_rx) = watch::channel(false);
        *self.stop.lock() = Some(stop_tx);
        let delay = Duration::from_millis(core.config.process_interval_ms.max(1));

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let batch = core.take_ready_batch(core.config.batch_size);
                if !batch.is_empty() {
                    trace!(queue = %core.name, batch = batch.len(), "selected ready batch");
                    if let Some(handler) = &handler {
                        handler(batch);
                    }
                }

                // Reschedule only after the cycle completes; a stop
                // signal cancels the pending sleep promptly. The cycle
                // itself always runs to completion.
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = stop_rx.changed() => break,
                }
            }
        });
    }

    /// Clears the running flag and cancels the pending cycle. A cycle
    /// already in progress finishes before the loop exits.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!(queue = %self.core.name, "processing loop stopped");
        }
        if let Some(stop_tx) = self.stop.lock().take() {
            let _ = stop_tx.send(true);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
