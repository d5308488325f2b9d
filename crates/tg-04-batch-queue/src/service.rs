//! # Batched Persistence Queue
//!
//! One worker task per queue. The worker waits up to `max_delay` for a first
//! item, drains whatever else is already queued up to `batch_size`, writes
//! the batch once and completes every handle of it with the same outcome.
//! A partial batch is followed by a pause so that the next write starts no
//! sooner than `max_delay` after this one began waiting.

use crate::domain::{QueueError, QueueParams, QueueStats, QueueStatsSnapshot};
use crate::ports::{BulkWriter, CompletionHandle, PersistenceQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

struct QueueElement<T> {
    item: T,
    done: oneshot::Sender<Result<(), QueueError>>,
}

/// Single writer queue that turns many small saves into few bulk writes.
pub struct BatchedPersistenceQueue<T> {
    params: QueueParams,
    tx: mpsc::UnboundedSender<QueueElement<T>>,
    stats: Arc<QueueStats>,
    closed: AtomicBool,
    worker: JoinHandle<()>,
    stats_logger: JoinHandle<()>,
}

impl<T: Send + 'static> BatchedPersistenceQueue<T> {
    /// Spawns the worker and the stats logger on the current runtime.
    pub fn start(params: QueueParams, writer: Arc<dyn BulkWriter<T>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(QueueStats::default());

        let worker = tokio::spawn(run_worker(params.clone(), rx, writer, stats.clone()));
        let stats_logger = tokio::spawn(log_stats(params.clone(), stats.clone()));

        info!(
            "[tg-04] [{}] Started queue (batch_size={}, max_delay={:?})",
            params.log_name, params.batch_size, params.max_delay
        );

        Self {
            params,
            tx,
            stats,
            closed: AtomicBool::new(false),
            worker,
            stats_logger,
        }
    }

    /// Name used in log lines.
    pub fn name(&self) -> &str {
        &self.params.log_name
    }
}

impl<T: Send + 'static> PersistenceQueue<T> for BatchedPersistenceQueue<T> {
    fn enqueue(&self, item: T) -> CompletionHandle {
        if self.closed.load(Ordering::Acquire) {
            return CompletionHandle::ready(Err(QueueError::Shutdown));
        }
        let (done, handle) = CompletionHandle::channel();
        // Counted before the worker can take it, so pending never underflows.
        self.stats.record_added();
        if let Err(mpsc::error::SendError(element)) = self.tx.send(QueueElement { item, done }) {
            self.stats.record_withdrawn();
            let _ = element.done.send(Err(QueueError::Shutdown));
        }
        handle
    }

    fn stats(&self) -> QueueStatsSnapshot {
        self.stats.snapshot()
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.worker.abort();
            self.stats_logger.abort();
            info!("[tg-04] [{}] Queue stopped", self.params.log_name);
        }
    }
}

impl<T> Drop for BatchedPersistenceQueue<T> {
    fn drop(&mut self) {
        self.worker.abort();
        self.stats_logger.abort();
    }
}

async fn run_worker<T>(
    params: QueueParams,
    mut rx: mpsc::UnboundedReceiver<QueueElement<T>>,
    writer: Arc<dyn BulkWriter<T>>,
    stats: Arc<QueueStats>,
) {
    let mut batch: Vec<QueueElement<T>> = Vec::with_capacity(params.batch_size);
    loop {
        let started = Instant::now();
        match time::timeout(params.max_delay, rx.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(element)) => batch.push(element),
        }
        while batch.len() < params.batch_size {
            match rx.try_recv() {
                Ok(element) => batch.push(element),
                Err(_) => break,
            }
        }

        let count = batch.len();
        let full_pack = count == params.batch_size;
        stats.record_taken(count);
        debug!("[tg-04] [{}] Going to save {} entities", params.log_name, count);

        let (items, handles): (Vec<T>, Vec<_>) = batch
            .drain(..)
            .map(|element| (element.item, element.done))
            .unzip();

        match writer.write(items).await {
            Ok(()) => {
                stats.record_saved(count);
                for done in handles {
                    let _ = done.send(Ok(()));
                }
            }
            Err(err) => {
                stats.record_failed(count);
                error!(
                    "[tg-04] [{}] Failed to save {} entities: {}",
                    params.log_name, count, err
                );
                let cause = Arc::new(err);
                for done in handles {
                    let _ = done.send(Err(QueueError::WriteFailed(cause.clone())));
                }
            }
        }

        if !full_pack {
            time::sleep_until(started + params.max_delay).await;
        }
    }
    debug!("[tg-04] [{}] Queue worker finished", params.log_name);
}

async fn log_stats(params: QueueParams, stats: Arc<QueueStats>) {
    let mut ticker = time::interval_at(
        Instant::now() + params.stats_print_interval,
        params.stats_print_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let snapshot = stats.take();
        if !snapshot.is_idle() {
            info!(
                "[tg-04] [{}] queueSize [{}] totalAdded [{}] totalSaved [{}] totalFailed [{}]",
                params.log_name, snapshot.queue_size, snapshot.added, snapshot.saved, snapshot.failed
            );
        }
    }
}
