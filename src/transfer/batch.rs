//! Bounded-concurrency write batches
//!
//! Each submitted upsert starts immediately as its own task. Once the batch
//! holds `capacity` operations the caller flushes it, which waits for every
//! operation to settle before anything else is submitted. At most one batch
//! is ever in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::document::Document;
use crate::store::{DocumentContainer, WriteStatus};

use super::progress::ProgressTracker;

/// Default number of concurrent upserts per batch.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Largest accepted batch size.
pub const MAX_BATCH_SIZE: usize = 500;

/// Running totals for an import.
#[derive(Debug, Clone, Copy)]
pub struct RunTally {
    /// Operations that have settled
    pub processed: u64,
    /// Settled with a success status
    pub succeeded: u64,
    /// Settled with a failure status
    pub failed: u64,
    started: Instant,
}

impl RunTally {
    pub fn new() -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            failed: 0,
            started: Instant::now(),
        }
    }

    fn record(&mut self, status: &WriteStatus) {
        self.processed += 1;
        if status.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Settled operations per second.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for RunTally {
    fn default() -> Self {
        Self::new()
    }
}

/// An upsert that has been issued but not yet awaited.
struct PendingOperation {
    identity: Option<String>,
    handle: JoinHandle<WriteStatus>,
}

/// Issues upserts in batches and tallies their outcomes.
pub struct BatchCoordinator {
    container: Arc<dyn DocumentContainer>,
    capacity: usize,
    pending: Vec<PendingOperation>,
    tally: RunTally,
    flushes: u64,
    tracker: ProgressTracker,
}

impl BatchCoordinator {
    /// Create a coordinator.
    ///
    /// # Arguments
    /// * `container` - Destination of the upserts
    /// * `capacity` - Operations per batch, clamped to `1..=MAX_BATCH_SIZE`
    /// * `tracker` - Progress display, updated once per flush
    pub fn new(
        container: Arc<dyn DocumentContainer>,
        capacity: usize,
        tracker: ProgressTracker,
    ) -> Self {
        let capacity = capacity.clamp(1, MAX_BATCH_SIZE);
        Self {
            container,
            capacity,
            pending: Vec::with_capacity(capacity),
            tally: RunTally::new(),
            flushes: 0,
            tracker,
        }
    }

    /// Start an upsert and add it to the current batch.
    ///
    /// The caller is expected to [`flush`](Self::flush) once
    /// [`is_full`](Self::is_full) reports true.
    pub fn submit(&mut self, identity: Option<String>, document: Document, partition: Option<String>) {
        let container = Arc::clone(&self.container);
        let handle = tokio::spawn(async move { container.upsert(document, partition).await });
        self.pending.push(PendingOperation { identity, handle });
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    /// Operations in the current batch.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for every operation in the current batch and record the results.
    ///
    /// Each failure is logged with the identity of the document it belonged
    /// to. Flushing an empty batch does nothing and is not counted.
    pub async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.capacity));
        let (identities, handles): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .map(|op| (op.identity, op.handle))
            .unzip();
        let size = handles.len();

        // Results come back in submission order, so index i belongs to identities[i]
        let results = join_all(handles).await;
        for (identity, result) in identities.iter().zip(results) {
            let status = result
                .unwrap_or_else(|e| WriteStatus::Transport(format!("write task failed: {e}")));
            self.tally.record(&status);
            if !status.is_success() {
                warn!(
                    "Failed to import item with id '{}', response status: {}",
                    identity.as_deref().unwrap_or("<unknown>"),
                    status
                );
            }
        }

        self.flushes += 1;
        debug!(
            "Batch #{} settled: {} operations ({} succeeded, {} failed so far)",
            self.flushes, size, self.tally.succeeded, self.tally.failed
        );
        self.tracker.update_with_message(
            self.tally.processed,
            format!(
                "({} succeeded, {} failed, {:.0} docs/sec)",
                self.tally.succeeded,
                self.tally.failed,
                self.tally.rate()
            ),
        );
    }

    pub fn tally(&self) -> &RunTally {
        &self.tally
    }

    /// Number of non-empty batches flushed so far.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Clear the progress display and hand back the final totals.
    pub fn finish(self) -> (RunTally, u64) {
        self.tracker.finish();
        (self.tally, self.flushes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryContainer;
    use serde_json::json;

    fn doc(id: &str) -> Document {
        Document::from_value(json!({ "id": id })).unwrap()
    }

    #[tokio::test]
    async fn test_flush_tallies_results() {
        let container = Arc::new(MemoryContainer::new("items").with_rejected_ids(["b"]));
        let mut batches = BatchCoordinator::new(container.clone(), 10, ProgressTracker::hidden());

        for id in ["a", "b", "c"] {
            batches.submit(Some(id.to_string()), doc(id), None);
        }
        assert_eq!(batches.pending(), 3);
        batches.flush().await;

        assert_eq!(batches.pending(), 0);
        let tally = batches.tally();
        assert_eq!((tally.processed, tally.succeeded, tally.failed), (3, 2, 1));
        assert_eq!(batches.flushes(), 1);
        assert_eq!(container.documents().await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_flush_is_not_counted() {
        let container = Arc::new(MemoryContainer::new("items"));
        let mut batches = BatchCoordinator::new(container, 5, ProgressTracker::hidden());
        batches.flush().await;
        let (tally, flushes) = batches.finish();
        assert_eq!(tally.processed, 0);
        assert_eq!(flushes, 0);
    }

    #[tokio::test]
    async fn test_capacity_is_clamped() {
        let container: Arc<dyn DocumentContainer> = Arc::new(MemoryContainer::new("items"));
        let batches = BatchCoordinator::new(container.clone(), 0, ProgressTracker::hidden());
        assert_eq!(batches.capacity(), 1);
        let batches = BatchCoordinator::new(container, 10_000, ProgressTracker::hidden());
        assert_eq!(batches.capacity(), MAX_BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_capacity() {
        let container = Arc::new(
            MemoryContainer::new("items").with_write_delay(Duration::from_millis(5)),
        );
        let mut batches = BatchCoordinator::new(container.clone(), 4, ProgressTracker::hidden());

        for i in 0..10 {
            let id = i.to_string();
            batches.submit(Some(id.clone()), doc(&id), None);
            if batches.is_full() {
                batches.flush().await;
            }
        }
        batches.flush().await;

        assert_eq!(batches.flushes(), 3);
        assert_eq!(batches.tally().succeeded, 10);
        assert!(container.peak_in_flight() <= 4);
    }
}
