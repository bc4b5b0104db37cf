use crate::clock::ActivityClock;
use crate::errors::{IngestError, IngestResult};
use crate::gateway::IndexGateway;
use crate::pending::{FlushBatch, PendingSet};
use crate::scheduler::{DebounceScheduler, SchedulerHandle};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Timing for the debounced ingest queue
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// How often the scheduler checks for a quiet period
    pub tick_interval: Duration,
    /// Inactivity required before pending documents are flushed
    pub inactivity_threshold: Duration,
    /// Flush whatever is still pending when the service stops
    pub flush_on_shutdown: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            tick_interval: Duration::from_secs(1),
            inactivity_threshold: Duration::from_secs(5),
            flush_on_shutdown: true,
        }
    }
}

/// Result of one flush attempt
#[derive(Debug)]
pub enum FlushOutcome {
    Indexed { count: usize },
    /// The upsert failed and the batch was dropped from the queue
    Dropped { count: usize, error: IngestError },
}

impl FlushOutcome {
    pub fn count(&self) -> usize {
        match self {
            FlushOutcome::Indexed { count } | FlushOutcome::Dropped { count, .. } => *count,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, FlushOutcome::Indexed { .. })
    }
}

/// Counters fed by every flush attempt
#[derive(Debug, Default)]
pub struct FlushStats {
    batches_indexed: AtomicU64,
    documents_indexed: AtomicU64,
    batches_failed: AtomicU64,
    documents_dropped: AtomicU64,
}

impl FlushStats {
    fn record(&self, outcome: &FlushOutcome) {
        let count = outcome.count() as u64;
        match outcome {
            FlushOutcome::Indexed { .. } => {
                self.batches_indexed.fetch_add(1, Ordering::Relaxed);
                self.documents_indexed.fetch_add(count, Ordering::Relaxed);
            }
            FlushOutcome::Dropped { .. } => {
                self.batches_failed.fetch_add(1, Ordering::Relaxed);
                self.documents_dropped.fetch_add(count, Ordering::Relaxed);
            }
        }
    }
}

/// Point-in-time view of the queue, served on the stats endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestStats {
    pub pending: usize,
    pub batches_indexed: u64,
    pub documents_indexed: u64,
    pub batches_failed: u64,
    pub documents_dropped: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: PendingSet,
    clock: ActivityClock,
}

/// Shared state behind the service: pending documents, the activity clock
/// and the gateway they are flushed into
pub struct IngestQueue {
    state: Mutex<QueueState>,
    // Held for the whole of a flush or a delete so they never overlap.
    flush_gate: tokio::sync::Mutex<()>,
    gateway: Arc<dyn IndexGateway>,
    config: IngestConfig,
    stats: FlushStats,
}

impl IngestQueue {
    pub fn new(gateway: Arc<dyn IndexGateway>, config: IngestConfig) -> Self {
        IngestQueue {
            state: Mutex::new(QueueState::default()),
            flush_gate: tokio::sync::Mutex::new(()),
            gateway,
            config,
            stats: FlushStats::default(),
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn accept(&self, id: String, content: String) {
        let mut state = self.lock_state();
        state.pending.put(id, content);
        state.clock.touch();
    }

    /// One scheduler tick: flush if the queue has been quiet long enough.
    ///
    /// Returns `None` when nothing was flushed: the queue is empty, writes
    /// are still arriving, or another flush is in flight.
    pub async fn tick(&self) -> Option<FlushOutcome> {
        let Ok(_gate) = self.flush_gate.try_lock() else {
            debug!("Flush already in flight, skipping tick");
            return None;
        };

        let batch = {
            let mut state = self.lock_state();
            if state.pending.is_empty()
                || !state.clock.quiet_for(self.config.inactivity_threshold)
            {
                return None;
            }
            let ids = state.pending.snapshot_ids();
            state.pending.drain_snapshot(&ids)
        };

        Some(self.flush_batch(batch).await)
    }

    /// Flush everything pending right away, ignoring the quiet period
    pub async fn flush_now(&self) -> Option<FlushOutcome> {
        let _gate = self.flush_gate.lock().await;

        let batch = {
            let mut state = self.lock_state();
            let ids = state.pending.snapshot_ids();
            state.pending.drain_snapshot(&ids)
        };
        if batch.is_empty() {
            return None;
        }

        Some(self.flush_batch(batch).await)
    }

    // Caller holds the flush gate.
    async fn flush_batch(&self, batch: FlushBatch) -> FlushOutcome {
        let count = batch.len();
        info!("Processing batch of {} documents", count);

        let outcome = match self.gateway.upsert(&batch.ids, &batch.contents).await {
            Ok(()) => {
                info!("Successfully indexed {} documents", count);
                FlushOutcome::Indexed { count }
            }
            Err(e) => {
                error!("Error processing update queue, dropping {} documents: {}", count, e);
                FlushOutcome::Dropped {
                    count,
                    error: IngestError::Flush {
                        count,
                        reason: e.to_string(),
                    },
                }
            }
        };

        {
            let mut state = self.lock_state();
            // Writes that arrived mid-flush keep their own timestamp.
            if state.pending.is_empty() {
                state.clock.reset();
            } else {
                debug!(
                    "{} documents arrived during flush, keeping activity clock",
                    state.pending.len()
                );
            }
        }

        self.stats.record(&outcome);
        outcome
    }

    /// Delete documents from the index and from the pending set.
    ///
    /// Waits for an in-flight flush so a batch that is already being
    /// upserted cannot bring a deleted document back.
    pub async fn delete(&self, ids: &[String]) -> IngestResult<()> {
        let _gate = self.flush_gate.lock().await;

        {
            let mut state = self.lock_state();
            let purged = state.pending.remove_all(ids);
            if purged > 0 {
                info!("Discarded {} pending updates for deleted documents", purged);
            }
            if state.pending.is_empty() {
                state.clock.reset();
            }
        }

        self.gateway.delete_by_ids(ids).await
    }

    pub fn stats(&self) -> IngestStats {
        let pending = self.lock_state().pending.len();
        IngestStats {
            pending,
            batches_indexed: self.stats.batches_indexed.load(Ordering::Relaxed),
            documents_indexed: self.stats.documents_indexed.load(Ordering::Relaxed),
            batches_failed: self.stats.batches_failed.load(Ordering::Relaxed),
            documents_dropped: self.stats.documents_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn pending_content(&self, id: &str) -> Option<String> {
        self.lock_state().pending.get(id).map(str::to_string)
    }
}

/// Accepts document updates, batches them behind a debounce timer and
/// forwards deletes and queries straight to the gateway
pub struct IngestService {
    queue: Arc<IngestQueue>,
    scheduler: tokio::sync::Mutex<Option<SchedulerHandle>>,
}

impl IngestService {
    pub fn new(gateway: Arc<dyn IndexGateway>, config: IngestConfig) -> Self {
        IngestService {
            queue: Arc::new(IngestQueue::new(gateway, config)),
            scheduler: tokio::sync::Mutex::new(None),
        }
    }

    /// Initialize the gateway and start the debounce scheduler
    pub async fn start(&self) -> IngestResult<()> {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_some() {
            warn!("Ingest service already started");
            return Ok(());
        }

        self.queue.gateway.initialize().await?;
        info!("Index gateway initialized");

        let tick_interval = self.queue.config().tick_interval;
        *scheduler = Some(DebounceScheduler::new(self.queue.clone(), tick_interval).spawn());
        info!("Background indexing task started");
        Ok(())
    }

    /// Stop the scheduler, optionally flush the rest of the queue and shut
    /// the gateway down
    pub async fn stop(&self) -> IngestResult<()> {
        let Some(handle) = self.scheduler.lock().await.take() else {
            return Ok(());
        };
        handle.shutdown().await;

        if self.queue.config().flush_on_shutdown {
            if let Some(outcome) = self.queue.flush_now().await {
                info!("Flushed {} pending documents on shutdown", outcome.count());
            }
        } else {
            let pending = self.queue.stats().pending;
            if pending > 0 {
                warn!("Stopping with {} documents still pending", pending);
            }
        }

        self.queue.gateway.shutdown().await?;
        info!("Ingest service stopped");
        Ok(())
    }

    /// Queue a document for the next batch. Never blocks on the index.
    pub fn accept_upsert(&self, id: String, content: String) {
        info!("Received indexing request for ID: {}", id);
        self.queue.accept(id, content);
    }

    /// Delete documents from the index right away, dropping any pending
    /// update for them. Waits for a batch that is already being flushed.
    pub async fn delete_immediate(&self, ids: &[String]) -> IngestResult<()> {
        info!("Deleting {} documents", ids.len());
        self.queue.delete(ids).await
    }

    pub async fn query(&self, text: &str, top_k: usize) -> IngestResult<Option<String>> {
        info!("Received query: '{}'", text);
        self.queue.gateway.query(text, top_k).await
    }

    pub async fn flush_now(&self) -> Option<FlushOutcome> {
        self.queue.flush_now().await
    }

    pub fn stats(&self) -> IngestStats {
        self.queue.stats()
    }

    pub fn queue(&self) -> &Arc<IngestQueue> {
        &self.queue
    }
}
