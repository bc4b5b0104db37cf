use crate::ingest::{FlushOutcome, IngestQueue};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic task that flushes the ingest queue once writes have gone quiet
pub struct DebounceScheduler {
    queue: Arc<IngestQueue>,
    tick_interval: Duration,
}

/// Handle to a running scheduler task
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DebounceScheduler {
    /// A tick interval below one millisecond is raised to one millisecond
    pub fn new(queue: Arc<IngestQueue>, tick_interval: Duration) -> Self {
        if tick_interval < MIN_TICK_INTERVAL {
            warn!(
                "Tick interval {:?} is too short, using {:?}",
                tick_interval, MIN_TICK_INTERVAL
            );
        }
        DebounceScheduler {
            queue,
            tick_interval: tick_interval.max(MIN_TICK_INTERVAL),
        }
    }

    /// Spawn the tick loop onto the tokio runtime
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Debounce scheduler running (tick {:?}, inactivity {:?})",
            self.tick_interval,
            self.queue.config().inactivity_threshold
        );

        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            // A flush that has started runs to completion before shutdown is seen.
            match self.queue.tick().await {
                Some(FlushOutcome::Indexed { count }) => debug!("Tick flushed {} documents", count),
                Some(FlushOutcome::Dropped { count, error }) => {
                    warn!("Tick dropped {} documents: {}", count, error)
                }
                None => {}
            }
        }

        info!("Debounce scheduler stopped");
    }
}

impl SchedulerHandle {
    /// Stop ticking and wait for the task to exit
    pub async fn shutdown(self) {
        // The receiver only disappears if the task already ended.
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Debounce scheduler task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
