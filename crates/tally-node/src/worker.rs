//! Durable background job queue.
//!
//! Jobs are written to storage before they are handed to the worker and
//! deleted only after they run, so a crash re-runs them on the next start.
//! A single worker drains the queue in order; two jobs for the same topic
//! never overlap.

use crate::error::{Error, Result};
use crate::storage::Storage;
use std::sync::Arc;
use tally_ledger::{Job, VoteEngine};
use tokio::sync::mpsc;

/// Submitting half of the queue.
#[derive(Clone)]
pub struct JobQueue {
    storage: Arc<Storage>,
    tx: mpsc::UnboundedSender<(u64, Job)>,
}

impl JobQueue {
    /// Persist `job` and wake the worker. Returns the job's sequence number.
    pub fn submit(&self, job: Job) -> Result<u64> {
        let seq = self.storage.enqueue_job(&job)?;
        self.tx
            .send((seq, job))
            .map_err(|_| Error::Worker("job worker stopped".into()))?;
        Ok(seq)
    }
}

/// The worker draining the queue.
pub struct JobWorker {
    engine: Arc<VoteEngine<Storage>>,
    rx: mpsc::UnboundedReceiver<(u64, Job)>,
    /// Jobs below this sequence were queued by an earlier run
    replay_before: u64,
}

/// Create a connected queue and worker.
pub fn channel(engine: Arc<VoteEngine<Storage>>) -> (JobQueue, JobWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let storage = Arc::clone(engine.store());
    let replay_before = storage.next_job_seq();
    let queue = JobQueue { storage, tx };
    let worker = JobWorker {
        engine,
        rx,
        replay_before,
    };
    (queue, worker)
}

impl JobWorker {
    /// Replay leftovers from the previous run, then process new jobs until
    /// every [`JobQueue`] is dropped.
    pub async fn run(mut self) {
        match self.engine.store().pending_jobs() {
            Ok(pending) => {
                let leftovers: Vec<_> = pending
                    .into_iter()
                    .filter(|(seq, _)| *seq < self.replay_before)
                    .collect();
                if !leftovers.is_empty() {
                    tracing::info!(jobs = leftovers.len(), "Replaying pending jobs");
                }
                for (seq, job) in leftovers {
                    self.execute(seq, job).await;
                }
            }
            Err(e) => tracing::error!("Failed to read pending jobs: {}", e),
        }

        while let Some((seq, job)) = self.rx.recv().await {
            self.execute(seq, job).await;
        }
        tracing::debug!("Job queue closed, worker exiting");
    }

    /// Run one job on the blocking pool. A failed job stays queued and is
    /// retried on the next start.
    async fn execute(&self, seq: u64, job: Job) {
        let engine = Arc::clone(&self.engine);
        let outcome = tokio::task::spawn_blocking(move || engine.run(job))
            .await
            .map_err(|e| Error::Worker(e.to_string()))
            .and_then(|result| result.map_err(Error::from));

        match outcome {
            Ok(_) => {
                if let Err(e) = self.engine.store().complete_job(seq) {
                    tracing::error!(%job, seq, "Failed to clear finished job: {}", e);
                }
            }
            Err(e) => tracing::error!(%job, seq, "Job failed: {}", e),
        }
    }
}
