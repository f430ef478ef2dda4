//! A fixed set of workers draining one shared job queue.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::MAX_CONCURRENCY;
use crate::job::Job;
use crate::retry::{JobRunner, RetryPolicy, run_with_retry};

/// Outcome counts of one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl PoolReport {
    /// Jobs still queued when the workers stopped.
    pub fn not_started(&self) -> usize {
        self.total.saturating_sub(self.succeeded + self.failed + self.cancelled)
    }

    fn merge(&mut self, other: PoolReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
    }
}

/// Runs jobs with bounded concurrency.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
    retry: RetryPolicy,
}

impl WorkerPool {
    /// `concurrency` is clamped to `1..=MAX_CONCURRENCY`.
    pub fn new(concurrency: usize, retry: RetryPolicy) -> Self {
        Self {
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            retry,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Queues every job, then lets the workers drain the queue.
    ///
    /// Returns once all workers have exited. After `cancel` fires, workers stop
    /// taking new jobs; a job in flight ends at its next cancellation check.
    pub async fn run<R>(
        &self,
        jobs: Vec<Job>,
        runner: Arc<R>,
        cancel: &CancellationToken,
    ) -> PoolReport
    where
        R: JobRunner + 'static,
    {
        let total = jobs.len();
        let mut report = PoolReport {
            total,
            ..PoolReport::default()
        };
        if total == 0 {
            return report;
        }

        let (tx, rx) = mpsc::channel::<Job>(total);
        for job in jobs {
            // Sized for every job, so this never waits.
            if tx.send(job).await.is_err() {
                break;
            }
        }
        drop(tx);

        let rx = Arc::new(Mutex::new(rx));
        let workers = self.concurrency.min(total);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let rx = rx.clone();
            let runner = runner.clone();
            let cancel = cancel.clone();
            let retry = self.retry;
            handles.push(tokio::spawn(async move {
                worker(id, rx, runner, retry, cancel).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(partial) => report.merge(partial),
                Err(e) => error!("worker task failed: {}", e),
            }
        }
        report
    }
}

async fn worker<R: JobRunner>(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    runner: Arc<R>,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> PoolReport {
    let mut report = PoolReport::default();
    loop {
        if cancel.is_cancelled() {
            debug!("worker={} cancelled, exiting", id);
            break;
        }
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => None,
                job = queue.recv() => job,
            }
        };
        let Some(job) = next else {
            break;
        };

        info!("job started {} worker={}", job, id);
        match run_with_retry(runner.as_ref(), &job, retry, &cancel).await {
            Ok(()) => {
                info!("job succeeded {}", job);
                report.succeeded += 1;
            }
            Err(e) if e.is_cancelled() => {
                warn!("job cancelled {}", job);
                report.cancelled += 1;
            }
            Err(e) => {
                error!("job failed {} error={}", job, e);
                report.failed += 1;
            }
        }
    }
    report
}
