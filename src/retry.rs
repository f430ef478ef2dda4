//! Bounded retries with linear backoff around a single job attempt.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::config::RETRY_BACKOFF_STEP;
use crate::error::HarvestError;
use crate::job::Job;

/// Runs one attempt of a job.
///
/// The pool and the retry loop only see this trait, so tests can drive them
/// without a network.
pub trait JobRunner: Send + Sync {
    fn run(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), HarvestError>> + Send;
}

/// How many times a failed job is tried again, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_step: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_step: RETRY_BACKOFF_STEP,
        }
    }

    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    /// Delay before attempt `attempt` (0-based). The first attempt never waits.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Runs `job` through `runner` up to `max_retries + 1` times.
///
/// Errors that another attempt cannot fix (see [`HarvestError::is_retryable`])
/// are returned as they are. When every attempt failed the last error is
/// wrapped in [`HarvestError::RetriesExhausted`].
pub async fn run_with_retry<R: JobRunner>(
    runner: &R,
    job: &Job,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(), HarvestError> {
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let backoff = policy.backoff(attempt);
            warn!(
                "retrying {} attempt={} max_attempts={} backoff={:?}",
                job,
                attempt + 1,
                max_attempts,
                backoff
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }

        let err = match runner.run(job, cancel).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        if !err.is_retryable() {
            return Err(err);
        }
        debug!("{} attempt={} failed: {}", job, attempt + 1, err);

        attempt += 1;
        if attempt >= max_attempts {
            return Err(HarvestError::RetriesExhausted {
                attempts: max_attempts,
                last: Box::new(err),
            });
        }
    }
}
