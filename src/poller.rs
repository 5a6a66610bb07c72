//! Drives a deferred backend job to a terminal state.
//!
//! Each tick queries the backend once. `Pending`/`Running` answers sleep for the
//! configured interval and try again until `max_attempts` polls have been
//! spent, at which point the job is `TimedOut`. Backoff is fixed, with no jitter.

use crate::backends::payload::AnalysisPayload;
use crate::config::PollerConfig;
use crate::engine::{JobStatus, RecognitionBackend, RecognitionJob};
use crate::error::OcrError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Waits between polls. Swapped out in tests to avoid wall-clock delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone)]
pub struct Poller {
    interval: Duration,
    max_attempts: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl Poller {
    pub fn new(config: &PollerConfig) -> Self {
        Self {
            interval: config.interval,
            max_attempts: config.max_attempts.max(1),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll `job` until it succeeds, fails or runs out of attempts.
    ///
    /// `job.attempt` counts the status queries performed and `job.status`
    /// holds the last observed state, `TimedOut` included.
    pub async fn run(
        &self,
        backend: &dyn RecognitionBackend,
        job: &mut RecognitionJob,
    ) -> Result<AnalysisPayload, OcrError> {
        loop {
            let report = backend.poll_status(&job.handle).await?;
            job.attempt += 1;
            job.status = report.status;

            tracing::debug!(
                "Operation {} poll {}/{}: {:?}",
                job.handle,
                job.attempt,
                self.max_attempts,
                report.status
            );

            match report.status {
                JobStatus::Succeeded => {
                    tracing::info!(
                        "Operation {} succeeded after {} poll(s)",
                        job.handle,
                        job.attempt
                    );
                    return report.payload.ok_or_else(|| {
                        OcrError::Protocol(format!(
                            "Operation {} succeeded without a result payload",
                            job.handle
                        ))
                    });
                }
                JobStatus::Failed => {
                    tracing::warn!("Operation {} reported failure", job.handle);
                    return Err(OcrError::BackendAnalysis(format!(
                        "operation {} failed",
                        job.handle
                    )));
                }
                JobStatus::Pending | JobStatus::Running => {
                    if job.attempt >= self.max_attempts {
                        job.status = JobStatus::TimedOut;
                        tracing::warn!(
                            "Operation {} still {:?} after {} poll(s), giving up",
                            job.handle,
                            report.status,
                            job.attempt
                        );
                        return Err(OcrError::Timeout {
                            attempts: job.attempt,
                        });
                    }
                    self.sleeper.sleep(self.interval).await;
                }
                JobStatus::TimedOut => {
                    return Err(OcrError::Protocol(format!(
                        "Backend reported client-side state {:?} for operation {}",
                        report.status, job.handle
                    )));
                }
            }
        }
    }
}
