//! Tuning knobs for [`crate::worker::UploadFinalizationWorker`].

use std::sync::Arc;
use std::time::Duration;

use upload_core::ports::{BackoffPolicy, RetryConfig};

/// Configuration for the finalization worker's run loop and retry behavior.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Maximum number of jobs processed concurrently.
    pub concurrency: usize,
    /// How long to sleep when the worker is at capacity before re-checking.
    pub capacity_poll: Duration,
    /// How often `stop()` polls the in-flight counter while draining.
    pub drain_poll: Duration,
    /// Delay applied after consecutive empty `list_due` polls.
    pub idle_backoff: Arc<dyn BackoffPolicy>,
    /// Retry envelope applied once at the boundary around each job-store or
    /// orchestrator call; ports themselves are not retried internally.
    pub io_retry: RetryConfig,
    /// Delay applied before a job's next attempt after a retriable outcome.
    pub job_retry_delay: Arc<dyn BackoffPolicy>,
    /// Attempts beyond which a job is marked permanently failed rather than
    /// rescheduled.
    pub max_job_attempts: u32,
    /// Lease duration granted to a worker that claims a job.
    pub lease_duration: Duration,
}

impl WorkerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `concurrency` is zero or the inner `io_retry`
    /// configuration is itself invalid.
    pub fn validate(&self) -> Result<(), upload_core::PortError> {
        if self.concurrency == 0 {
            return Err(upload_core::PortError::Invalid {
                operation: "worker_config",
                message: "concurrency must be >= 1".to_string(),
            });
        }
        self.io_retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upload_test_support::FixedDelayBackoffPolicy;

    fn config() -> WorkerConfig {
        WorkerConfig {
            concurrency: 4,
            capacity_poll: Duration::from_millis(50),
            drain_poll: Duration::from_millis(50),
            idle_backoff: Arc::new(FixedDelayBackoffPolicy::new(Duration::from_millis(100))),
            io_retry: RetryConfig {
                max_attempts: 3,
                delay: Arc::new(FixedDelayBackoffPolicy::new(Duration::from_millis(10))),
                max_elapsed: None,
            },
            job_retry_delay: Arc::new(FixedDelayBackoffPolicy::new(Duration::from_millis(200))),
            max_job_attempts: 5,
            lease_duration: Duration::from_secs(30),
        }
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut cfg = config();
        cfg.concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_max_attempts_is_rejected_via_io_retry() {
        let mut cfg = config();
        cfg.io_retry.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn well_formed_config_validates() {
        assert!(config().validate().is_ok());
    }
}
