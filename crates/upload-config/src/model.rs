//! Typed configuration models assembled by [`crate::loader`].
//!
//! # Design
//! - Pure data carriers; no IO. Defaults live in `defaults.rs`, assembly in `loader.rs`.
//! - Every section implements `Default` from the compiled-in constants so a caller can
//!   construct a well-formed `AppConfig` without a file or environment at all.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_BUCKET, DEFAULT_CAPACITY_POLL_MS, DEFAULT_CONCURRENCY, DEFAULT_DRAIN_POLL_MS,
    DEFAULT_FINAL_PREFIX, DEFAULT_IDLE_BACKOFF_INITIAL_MS, DEFAULT_IDLE_BACKOFF_MAX_MS,
    DEFAULT_IO_RETRY_BASE_DELAY_MS, DEFAULT_IO_RETRY_MAX_ATTEMPTS,
    DEFAULT_IO_RETRY_MAX_DELAY_MS, DEFAULT_IO_RETRY_MAX_ELAPSED_SECS,
    DEFAULT_JOB_RETRY_BASE_DELAY_MS, DEFAULT_JOB_RETRY_MAX_DELAY_MS, DEFAULT_KEY_SPACE,
    DEFAULT_LEASE_DURATION_SECS, DEFAULT_LOG_LEVEL, DEFAULT_MAX_JOB_ATTEMPTS,
    DEFAULT_PRESIGN_EXPIRES_SECONDS, DEFAULT_STAGING_PREFIX,
};

/// Top-level configuration handed to the worker and stores at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Finalization worker tuning knobs.
    pub worker: WorkerSettings,
    /// Storage backend selection and connection details.
    pub store: StoreSettings,
    /// Presigned-upload and object-location settings.
    pub presign: PresignSettings,
    /// Logging configuration.
    pub telemetry: TelemetrySettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker: WorkerSettings::default(),
            store: StoreSettings::default(),
            presign: PresignSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

/// Delay progression applied across attempts, convertible to a
/// [`upload_core::ports::BackoffPolicy`] by [`crate::backoff::StaticBackoffPolicy`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffSettings {
    /// Delay used for the first attempt, and the starting point the
    /// `linear`/`exponential` strategies grow from.
    pub base_ms: u64,
    /// Floor every composed delay (post-jitter) is clamped to.
    pub min_ms: u64,
    /// Ceiling every composed delay (post-jitter) is clamped to.
    pub max_ms: u64,
    /// How the delay grows across attempts.
    pub strategy: BackoffStrategy,
    /// Randomization applied on top of the strategy's raw delay.
    pub jitter: JitterStrategy,
}

impl BackoffSettings {
    #[must_use]
    /// Base delay as a [`Duration`].
    pub const fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    #[must_use]
    /// Minimum delay as a [`Duration`].
    pub const fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    #[must_use]
    /// Maximum delay as a [`Duration`].
    pub const fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Plain exponential doubling with no jitter, the shape every compiled-in
    /// default in this module used before per-strategy/jitter selection existed.
    #[must_use]
    pub const fn exponential(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            min_ms: 0,
            max_ms,
            strategy: BackoffStrategy::Exponential { factor: 2.0 },
            jitter: JitterStrategy::None,
        }
    }
}

/// How a [`BackoffSettings`]'s raw delay grows across attempts, per
/// `BackoffPolicy.getDelay(attempt)`'s strategy taxonomy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// The same delay on every attempt.
    Constant,
    /// `base + increment * (attempt - 1)`.
    Linear {
        /// Amount added per attempt beyond the first.
        increment_ms: u64,
    },
    /// `base * factor^(attempt - 1)`.
    Exponential {
        /// Growth factor applied per attempt. The canonical default is `2.0`.
        factor: f64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential { factor: 2.0 }
    }
}

/// Randomization layered on top of a [`BackoffStrategy`]'s raw delay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No randomization; the raw delay is used as-is.
    #[default]
    None,
    /// Uniform over `[0, delay]`.
    Full,
    /// Uniform over `[delay / 2, delay]`.
    Equal,
    /// Uniform over `[min, delay * 3]`, decorrelated from the prior delay.
    Decorrelated,
}

/// Tuning knobs for [`upload_worker::UploadFinalizationWorker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Maximum number of finalize jobs processed concurrently.
    pub concurrency: usize,
    /// How long to sleep when at capacity before re-checking.
    pub capacity_poll_ms: u64,
    /// How often `stop()` polls the in-flight counter while draining.
    pub drain_poll_ms: u64,
    /// Backoff applied after consecutive empty `list_due` polls.
    pub idle_backoff: BackoffSettings,
    /// Retry envelope applied at the boundary around job-store/orchestrator calls.
    pub io_retry: IoRetrySettings,
    /// Backoff applied before a job's next attempt after a retriable outcome.
    pub job_retry: BackoffSettings,
    /// Attempts beyond which a job is marked permanently failed.
    pub max_job_attempts: u32,
    /// Lease duration granted to a worker that claims a job.
    pub lease_duration_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            capacity_poll_ms: DEFAULT_CAPACITY_POLL_MS,
            drain_poll_ms: DEFAULT_DRAIN_POLL_MS,
            idle_backoff: BackoffSettings::exponential(
                DEFAULT_IDLE_BACKOFF_INITIAL_MS,
                DEFAULT_IDLE_BACKOFF_MAX_MS,
            ),
            io_retry: IoRetrySettings::default(),
            job_retry: BackoffSettings::exponential(
                DEFAULT_JOB_RETRY_BASE_DELAY_MS,
                DEFAULT_JOB_RETRY_MAX_DELAY_MS,
            ),
            max_job_attempts: DEFAULT_MAX_JOB_ATTEMPTS,
            lease_duration_secs: DEFAULT_LEASE_DURATION_SECS,
        }
    }
}

impl WorkerSettings {
    #[must_use]
    /// Lease duration as a [`Duration`].
    pub const fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    #[must_use]
    /// Capacity-poll interval as a [`Duration`].
    pub const fn capacity_poll(&self) -> Duration {
        Duration::from_millis(self.capacity_poll_ms)
    }

    #[must_use]
    /// Drain-poll interval as a [`Duration`].
    pub const fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.drain_poll_ms)
    }
}

/// The io-boundary retry envelope, separate from the job-level retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IoRetrySettings {
    /// Maximum number of attempts, inclusive of the first.
    pub max_attempts: u32,
    /// Base delay before doubling.
    pub base_delay_ms: u64,
    /// Ceiling applied to the doubled delay.
    pub max_delay_ms: u64,
    /// Ceiling on total elapsed wall time across all attempts, in seconds.
    /// Zero means unbounded.
    pub max_elapsed_secs: u64,
}

impl Default for IoRetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_IO_RETRY_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_IO_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_IO_RETRY_MAX_DELAY_MS,
            max_elapsed_secs: DEFAULT_IO_RETRY_MAX_ELAPSED_SECS,
        }
    }
}

impl IoRetrySettings {
    #[must_use]
    /// The configured ceiling on total elapsed wall time, if any.
    pub const fn max_elapsed(&self) -> Option<Duration> {
        if self.max_elapsed_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.max_elapsed_secs))
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, non-durable store. Used for the CLI demo mode.
    InMemory,
    /// `PostgreSQL`-backed durable store.
    Postgres,
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::InMemory
    }
}

impl StoreBackend {
    #[must_use]
    /// Render the backend as its lowercase string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "in_memory",
            Self::Postgres => "postgres",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_memory" | "memory" | "inmemory" => Ok(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Which backend implementation to construct.
    pub backend: StoreBackend,
    /// Connection string, required when `backend` is [`StoreBackend::Postgres`].
    pub database_url: Option<String>,
    /// Key prefix shared by every record this deployment writes, so multiple
    /// tenants can share one physical backend.
    pub key_space: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            key_space: DEFAULT_KEY_SPACE.to_string(),
        }
    }
}

/// Presigned-upload and object-location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresignSettings {
    /// Bucket (or bucket-equivalent namespace) objects are written to.
    pub bucket: String,
    /// Key prefix for not-yet-finalized client uploads.
    pub staging_prefix: String,
    /// Key prefix for finalized, promoted objects.
    pub final_prefix: String,
    /// Default presigned-URL lifetime handed to `createUpload` callers that
    /// don't specify their own.
    pub default_expires_in_seconds: u32,
}

impl Default for PresignSettings {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            staging_prefix: DEFAULT_STAGING_PREFIX.to_string(),
            final_prefix: DEFAULT_FINAL_PREFIX.to_string(),
            default_expires_in_seconds: DEFAULT_PRESIGN_EXPIRES_SECONDS,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetrySettings {
    /// `tracing-subscriber` env-filter directive, e.g. `"info"` or `"upload_worker=debug"`.
    pub log_level: String,
    /// Emit newline-delimited JSON instead of human-readable text.
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
        }
    }
}
