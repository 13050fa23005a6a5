//! Compiled-in defaults for every configuration section.
//!
//! # Design
//! - Centralize default values so file/env overrides have a single source of truth.
//! - Keep retry/backoff defaults conservative; operators tune them per deployment.

pub(crate) const DEFAULT_CONCURRENCY: usize = 4;
pub(crate) const DEFAULT_CAPACITY_POLL_MS: u64 = 200;
pub(crate) const DEFAULT_DRAIN_POLL_MS: u64 = 100;
pub(crate) const DEFAULT_IDLE_BACKOFF_INITIAL_MS: u64 = 250;
pub(crate) const DEFAULT_IDLE_BACKOFF_MAX_MS: u64 = 30_000;
pub(crate) const DEFAULT_IO_RETRY_MAX_ATTEMPTS: u32 = 5;
pub(crate) const DEFAULT_IO_RETRY_BASE_DELAY_MS: u64 = 100;
pub(crate) const DEFAULT_IO_RETRY_MAX_DELAY_MS: u64 = 5_000;
pub(crate) const DEFAULT_IO_RETRY_MAX_ELAPSED_SECS: u64 = 30;
pub(crate) const DEFAULT_JOB_RETRY_BASE_DELAY_MS: u64 = 1_000;
pub(crate) const DEFAULT_JOB_RETRY_MAX_DELAY_MS: u64 = 300_000;
pub(crate) const DEFAULT_MAX_JOB_ATTEMPTS: u32 = 8;
pub(crate) const DEFAULT_LEASE_DURATION_SECS: u64 = 30;

pub(crate) const DEFAULT_KEY_SPACE: &str = "upload";
pub(crate) const DEFAULT_BUCKET: &str = "uploads";
pub(crate) const DEFAULT_STAGING_PREFIX: &str = "staging";
pub(crate) const DEFAULT_FINAL_PREFIX: &str = "final";
pub(crate) const DEFAULT_PRESIGN_EXPIRES_SECONDS: u32 = 900;

pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";

/// Prefix applied to every environment-variable override.
pub const ENV_PREFIX: &str = "UPLOAD_";
