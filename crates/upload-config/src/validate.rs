//! Whole-configuration validation, run once after defaults/file/env are assembled.

use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, StoreBackend};

/// Validate every section of an assembled [`AppConfig`].
///
/// This runs after layering is complete, so error messages can assume the
/// value shown is the final, effective one regardless of which layer set it.
pub fn validate(config: &AppConfig) -> ConfigResult<()> {
    validate_concurrency(config.worker.concurrency)?;
    validate_max_job_attempts(config.worker.max_job_attempts)?;
    validate_io_retry_max_attempts(config.worker.io_retry.max_attempts)?;
    validate_lease_duration(config.worker.lease_duration_secs)?;
    validate_store(&config.store)?;
    validate_non_empty(config.presign.bucket.as_str(), "presign", "bucket")?;
    validate_non_empty(
        config.presign.staging_prefix.as_str(),
        "presign",
        "staging_prefix",
    )?;
    validate_non_empty(
        config.presign.final_prefix.as_str(),
        "presign",
        "final_prefix",
    )?;
    validate_presign_expiry(config.presign.default_expires_in_seconds)?;
    Ok(())
}

fn validate_concurrency(concurrency: usize) -> ConfigResult<()> {
    if concurrency == 0 {
        return Err(ConfigError::Invalid {
            section: "worker",
            field: "concurrency",
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_max_job_attempts(max_job_attempts: u32) -> ConfigResult<()> {
    if max_job_attempts == 0 {
        return Err(ConfigError::Invalid {
            section: "worker",
            field: "max_job_attempts",
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_io_retry_max_attempts(max_attempts: u32) -> ConfigResult<()> {
    if max_attempts == 0 {
        return Err(ConfigError::Invalid {
            section: "worker.io_retry",
            field: "max_attempts",
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn validate_lease_duration(lease_duration_secs: u64) -> ConfigResult<()> {
    if lease_duration_secs == 0 {
        return Err(ConfigError::Invalid {
            section: "worker",
            field: "lease_duration_secs",
            message: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

fn validate_store(store: &crate::model::StoreSettings) -> ConfigResult<()> {
    validate_non_empty(store.key_space.as_str(), "store", "key_space")?;
    if matches!(store.backend, StoreBackend::Postgres)
        && store
            .database_url
            .as_deref()
            .is_none_or(str::is_empty)
    {
        return Err(ConfigError::Invalid {
            section: "store",
            field: "database_url",
            message: "required when backend is 'postgres'".to_string(),
        });
    }
    Ok(())
}

fn validate_presign_expiry(seconds: u32) -> ConfigResult<()> {
    if seconds == 0 {
        return Err(ConfigError::Invalid {
            section: "presign",
            field: "default_expires_in_seconds",
            message: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

fn validate_non_empty(value: &str, section: &'static str, field: &'static str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid {
            section,
            field,
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}
