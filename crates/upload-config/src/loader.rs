//! Assembles an [`AppConfig`] from compiled-in defaults, an optional file, and
//! environment-variable overrides, in that order, then validates the result.

use std::env::VarError;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::defaults::ENV_PREFIX;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, StoreBackend};
use crate::validate;

/// Name of the environment variable that points at an optional config file,
/// consulted when [`load`] is not given an explicit path.
pub const CONFIG_FILE_ENV_VAR: &str = "UPLOAD_CONFIG_FILE";

/// Build the effective configuration: defaults, then an optional file found
/// either at `file_path` or via `UPLOAD_CONFIG_FILE`, then `UPLOAD_*`
/// environment overrides, then validation.
///
/// Any failure here -- an unreadable file, a malformed value, a value that
/// fails validation -- is returned to the caller as a startup-time error.
/// None of this is meant to be retried; callers should treat `Err` as fatal.
pub fn load(file_path: Option<&Path>) -> ConfigResult<AppConfig> {
    let mut config = AppConfig::default();

    let resolved_path = match file_path {
        Some(path) => Some(path.to_path_buf()),
        None => env_path(CONFIG_FILE_ENV_VAR)?,
    };
    if let Some(path) = resolved_path {
        config = load_file(&path)?;
    }

    apply_env_overrides(&mut config)?;
    validate::validate(&config)?;
    Ok(config)
}

/// Parse a configuration file by its extension (`.toml`, `.yaml`/`.yml`).
///
/// Sections and fields the file omits fall back to `AppConfig`'s own
/// `#[serde(default)]` rather than to a caller-supplied base: every section
/// type implements `Default` from the same compiled-in constants `load`
/// starts from, so the effective result is identical either way, but there
/// is no general merge-onto-an-arbitrary-base behavior here.
fn load_file(path: &Path) -> ConfigResult<AppConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let format = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(str::to_ascii_lowercase);

    match format.as_deref() {
        Some("toml") => toml::from_str(&contents).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            format: "toml",
            message: err.to_string(),
        }),
        Some("yaml" | "yml") => {
            serde_yaml::from_str(&contents).map_err(|err| ConfigError::Parse {
                path: path.to_path_buf(),
                format: "yaml",
                message: err.to_string(),
            })
        }
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Overlay `UPLOAD_*` environment variables onto an already-assembled config.
///
/// Each field is looked up independently rather than deserialized as a whole,
/// matching the rest of this codebase's ad-hoc `std::env::var` bootstrap
/// lookups: there is no section-wide env schema to keep in sync.
fn apply_env_overrides(config: &mut AppConfig) -> ConfigResult<()> {
    if let Some(value) = env_usize("WORKER_CONCURRENCY")? {
        config.worker.concurrency = value;
    }
    if let Some(value) = env_u64("WORKER_CAPACITY_POLL_MS")? {
        config.worker.capacity_poll_ms = value;
    }
    if let Some(value) = env_u64("WORKER_DRAIN_POLL_MS")? {
        config.worker.drain_poll_ms = value;
    }
    if let Some(value) = env_u64("WORKER_IDLE_BACKOFF_INITIAL_MS")? {
        config.worker.idle_backoff.base_ms = value;
    }
    if let Some(value) = env_u64("WORKER_IDLE_BACKOFF_MAX_MS")? {
        config.worker.idle_backoff.max_ms = value;
    }
    if let Some(value) = env_u32("WORKER_IO_RETRY_MAX_ATTEMPTS")? {
        config.worker.io_retry.max_attempts = value;
    }
    if let Some(value) = env_u64("WORKER_IO_RETRY_BASE_DELAY_MS")? {
        config.worker.io_retry.base_delay_ms = value;
    }
    if let Some(value) = env_u64("WORKER_IO_RETRY_MAX_DELAY_MS")? {
        config.worker.io_retry.max_delay_ms = value;
    }
    if let Some(value) = env_u64("WORKER_IO_RETRY_MAX_ELAPSED_SECS")? {
        config.worker.io_retry.max_elapsed_secs = value;
    }
    if let Some(value) = env_u64("WORKER_JOB_RETRY_BASE_DELAY_MS")? {
        config.worker.job_retry.base_ms = value;
    }
    if let Some(value) = env_u64("WORKER_JOB_RETRY_MAX_DELAY_MS")? {
        config.worker.job_retry.max_ms = value;
    }
    if let Some(value) = env_u32("WORKER_MAX_JOB_ATTEMPTS")? {
        config.worker.max_job_attempts = value;
    }
    if let Some(value) = env_u64("WORKER_LEASE_DURATION_SECS")? {
        config.worker.lease_duration_secs = value;
    }

    if let Some(value) = env_parsed::<StoreBackend>("STORE_BACKEND")? {
        config.store.backend = value;
    }
    if let Some(value) = env_string("STORE_DATABASE_URL")? {
        config.store.database_url = Some(value);
    }
    if let Some(value) = env_string("STORE_KEY_SPACE")? {
        config.store.key_space = value;
    }

    if let Some(value) = env_string("PRESIGN_BUCKET")? {
        config.presign.bucket = value;
    }
    if let Some(value) = env_string("PRESIGN_STAGING_PREFIX")? {
        config.presign.staging_prefix = value;
    }
    if let Some(value) = env_string("PRESIGN_FINAL_PREFIX")? {
        config.presign.final_prefix = value;
    }
    if let Some(value) = env_u32("PRESIGN_DEFAULT_EXPIRES_IN_SECONDS")? {
        config.presign.default_expires_in_seconds = value;
    }

    if let Some(value) = env_string("TELEMETRY_LOG_LEVEL")? {
        config.telemetry.log_level = value;
    }
    if let Some(value) = env_parsed::<bool>("TELEMETRY_JSON")? {
        config.telemetry.json = value;
    }

    Ok(())
}

fn env_var(suffix: &str) -> Result<Option<String>, VarError> {
    match std::env::var(format!("{ENV_PREFIX}{suffix}")) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(err @ VarError::NotUnicode(_)) => Err(err),
    }
}

fn env_string(suffix: &str) -> ConfigResult<Option<String>> {
    env_var(suffix).map_err(|err| env_error(suffix, &err))
}

fn env_path(var_name: &str) -> ConfigResult<Option<PathBuf>> {
    match std::env::var(var_name) {
        Ok(value) => Ok(Some(PathBuf::from(value))),
        Err(VarError::NotPresent) => Ok(None),
        Err(err) => Err(ConfigError::Env {
            var: var_name.to_string(),
            message: err.to_string(),
        }),
    }
}

fn env_parsed<T>(suffix: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(suffix)? {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| env_error(suffix, &err)),
        None => Ok(None),
    }
}

fn env_u64(suffix: &str) -> ConfigResult<Option<u64>> {
    env_parsed(suffix)
}

fn env_u32(suffix: &str) -> ConfigResult<Option<u32>> {
    env_parsed(suffix)
}

fn env_usize(suffix: &str) -> ConfigResult<Option<usize>> {
    env_parsed(suffix)
}

fn env_error(suffix: &str, message: &impl std::fmt::Display) -> ConfigError {
    ConfigError::Env {
        var: format!("{ENV_PREFIX}{suffix}"),
        message: message.to_string(),
    }
}
