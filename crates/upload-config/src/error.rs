//! Error types for configuration loading and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file '{path}'")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The configuration file extension was not recognised.
    #[error("unsupported configuration file extension for '{path}'")]
    UnsupportedFormat {
        /// Path with the unrecognised extension.
        path: PathBuf,
    },

    /// The configuration file could not be parsed in its detected format.
    #[error("failed to parse configuration file '{path}' as {format}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Format that parsing was attempted in (`toml`, `yaml`).
        format: &'static str,
        /// Human-readable parser error detail.
        message: String,
    },

    /// An environment-variable override could not be parsed into the expected type.
    #[error("invalid value for environment variable '{var}'")]
    Env {
        /// Name of the offending environment variable.
        var: String,
        /// Human-readable parse error detail.
        message: String,
    },

    /// A field failed validation once the configuration was fully assembled.
    #[error("invalid value for '{field}' in '{section}': {message}")]
    Invalid {
        /// Section containing the invalid field.
        section: &'static str,
        /// Name of the invalid field.
        field: &'static str,
        /// Human-readable reason for rejection.
        message: String,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
