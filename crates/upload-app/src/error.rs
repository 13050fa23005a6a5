//! # Design
//!
//! - Centralize application-level errors for bootstrap and orchestration.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: upload_config::ConfigError,
    },
    /// Telemetry initialization failed. Carries a rendered message rather
    /// than `anyhow::Error` directly, since `anyhow::Error` does not
    /// implement `std::error::Error` itself.
    #[error("telemetry operation failed: {operation}: {message}")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Rendered source error detail.
        message: String,
    },
    /// Constructing the configured store backend failed.
    #[error("store backend construction failed: {operation}: {message}")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Rendered source error detail.
        message: String,
    },
    /// The worker's configuration failed validation.
    #[error("invalid worker configuration")]
    InvalidWorkerConfig {
        /// Source port error describing the invalid field.
        source: upload_core::PortError,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: upload_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) fn telemetry(operation: &'static str, source: impl std::fmt::Display) -> Self {
        Self::Telemetry {
            operation,
            message: source.to_string(),
        }
    }

    pub(crate) fn store(operation: &'static str, source: impl std::fmt::Display) -> Self {
        Self::Store {
            operation,
            message: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "load",
            upload_config::ConfigError::Invalid {
                section: "worker",
                field: "concurrency",
                message: "must be >= 1".to_string(),
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
        assert!(config.source().is_some());

        let telemetry = AppError::telemetry("metrics_init", "registration failed");
        assert!(matches!(telemetry, AppError::Telemetry { .. }));
        assert!(telemetry.to_string().contains("registration failed"));

        let store = AppError::store("connect", "connection refused");
        assert!(matches!(store, AppError::Store { .. }));
    }
}
