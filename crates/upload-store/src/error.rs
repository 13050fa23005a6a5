//! Error types for the upload metadata store, job queue, and object store
//! policy layer.

use thiserror::Error;
use upload_core::PortError;

/// Result alias for store-layer operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the store layer. Distinct from [`PortError`] in that it
/// also captures failures above the port boundary: serialization and index
/// bookkeeping.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying port (key-value store, blob store, clock, ...) failed.
    #[error("port operation failed")]
    Port(#[from] PortError),

    /// A stored value could not be decoded back into its domain type.
    #[error("failed to deserialize stored value for {operation}")]
    Serialization {
        /// Operation identifier, for log correlation.
        operation: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// An upload or job identifier referenced by the caller does not exist.
    #[error("no record found for {operation} (key: {key})")]
    NotFound {
        /// Operation identifier, for log correlation.
        operation: &'static str,
        /// Key that was looked up.
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_error_converts_via_from() {
        let port = PortError::Timeout { operation: "get" };
        let store: StoreError = port.into();
        assert!(matches!(store, StoreError::Port(_)));
    }

    #[test]
    fn not_found_message_includes_key() {
        let err = StoreError::NotFound {
            operation: "get_upload",
            key: "uploads/up_123".to_string(),
        };
        assert!(err.to_string().contains("uploads/up_123"));
    }
}

