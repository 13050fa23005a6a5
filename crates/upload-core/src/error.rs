//! Error types for the abstract ports the core consumes.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Result alias for port operations.
pub type PortResult<T> = std::result::Result<T, PortError>;

/// Errors a port implementation may raise. Partitioned by recovery class so
/// callers (the worker's `ioRetry` envelope in particular) can decide whether
/// to retry without inspecting implementation-specific detail.
#[derive(Debug)]
pub enum PortError {
    /// The backend is transiently unavailable (connection reset, 5xx, etc).
    Unavailable {
        /// Name of the operation that failed.
        operation: &'static str,
        /// Underlying failure.
        source: Box<dyn Error + Send + Sync>,
    },
    /// The operation exceeded its allotted time budget.
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
    },
    /// The request was structurally invalid and retrying will not help.
    Invalid {
        /// Name of the operation that was rejected.
        operation: &'static str,
        /// Human-readable detail.
        message: String,
    },
}

impl Display for PortError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { operation, .. } => {
                write!(formatter, "port operation '{operation}' unavailable")
            }
            Self::Timeout { operation } => {
                write!(formatter, "port operation '{operation}' timed out")
            }
            Self::Invalid { operation, message } => {
                write!(formatter, "port operation '{operation}' invalid: {message}")
            }
        }
    }
}

impl Error for PortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable { source, .. } => Some(source.as_ref()),
            Self::Timeout { .. } | Self::Invalid { .. } => None,
        }
    }
}

impl PortError {
    /// True when the failure is transient infrastructure trouble, i.e. the
    /// kind of failure `ioRetry` should retry.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}
