//! Mapping from `sqlx` failures onto the port error taxonomy.

use upload_core::error::PortError;

/// Classify a `sqlx` failure into the port error taxonomy so callers can
/// decide whether to retry without depending on `sqlx` themselves.
pub fn map_sqlx_error(operation: &'static str, source: sqlx::Error) -> PortError {
    match source {
        sqlx::Error::PoolTimedOut => PortError::Timeout { operation },
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            PortError::Unavailable {
                operation,
                source: Box::new(source),
            }
        }
        sqlx::Error::Database(ref db) if is_transient(db.as_ref()) => PortError::Unavailable {
            operation,
            source: Box::new(source),
        },
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => PortError::Invalid {
            operation,
            message: source.to_string(),
        },
        other => PortError::Unavailable {
            operation,
            source: Box::new(other),
        },
    }
}

/// Best-effort classification of a Postgres error as transient infrastructure
/// trouble (connection reset, serialization failure, deadlock) versus a
/// structural problem in the query itself.
fn is_transient(error: &(dyn sqlx::error::DatabaseError + 'static)) -> bool {
    matches!(
        error.code().as_deref(),
        Some("40001" | "40P01" | "08000" | "08003" | "08006" | "57P01")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_maps_to_port_timeout() {
        let mapped = map_sqlx_error("get", sqlx::Error::PoolTimedOut);
        assert!(matches!(mapped, PortError::Timeout { operation: "get" }));
    }

    #[test]
    fn row_not_found_maps_to_unavailable_by_default() {
        let mapped = map_sqlx_error("get", sqlx::Error::RowNotFound);
        assert!(mapped.is_retriable());
    }
}
