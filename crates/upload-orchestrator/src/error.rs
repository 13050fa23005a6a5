//! Error types for the upload orchestrator.
//!
//! # Design
//! - The orchestrator's four operations return tagged outcomes for every
//!   anticipated business result; this type only surfaces unanticipated
//!   backend failures (a store or port genuinely misbehaving).

use thiserror::Error;
use upload_core::PortError;
use upload_store::StoreError;

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Escape hatch for failures the orchestrator's tagged outcomes don't model:
/// genuine backend trouble rather than an anticipated business result.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The upload metadata store failed.
    #[error("upload metadata store failed")]
    Metadata(#[source] StoreError),
    /// The job queue failed.
    #[error("job queue failed")]
    Jobs(#[source] StoreError),
    /// The object store failed.
    #[error("object store failed")]
    Objects(#[source] StoreError),
    /// The image processor failed.
    #[error("image processor failed")]
    Processor(#[source] PortError),
}
