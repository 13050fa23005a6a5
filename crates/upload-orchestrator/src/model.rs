//! Request/outcome types for the orchestrator façade.
//!
//! # Design
//! - Every operation outcome is a tagged enum, never an exception, for
//!   anticipated business outcomes (state conflict, not-found, already-done).
//! - Keep these types free of store or port details; callers on the HTTP
//!   side map them straight onto status codes.

use chrono::{DateTime, Utc};
use upload_core::model::StorageLocation;
use upload_core::UploadId;

/// Inputs accepted by [`crate::service::UploadOrchestrator::create_upload`].
#[derive(Debug, Clone)]
pub struct CreateUploadInput {
    /// Filename supplied by the client, if known up front.
    pub filename: Option<String>,
    /// Content type supplied by the client, if known up front.
    pub content_type: Option<String>,
    /// Expected size in bytes, if supplied.
    pub expected_size_bytes: Option<u64>,
    /// How long the presigned upload URL should remain valid.
    pub presign_expires_in_seconds: u64,
}

/// Successful outcome of `create_upload`. Creation only has one outcome: the
/// upstream `create` failure path surfaces as `Err(OrchestratorError)`
/// because a fresh id can never collide.
#[derive(Debug, Clone)]
pub struct CreateUploadOutcome {
    /// Identifier assigned to the new upload.
    pub upload_id: UploadId,
    /// URL the client should PUT bytes to.
    pub presigned_url: String,
    /// Staging location the presigned URL targets.
    pub staging: StorageLocation,
    /// When the presigned URL stops being valid.
    pub expires_at: DateTime<Utc>,
}

/// Outcome of `complete_upload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteUploadOutcome {
    /// A finalize job was enqueued.
    Queued,
    /// The upload was already queued, processing, or (harmlessly) re-requested.
    AlreadyQueued,
    /// The upload had already reached `finalized`.
    Finalized,
    /// The upload had already reached `failed`.
    Failed {
        /// The upload's recorded failure reason.
        reason: String,
    },
    /// No record exists for the given id.
    NotFound,
}

/// Outcome of `finalize_upload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The upload reached `finalized` on this call.
    Finalized,
    /// The upload had already reached `finalized`; at-least-once no-op.
    AlreadyFinalized,
    /// A permanent failure; the worker should not reschedule.
    Failed {
        /// Reason the finalize attempt failed permanently.
        reason: String,
    },
    /// A transient condition; the worker should reschedule.
    Retry {
        /// Reason the finalize attempt should be retried.
        reason: String,
    },
    /// No record exists for the job's upload id.
    NotFound,
}

/// Deterministic variant-filename derivation.
///
/// `variant == "original"` keeps the filename unchanged. Otherwise the
/// variant name is inserted immediately before the last `.` in the
/// filename, or appended with a `-` if there is no extension.
#[must_use]
pub fn variant_filename(filename: &str, variant: &str) -> String {
    if variant == "original" {
        return filename.to_string();
    }
    match filename.rfind('.') {
        Some(i) => format!("{}-{variant}{}", &filename[..i], &filename[i..]),
        None => format!("{filename}-{variant}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_variant_keeps_the_filename_unchanged() {
        assert_eq!(variant_filename("photo.jpg", "original"), "photo.jpg");
    }

    #[test]
    fn non_original_variant_is_inserted_before_the_last_extension() {
        assert_eq!(variant_filename("photo.jpg", "thumbnail"), "photo-thumbnail.jpg");
        assert_eq!(
            variant_filename("photo.2024.jpg", "thumbnail"),
            "photo.2024-thumbnail.jpg"
        );
    }

    #[test]
    fn filename_without_an_extension_gets_a_dash_suffix() {
        assert_eq!(variant_filename("photo", "preview"), "photo-preview");
    }

    #[test]
    fn leading_dot_still_counts_as_the_last_dot() {
        assert_eq!(variant_filename(".env", "thumbnail"), "-thumbnail.env");
    }
}
