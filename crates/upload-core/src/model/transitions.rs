//! Pure state-machine edge checks for [`super::UploadRecord`].
//!
//! These functions decide whether a requested transition is legal, idempotent,
//! or invalid; they never touch storage. The metadata store layers CAS writes
//! on top of the decision returned here.

use super::{StorageLocation, UploadRecord};

/// Result of checking whether a transition may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionCheck {
    /// The transition is legal and should be written.
    Proceed,
    /// The record already reflects the requested transition; no write needed.
    Already,
    /// The transition is not legal from the current state.
    Invalid {
        /// States from which the transition would have been legal.
        expected: Vec<&'static str>,
        /// The state the record was actually found in.
        actual: &'static str,
    },
}

/// Check `awaiting_upload -> queued`.
#[must_use]
pub fn check_mark_queued(current: &UploadRecord) -> TransitionCheck {
    match current {
        UploadRecord::AwaitingUpload { .. } => TransitionCheck::Proceed,
        UploadRecord::Queued { .. } => TransitionCheck::Already,
        other => TransitionCheck::Invalid {
            expected: vec!["awaiting_upload", "queued"],
            actual: other.status_name(),
        },
    }
}

/// Check `queued -> processing`, idempotent only when `filename` matches.
#[must_use]
pub fn check_mark_processing(current: &UploadRecord, filename: &str) -> TransitionCheck {
    match current {
        UploadRecord::Queued { .. } => TransitionCheck::Proceed,
        UploadRecord::Processing {
            filename: existing, ..
        } if existing == filename => TransitionCheck::Already,
        other => TransitionCheck::Invalid {
            expected: vec!["queued", "processing"],
            actual: other.status_name(),
        },
    }
}

/// Check `processing -> finalized`, idempotent only on an exact match of the
/// final location and size.
#[must_use]
pub fn check_mark_finalized(
    current: &UploadRecord,
    final_location: &StorageLocation,
    actual_size_bytes: u64,
) -> TransitionCheck {
    match current {
        UploadRecord::Processing { .. } => TransitionCheck::Proceed,
        UploadRecord::Finalized {
            final_location: existing_location,
            actual_size_bytes: existing_size,
            ..
        } if existing_location == final_location && *existing_size == actual_size_bytes => {
            TransitionCheck::Already
        }
        other => TransitionCheck::Invalid {
            expected: vec!["processing", "finalized"],
            actual: other.status_name(),
        },
    }
}

/// Check `processing -> failed`, idempotent only when `reason` matches.
#[must_use]
pub fn check_mark_failed(current: &UploadRecord, reason: &str) -> TransitionCheck {
    match current {
        UploadRecord::Processing { .. } => TransitionCheck::Proceed,
        UploadRecord::Failed {
            failure_reason: existing,
            ..
        } if existing == reason => TransitionCheck::Already,
        other => TransitionCheck::Invalid {
            expected: vec!["processing", "failed"],
            actual: other.status_name(),
        },
    }
}
