//! Core upload domain types: identifiers, the upload state machine, and the
//! finalize job queue's record shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, prefixed identifier for an upload record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    const PREFIX: &'static str = "upload_";

    /// Generate a fresh, randomly assigned identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    /// Parse an identifier from its wire representation, validating the prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` does not carry the `upload_` prefix.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let raw = raw.into();
        if raw.starts_with(Self::PREFIX) && raw.len() > Self::PREFIX.len() {
            Ok(Self(raw))
        } else {
            Err(InvalidIdentifier {
                kind: "upload_id",
                value: raw,
            })
        }
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, prefixed identifier for a finalize job record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    const PREFIX: &'static str = "job_";

    /// Generate a fresh, randomly assigned identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    /// Parse an identifier from its wire representation, validating the prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` does not carry the `job_` prefix.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let raw = raw.into();
        if raw.starts_with(Self::PREFIX) && raw.len() > Self::PREFIX.len() {
            Ok(Self(raw))
        } else {
            Err(InvalidIdentifier {
                kind: "job_id",
                value: raw,
            })
        }
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raised when a prefixed identifier fails structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIdentifier {
    /// Which identifier kind failed validation.
    pub kind: &'static str,
    /// The raw value that was rejected.
    pub value: String,
}

impl std::fmt::Display for InvalidIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for InvalidIdentifier {}

/// A bucket/key pair addressing an object inside the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    /// Bucket (or bucket-equivalent namespace) containing the object.
    pub bucket: String,
    /// Key of the object within the bucket.
    pub key: String,
}

/// The upload lifecycle, modeled as a tagged union over `status`.
///
/// Only `awaiting_upload -> queued -> processing -> {finalized | failed}` are
/// legal edges; `finalized` and `failed` are terminal. See
/// [`crate::model::transitions`] for the authoritative edge checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadRecord {
    /// Initial state after a presigned URL has been issued.
    AwaitingUpload {
        /// Identifier of the upload.
        id: UploadId,
        /// Staging location the client is expected to PUT into.
        staging: StorageLocation,
        /// Filename supplied at creation time, if any.
        filename: Option<String>,
        /// Content type supplied at creation time, if any.
        content_type: Option<String>,
        /// Expected size in bytes, if supplied.
        expected_size_bytes: Option<u64>,
        /// Creation timestamp.
        created_at: DateTime<Utc>,
        /// Last-modified timestamp.
        updated_at: DateTime<Utc>,
    },
    /// The client signalled completion; a finalize job has been enqueued.
    Queued {
        /// Identifier of the upload.
        id: UploadId,
        /// Staging location the client PUT into.
        staging: StorageLocation,
        /// Filename supplied at creation time, if any.
        filename: Option<String>,
        /// Content type supplied at creation time, if any.
        content_type: Option<String>,
        /// Expected size in bytes, if supplied.
        expected_size_bytes: Option<u64>,
        /// Creation timestamp.
        created_at: DateTime<Utc>,
        /// Last-modified timestamp.
        updated_at: DateTime<Utc>,
        /// Timestamp the upload transitioned into `queued`.
        queued_at: DateTime<Utc>,
    },
    /// A worker has claimed the job and resolved the filename.
    Processing {
        /// Identifier of the upload.
        id: UploadId,
        /// Staging location the client PUT into.
        staging: StorageLocation,
        /// Resolved filename; required from this state onward.
        filename: String,
        /// Content type supplied at creation time, if any.
        content_type: Option<String>,
        /// Expected size in bytes, if supplied.
        expected_size_bytes: Option<u64>,
        /// Creation timestamp.
        created_at: DateTime<Utc>,
        /// Last-modified timestamp.
        updated_at: DateTime<Utc>,
        /// Timestamp the upload transitioned into `queued`.
        queued_at: DateTime<Utc>,
    },
    /// Terminal success state.
    Finalized {
        /// Identifier of the upload.
        id: UploadId,
        /// Staging location the client PUT into.
        staging: StorageLocation,
        /// Resolved filename.
        filename: String,
        /// Content type supplied at creation time, if any.
        content_type: Option<String>,
        /// Expected size in bytes, if supplied.
        expected_size_bytes: Option<u64>,
        /// Creation timestamp.
        created_at: DateTime<Utc>,
        /// Last-modified timestamp.
        updated_at: DateTime<Utc>,
        /// Timestamp the upload transitioned into `queued`.
        queued_at: DateTime<Utc>,
        /// Timestamp the upload transitioned into `finalized`.
        finalized_at: DateTime<Utc>,
        /// Location of the promoted `original` variant.
        #[serde(rename = "final")]
        final_location: StorageLocation,
        /// Size of the original staged object in bytes.
        actual_size_bytes: u64,
    },
    /// Terminal failure state.
    Failed {
        /// Identifier of the upload.
        id: UploadId,
        /// Staging location the client PUT into.
        staging: StorageLocation,
        /// Filename, if resolved before failure.
        filename: Option<String>,
        /// Content type supplied at creation time, if any.
        content_type: Option<String>,
        /// Expected size in bytes, if supplied.
        expected_size_bytes: Option<u64>,
        /// Creation timestamp.
        created_at: DateTime<Utc>,
        /// Last-modified timestamp.
        updated_at: DateTime<Utc>,
        /// Timestamp the upload transitioned into `queued`, if it ever did.
        queued_at: Option<DateTime<Utc>>,
        /// Human-readable reason the upload failed.
        failure_reason: String,
    },
}

impl UploadRecord {
    /// Identifier of the upload, present in every state.
    #[must_use]
    pub const fn id(&self) -> &UploadId {
        match self {
            Self::AwaitingUpload { id, .. }
            | Self::Queued { id, .. }
            | Self::Processing { id, .. }
            | Self::Finalized { id, .. }
            | Self::Failed { id, .. } => id,
        }
    }

    /// Machine-friendly discriminator matching the `status` serde tag.
    #[must_use]
    pub const fn status_name(&self) -> &'static str {
        match self {
            Self::AwaitingUpload { .. } => "awaiting_upload",
            Self::Queued { .. } => "queued",
            Self::Processing { .. } => "processing",
            Self::Finalized { .. } => "finalized",
            Self::Failed { .. } => "failed",
        }
    }

    /// Filename associated with the record, if resolved.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::AwaitingUpload { filename, .. } | Self::Queued { filename, .. } => {
                filename.as_deref()
            }
            Self::Processing { filename, .. } | Self::Finalized { filename, .. } => {
                Some(filename.as_str())
            }
            Self::Failed { filename, .. } => filename.as_deref(),
        }
    }

    /// Content type associated with the record, if supplied.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        match self {
            Self::AwaitingUpload { content_type, .. }
            | Self::Queued { content_type, .. }
            | Self::Processing { content_type, .. }
            | Self::Finalized { content_type, .. }
            | Self::Failed { content_type, .. } => content_type.as_deref(),
        }
    }

    /// Whether this record is a terminal state (`finalized` or `failed`).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized { .. } | Self::Failed { .. })
    }
}

/// Current lifecycle status of a [`FinalizeJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its `run_at` to elapse, or never yet claimed.
    Pending,
    /// Claimed by a worker; `run_at` doubles as the lease expiry.
    Running,
    /// Reached a terminal success outcome.
    Completed,
    /// Reached a terminal failure outcome.
    Failed,
}

/// A durable finalize job tracked by the [`JobStore`](crate::ports::KeyValueStoreCas).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeJob {
    /// Identifier of the job.
    pub id: JobId,
    /// Upload this job will finalize. A lookup key, never a back-pointer.
    pub upload_id: UploadId,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Number of claim attempts made so far.
    pub attempt: u32,
    /// Earliest-dispatch time when `pending`; lease-expiry deadline when `running`.
    pub run_at: DateTime<Utc>,
    /// Most recent error recorded against the job, if any.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-modified timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Best-effort, rebuildable index of non-terminal job ids, used only to
/// accelerate [`JobStore::list_due`](crate::ports::KeyValueStoreCas). Readers
/// must tolerate orphans in both directions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobIndex {
    /// Non-terminal job identifiers known to the index.
    pub job_ids: Vec<JobId>,
}

impl JobIndex {
    /// Append `id` to the index if it is not already present.
    pub fn insert(&mut self, id: JobId) {
        if !self.job_ids.contains(&id) {
            self.job_ids.push(id);
        }
    }

    /// Remove `id` from the index, if present.
    pub fn remove(&mut self, id: &JobId) {
        self.job_ids.retain(|existing| existing != id);
    }
}

/// Outcome of a mutating metadata-store or job-store write.
///
/// Distinguishes retriable CAS races (`Conflict`) from permanent logic errors
/// (`InvalidTransition`) from missing records (`NotFound`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write applied and changed persisted state.
    Written,
    /// The write was a no-op because the record already reflected it.
    Already,
    /// The write lost a compare-and-swap race; the caller may retry.
    Conflict,
    /// The record did not exist.
    NotFound,
    /// The requested transition is not legal from the current state.
    InvalidTransition {
        /// States from which the transition would have been legal.
        expected: Vec<&'static str>,
        /// The state the record was actually found in.
        actual: &'static str,
    },
}

pub mod transitions;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_id_round_trips_through_parse() {
        let id = UploadId::generate();
        assert!(id.as_str().starts_with("upload_"));
        let parsed = UploadId::parse(id.as_str().to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn upload_id_rejects_missing_prefix() {
        assert!(UploadId::parse("not-an-id").is_err());
        assert!(UploadId::parse("upload_").is_err());
    }

    #[test]
    fn job_id_round_trips_through_parse() {
        let id = JobId::generate();
        assert!(id.as_str().starts_with("job_"));
        assert_eq!(JobId::parse(id.as_str().to_string()).unwrap(), id);
    }

    #[test]
    fn job_index_insert_is_deduplicated_and_removable() {
        let mut index = JobIndex::default();
        let id = JobId::generate();
        index.insert(id.clone());
        index.insert(id.clone());
        assert_eq!(index.job_ids.len(), 1);
        index.remove(&id);
        assert!(index.job_ids.is_empty());
    }

    #[test]
    fn upload_record_exposes_terminal_and_filename_accessors() {
        let now = Utc::now();
        let record = UploadRecord::Processing {
            id: UploadId::generate(),
            staging: StorageLocation {
                bucket: "b".into(),
                key: "staging/x".into(),
            },
            filename: "photo.jpg".into(),
            content_type: None,
            expected_size_bytes: None,
            created_at: now,
            updated_at: now,
            queued_at: now,
        };
        assert_eq!(record.status_name(), "processing");
        assert_eq!(record.filename(), Some("photo.jpg"));
        assert!(!record.is_terminal());
    }
}
