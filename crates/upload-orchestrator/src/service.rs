//! The orchestrator façade: `create_upload`, `get_upload`, `complete_upload`,
//! `finalize_upload`. Stateless and safe for concurrent invocation; all
//! state lives in the stores it composes.

use std::sync::Arc;

use upload_core::model::StorageLocation;
use upload_core::ports::{
    BlobStore, Clock, ImageProcessor, KeyValueStore, KeyValueStoreCas, KeyValueStoreConditional,
    ProcessInput,
};
use upload_core::{FinalizeJob, JobId, JobIndex, JobStatus, UploadId, UploadRecord, WriteOutcome};
use upload_store::{JobStore, UploadMetadataStore, UploadObjectStore};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::model::{
    variant_filename, CompleteUploadOutcome, CreateUploadInput, CreateUploadOutcome,
    FinalizeOutcome,
};

fn write_outcome_reason(outcome: WriteOutcome) -> String {
    match outcome {
        WriteOutcome::Conflict => "conflict".to_string(),
        WriteOutcome::NotFound => "not_found".to_string(),
        WriteOutcome::InvalidTransition { actual, .. } => format!("invalid_transition:{actual}"),
        WriteOutcome::Written | WriteOutcome::Already => {
            unreachable!("written/already are handled by the caller before reaching here")
        }
    }
}

/// Composes an [`UploadMetadataStore`], a [`JobStore`], an
/// [`UploadObjectStore`], an [`ImageProcessor`], and a [`Clock`] into the
/// four operations `upload-cli` and the finalization worker consume.
pub struct UploadOrchestrator<S, J, I, B, P, C> {
    metadata: UploadMetadataStore<S>,
    jobs: Arc<JobStore<J, I>>,
    objects: UploadObjectStore<B>,
    processor: P,
    clock: C,
}

impl<S, J, I, B, P, C> UploadOrchestrator<S, J, I, B, P, C>
where
    S: KeyValueStoreCas<UploadRecord> + KeyValueStoreConditional<UploadRecord>,
    J: KeyValueStoreCas<FinalizeJob>,
    I: KeyValueStore<JobIndex>,
    B: BlobStore,
    P: ImageProcessor,
    C: Clock,
{
    /// Compose the orchestrator from its collaborators.
    pub fn new(
        metadata: UploadMetadataStore<S>,
        jobs: Arc<JobStore<J, I>>,
        objects: UploadObjectStore<B>,
        processor: P,
        clock: C,
    ) -> Self {
        Self {
            metadata,
            jobs,
            objects,
            processor,
            clock,
        }
    }

    /// The shared job queue, for a worker to poll and claim against.
    #[must_use]
    pub fn jobs(&self) -> Arc<JobStore<J, I>> {
        Arc::clone(&self.jobs)
    }

    /// The clock this orchestrator was composed with, for a worker sharing
    /// the same notion of "now".
    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Issue a presigned upload URL, then record the upload as
    /// `awaiting_upload`. The presign happens first: a leaked URL with no
    /// matching record is harmless, but an id without a usable URL is not.
    ///
    /// # Errors
    ///
    /// Returns an error if the object store or metadata store fails.
    pub async fn create_upload(
        &self,
        input: CreateUploadInput,
    ) -> OrchestratorResult<CreateUploadOutcome> {
        let upload_id = UploadId::generate();
        let presign_filename = input.filename.as_deref().unwrap_or("upload.bin");
        let presigned = self
            .objects
            .get_presigned_upload_url(
                &upload_id,
                presign_filename,
                input.content_type.clone(),
                input.presign_expires_in_seconds,
            )
            .await
            .map_err(OrchestratorError::Objects)?;

        let now = self.clock.now();
        let record = UploadRecord::AwaitingUpload {
            id: upload_id.clone(),
            staging: presigned.location.clone(),
            filename: input.filename,
            content_type: input.content_type,
            expected_size_bytes: input.expected_size_bytes,
            created_at: now,
            updated_at: now,
        };
        self.metadata
            .create(record)
            .await
            .map_err(OrchestratorError::Metadata)?;

        Ok(CreateUploadOutcome {
            upload_id,
            presigned_url: presigned.url,
            staging: presigned.location,
            expires_at: presigned.expires_at,
        })
    }

    /// Pure lookup of the current record.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub async fn get_upload(
        &self,
        upload_id: &UploadId,
    ) -> OrchestratorResult<Option<UploadRecord>> {
        self.metadata
            .get(upload_id)
            .await
            .map_err(OrchestratorError::Metadata)
    }

    /// Mark an upload queued and enqueue its finalize job. Idempotent: a
    /// second call against an already-queued or already-terminal upload
    /// reports that state rather than enqueueing a duplicate job.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store or job queue fails.
    pub async fn complete_upload(
        &self,
        upload_id: &UploadId,
    ) -> OrchestratorResult<CompleteUploadOutcome> {
        let Some(record) = self
            .metadata
            .get(upload_id)
            .await
            .map_err(OrchestratorError::Metadata)?
        else {
            return Ok(CompleteUploadOutcome::NotFound);
        };

        match &record {
            UploadRecord::Finalized { .. } => return Ok(CompleteUploadOutcome::Finalized),
            UploadRecord::Failed { failure_reason, .. } => {
                return Ok(CompleteUploadOutcome::Failed {
                    reason: failure_reason.clone(),
                })
            }
            UploadRecord::Queued { .. } | UploadRecord::Processing { .. } => {
                return Ok(CompleteUploadOutcome::AlreadyQueued)
            }
            UploadRecord::AwaitingUpload { .. } => {}
        }

        let now = self.clock.now();
        let outcome = self
            .metadata
            .mark_queued(upload_id, now)
            .await
            .map_err(OrchestratorError::Metadata)?;

        match outcome {
            WriteOutcome::Written | WriteOutcome::Already => {
                let job = FinalizeJob {
                    id: JobId::generate(),
                    upload_id: upload_id.clone(),
                    status: JobStatus::Pending,
                    attempt: 0,
                    run_at: now,
                    last_error: None,
                    created_at: now,
                    updated_at: now,
                };
                self.jobs
                    .enqueue(job)
                    .await
                    .map_err(OrchestratorError::Jobs)?;
                Ok(CompleteUploadOutcome::Queued)
            }
            other => Ok(CompleteUploadOutcome::Failed {
                reason: write_outcome_reason(other),
            }),
        }
    }

    /// The hardest operation in the system: load, ensure `processing`, fetch
    /// staging, transform, promote every variant, and mark `finalized`.
    ///
    /// # Errors
    ///
    /// Returns an error if any collaborator fails unexpectedly.
    pub async fn finalize_upload(&self, job: &FinalizeJob) -> OrchestratorResult<FinalizeOutcome> {
        let Some(record) = self
            .metadata
            .get(&job.upload_id)
            .await
            .map_err(OrchestratorError::Metadata)?
        else {
            return Ok(FinalizeOutcome::NotFound);
        };

        if matches!(record, UploadRecord::Finalized { .. }) {
            return Ok(FinalizeOutcome::AlreadyFinalized);
        }
        if let UploadRecord::Failed { failure_reason, .. } = &record {
            return Ok(FinalizeOutcome::Failed {
                reason: failure_reason.clone(),
            });
        }
        let Some(filename) = record.filename().map(str::to_string) else {
            return Ok(FinalizeOutcome::Failed {
                reason: "missing_filename".to_string(),
            });
        };

        if matches!(record, UploadRecord::Queued { .. }) {
            let now = self.clock.now();
            let outcome = self
                .metadata
                .mark_processing(&job.upload_id, &filename, now)
                .await
                .map_err(OrchestratorError::Metadata)?;
            match outcome {
                WriteOutcome::Written | WriteOutcome::Already => {}
                other => {
                    return Ok(FinalizeOutcome::Failed {
                        reason: write_outcome_reason(other),
                    })
                }
            }
        }

        let Some(staging) = self
            .objects
            .get_staging_object(&job.upload_id, &filename)
            .await
            .map_err(OrchestratorError::Objects)?
        else {
            return Ok(FinalizeOutcome::Retry {
                reason: "staging_object_missing".to_string(),
            });
        };

        let content_type = record
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let variants = self
            .processor
            .process(ProcessInput {
                data: staging.data.clone(),
                content_type,
            })
            .await
            .map_err(OrchestratorError::Processor)?;

        let mut original_location: Option<StorageLocation> = None;
        for variant in &variants {
            let promoted_filename = variant_filename(&filename, &variant.name);
            let location = self
                .objects
                .put_final_object(
                    &job.upload_id,
                    &promoted_filename,
                    variant.data.clone(),
                    Some(variant.content_type.clone()),
                )
                .await
                .map_err(OrchestratorError::Objects)?;
            if variant.name == "original" {
                original_location = Some(location);
            }
        }

        let Some(final_location) = original_location else {
            return Ok(FinalizeOutcome::Failed {
                reason: "missing_original_variant".to_string(),
            });
        };

        let now = self.clock.now();
        let outcome = self
            .metadata
            .mark_finalized(&job.upload_id, final_location, staging.size_bytes, now)
            .await
            .map_err(OrchestratorError::Metadata)?;

        match outcome {
            WriteOutcome::Written | WriteOutcome::Already => Ok(FinalizeOutcome::Finalized),
            other => Ok(FinalizeOutcome::Failed {
                reason: write_outcome_reason(other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use upload_store::keys::KeySpace;
    use upload_test_support::{
        FixedClock, InMemoryBlobStore, InMemoryKeyValueStore, MissingOriginalImageProcessor,
        StubImageProcessor,
    };

    type TestOrchestrator<P> = UploadOrchestrator<
        InMemoryKeyValueStore<UploadRecord>,
        InMemoryKeyValueStore<FinalizeJob>,
        InMemoryKeyValueStore<JobIndex>,
        Arc<InMemoryBlobStore>,
        P,
        FixedClock,
    >;

    fn build<P: ImageProcessor>(processor: P) -> (TestOrchestrator<P>, Arc<InMemoryBlobStore>) {
        let blobs = Arc::new(InMemoryBlobStore::default());
        let metadata =
            UploadMetadataStore::new(InMemoryKeyValueStore::default(), KeySpace::new("acme"));
        let jobs = Arc::new(JobStore::new(
            InMemoryKeyValueStore::default(),
            InMemoryKeyValueStore::default(),
            KeySpace::new("acme"),
        ));
        let objects = UploadObjectStore::new(Arc::clone(&blobs), "bucket", "staging", "final");
        let clock = FixedClock::new(Utc::now());
        let orchestrator = UploadOrchestrator::new(metadata, jobs, objects, processor, clock);
        (orchestrator, blobs)
    }

    #[tokio::test]
    async fn happy_path_creates_queues_and_finalizes() {
        let (orchestrator, blobs) =
            build(StubImageProcessor::with_variants(["thumbnail", "preview"]));

        let created = orchestrator
            .create_upload(CreateUploadInput {
                filename: Some("photo.jpg".to_string()),
                content_type: Some("image/jpeg".to_string()),
                expected_size_bytes: None,
                presign_expires_in_seconds: 300,
            })
            .await
            .unwrap();

        let staging = match orchestrator.get_upload(&created.upload_id).await.unwrap() {
            Some(UploadRecord::AwaitingUpload { staging, .. }) => staging,
            other => panic!("expected awaiting_upload, got {other:?}"),
        };
        blobs.seed(&staging, Bytes::from_static(b"bytes"), Some("image/jpeg".to_string()));

        let completed = orchestrator.complete_upload(&created.upload_id).await.unwrap();
        assert_eq!(completed, CompleteUploadOutcome::Queued);
        assert_eq!(
            orchestrator.complete_upload(&created.upload_id).await.unwrap(),
            CompleteUploadOutcome::AlreadyQueued
        );

        let due = orchestrator.jobs().list_due(Utc::now(), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        let job = due.into_iter().next().unwrap();

        let finalized = orchestrator.finalize_upload(&job).await.unwrap();
        assert_eq!(finalized, FinalizeOutcome::Finalized);
        assert_eq!(
            orchestrator.finalize_upload(&job).await.unwrap(),
            FinalizeOutcome::AlreadyFinalized
        );

        match orchestrator.get_upload(&created.upload_id).await.unwrap() {
            Some(UploadRecord::Finalized { final_location, .. }) => {
                assert_eq!(
                    final_location.key,
                    format!("final/{}/photo.jpg", created.upload_id)
                );
            }
            other => panic!("expected finalized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn finalize_before_upload_lands_returns_retry() {
        let (orchestrator, _blobs) = build(StubImageProcessor::passthrough());

        let created = orchestrator
            .create_upload(CreateUploadInput {
                filename: Some("photo.jpg".to_string()),
                content_type: None,
                expected_size_bytes: None,
                presign_expires_in_seconds: 300,
            })
            .await
            .unwrap();

        orchestrator.complete_upload(&created.upload_id).await.unwrap();
        let job = orchestrator
            .jobs()
            .list_due(Utc::now(), 10)
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();

        let outcome = orchestrator.finalize_upload(&job).await.unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::Retry {
                reason: "staging_object_missing".to_string()
            }
        );
    }

    #[tokio::test]
    async fn missing_original_variant_fails_permanently() {
        let (orchestrator, blobs) = build(MissingOriginalImageProcessor);

        let created = orchestrator
            .create_upload(CreateUploadInput {
                filename: Some("photo.jpg".to_string()),
                content_type: None,
                expected_size_bytes: None,
                presign_expires_in_seconds: 300,
            })
            .await
            .unwrap();
        let staging = match orchestrator.get_upload(&created.upload_id).await.unwrap() {
            Some(UploadRecord::AwaitingUpload { staging, .. }) => staging,
            other => panic!("expected awaiting_upload, got {other:?}"),
        };
        blobs.seed(&staging, Bytes::from_static(b"bytes"), None);
        orchestrator.complete_upload(&created.upload_id).await.unwrap();
        let job = orchestrator
            .jobs()
            .list_due(Utc::now(), 10)
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();

        let outcome = orchestrator.finalize_upload(&job).await.unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::Failed {
                reason: "missing_original_variant".to_string()
            }
        );
    }

    #[tokio::test]
    async fn complete_upload_on_unknown_id_is_not_found() {
        let (orchestrator, _blobs) = build(StubImageProcessor::passthrough());
        let outcome = orchestrator
            .complete_upload(&UploadId::generate())
            .await
            .unwrap();
        assert_eq!(outcome, CompleteUploadOutcome::NotFound);
    }

    #[tokio::test]
    async fn finalize_upload_on_unknown_job_upload_is_not_found() {
        let (orchestrator, _blobs) = build(StubImageProcessor::passthrough());
        let now = Utc::now();
        let job = FinalizeJob {
            id: JobId::generate(),
            upload_id: UploadId::generate(),
            status: JobStatus::Pending,
            attempt: 0,
            run_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        let outcome = orchestrator.finalize_upload(&job).await.unwrap();
        assert_eq!(outcome, FinalizeOutcome::NotFound);
    }
}
