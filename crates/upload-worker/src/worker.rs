use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use upload_core::ports::{
    BlobStore, Clock, ImageProcessor, KeyValueStore, KeyValueStoreCas, KeyValueStoreConditional,
    RetryExecutor,
};
use upload_core::{FinalizeJob, JobIndex, UploadRecord};
use upload_events::{Event, EventBus};
use upload_orchestrator::{FinalizeOutcome, OrchestratorError, UploadOrchestrator};
use upload_store::JobStore;
use upload_telemetry::Metrics;

use crate::config::WorkerConfig;

const METADATA_STORE: &str = "metadata_store";
const JOB_STORE: &str = "job_store";
const OBJECT_STORE: &str = "object_store";
const IMAGE_PROCESSOR: &str = "image_processor";

enum PollOutcome {
    AtCapacity,
    Idle,
    Claimed(Vec<FinalizeJob>),
}

struct Inner<S, J, I, B, P, C, R> {
    orchestrator: Arc<UploadOrchestrator<S, J, I, B, P, C>>,
    jobs: Arc<JobStore<J, I>>,
    retry: R,
    config: WorkerConfig,
    events: EventBus,
    running: AtomicBool,
    in_flight: AtomicUsize,
    consecutive_idle: AtomicU32,
    health: Mutex<BTreeSet<String>>,
    stop_tx: Mutex<Option<broadcast::Sender<()>>>,
    metrics: Option<Metrics>,
}

impl<S, J, I, B, P, C, R> Inner<S, J, I, B, P, C, R>
where
    S: KeyValueStoreCas<UploadRecord> + KeyValueStoreConditional<UploadRecord> + 'static,
    J: KeyValueStoreCas<FinalizeJob> + 'static,
    I: KeyValueStore<JobIndex> + 'static,
    B: BlobStore + 'static,
    P: ImageProcessor + 'static,
    C: Clock + 'static,
    R: RetryExecutor + 'static,
{
    async fn run_loop(self: Arc<Self>, mut stop_rx: broadcast::Receiver<()>) {
        while self.running.load(Ordering::Acquire) {
            match self.poll_once().await {
                Ok(PollOutcome::AtCapacity) => {
                    self.orchestrator.clock().sleep(self.config.capacity_poll).await;
                }
                Ok(PollOutcome::Idle) => {
                    self.idle_sleep(&mut stop_rx).await;
                }
                Ok(PollOutcome::Claimed(jobs)) => {
                    self.consecutive_idle.store(0, Ordering::Release);
                    Arc::clone(&self).claim_and_process(jobs).await;
                }
                Err(detail) => {
                    warn!(error = %detail, "finalize worker poll step failed; treating as idle tick");
                    self.idle_sleep(&mut stop_rx).await;
                }
            }
        }
    }

    async fn idle_sleep(&self, stop_rx: &mut broadcast::Receiver<()>) {
        let attempt = self.consecutive_idle.fetch_add(1, Ordering::AcqRel) + 1;
        let delay = self.config.idle_backoff.delay(attempt);
        tokio::select! {
            () = self.orchestrator.clock().sleep(delay) => {}
            _ = stop_rx.recv() => {}
        }
    }

    async fn poll_once(&self) -> Result<PollOutcome, String> {
        let capacity = self
            .config
            .concurrency
            .saturating_sub(self.in_flight.load(Ordering::Acquire));
        if capacity == 0 {
            return Ok(PollOutcome::AtCapacity);
        }

        let now = self.orchestrator.clock().now();
        let jobs = Arc::clone(&self.jobs);
        let result = self
            .retry
            .execute(&self.config.io_retry, move || {
                let jobs = Arc::clone(&jobs);
                async move { jobs.list_due(now, capacity).await }
            })
            .await;

        match result {
            Ok(due) => {
                self.mark_recovered(JOB_STORE);
                if let Some(metrics) = &self.metrics {
                    metrics.set_queue_depth(due.len() as i64);
                }
                if due.is_empty() {
                    Ok(PollOutcome::Idle)
                } else {
                    Ok(PollOutcome::Claimed(due))
                }
            }
            Err(exhausted) => {
                let detail = exhausted.last_error.to_string();
                self.mark_degraded(JOB_STORE, Some(&detail));
                Err(detail)
            }
        }
    }

    async fn claim_and_process(self: Arc<Self>, candidates: Vec<FinalizeJob>) {
        for job in candidates {
            if !self.running.load(Ordering::Acquire)
                || self.in_flight.load(Ordering::Acquire) >= self.config.concurrency
            {
                break;
            }

            let now = self.orchestrator.clock().now();
            let jobs = Arc::clone(&self.jobs);
            let job_id = job.id.clone();
            let lease = self.config.lease_duration;
            let claimed = self
                .retry
                .execute(&self.config.io_retry, move || {
                    let jobs = Arc::clone(&jobs);
                    let job_id = job_id.clone();
                    async move { jobs.try_claim(&job_id, now, lease).await }
                })
                .await;

            match claimed {
                Ok(Some(claimed)) => {
                    self.mark_recovered(JOB_STORE);
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_job_claimed(claimed.upload_id.as_str());
                    }
                    self.in_flight.fetch_add(1, Ordering::AcqRel);
                    if let Some(metrics) = &self.metrics {
                        metrics.set_in_flight(self.in_flight.load(Ordering::Acquire) as i64);
                    }
                    let worker = Arc::clone(&self);
                    tokio::spawn(async move {
                        worker.clone().process_job(claimed).await;
                        worker.in_flight.fetch_sub(1, Ordering::AcqRel);
                        if let Some(metrics) = &worker.metrics {
                            metrics.set_in_flight(worker.in_flight.load(Ordering::Acquire) as i64);
                        }
                    });
                }
                Ok(None) => {}
                Err(exhausted) => {
                    let detail = exhausted.last_error.to_string();
                    self.mark_degraded(JOB_STORE, Some(&detail));
                }
            }
        }
    }

    async fn process_job(self: Arc<Self>, job: FinalizeJob) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let job_for_call = job.clone();
        let result = self
            .retry
            .execute(&self.config.io_retry, move || {
                let orchestrator = Arc::clone(&orchestrator);
                let job = job_for_call.clone();
                async move { orchestrator.finalize_upload(&job).await }
            })
            .await;

        match result {
            Ok(outcome) => {
                self.mark_recovered(METADATA_STORE);
                self.mark_recovered(OBJECT_STORE);
                self.mark_recovered(IMAGE_PROCESSOR);
                self.interpret_outcome(&job, outcome).await;
            }
            Err(exhausted) => {
                let reason = exhausted.last_error.to_string();
                self.mark_component_for_error(&exhausted.last_error);
                warn!(
                    job_id = %job.id,
                    upload_id = %job.upload_id,
                    reason = %reason,
                    "finalize_upload failed after retries; scheduling job retry"
                );
                self.schedule_retry(&job, reason).await;
            }
        }
    }

    async fn interpret_outcome(&self, job: &FinalizeJob, outcome: FinalizeOutcome) {
        match outcome {
            FinalizeOutcome::Finalized | FinalizeOutcome::AlreadyFinalized => {
                let now = self.orchestrator.clock().now();
                if let Err(err) = self.jobs.mark_completed(&job.id, now).await {
                    tracing::error!(
                        job_id = %job.id,
                        error = %err,
                        "failed to mark job completed; lease will expire and another worker may reclaim"
                    );
                    return;
                }
                info!(job_id = %job.id, upload_id = %job.upload_id, "finalize job completed");
                if let Some(metrics) = &self.metrics {
                    metrics.inc_job_finalized(job.upload_id.as_str());
                }
                let _ = self.events.publish(Event::UploadFinalized {
                    upload_id: job.upload_id.as_str().to_string(),
                });
            }
            FinalizeOutcome::Retry { reason } => {
                self.schedule_retry(job, reason).await;
            }
            FinalizeOutcome::Failed { reason } => {
                self.mark_permanently_failed(job, reason).await;
            }
            FinalizeOutcome::NotFound => {
                self.mark_permanently_failed(job, "upload_not_found".to_string())
                    .await;
            }
        }
    }

    async fn schedule_retry(&self, job: &FinalizeJob, reason: String) {
        let next_attempt = job.attempt + 1;
        if next_attempt > self.config.max_job_attempts {
            self.mark_permanently_failed(job, reason).await;
            return;
        }

        let now = self.orchestrator.clock().now();
        let delay = chrono::Duration::from_std(self.config.job_retry_delay.delay(next_attempt))
            .unwrap_or_else(|_| chrono::Duration::zero());
        let next_run_at = now + delay;
        if let Err(err) = self
            .jobs
            .reschedule(&job.id, next_run_at, now, Some(reason.clone()))
            .await
        {
            tracing::error!(
                job_id = %job.id,
                error = %err,
                "failed to reschedule job; lease will expire and another worker may reclaim"
            );
            return;
        }

        warn!(
            job_id = %job.id,
            upload_id = %job.upload_id,
            attempt = next_attempt,
            reason = %reason,
            "finalize job rescheduled for retry"
        );
        if let Some(metrics) = &self.metrics {
            metrics.inc_job_retried(&reason);
        }
        let _ = self.events.publish(Event::JobRetryScheduled {
            job_id: job.id.as_str().to_string(),
            attempt: next_attempt,
            reason,
        });
    }

    async fn mark_permanently_failed(&self, job: &FinalizeJob, reason: String) {
        let now = self.orchestrator.clock().now();
        if let Err(err) = self.jobs.mark_failed(&job.id, now, reason.clone()).await {
            tracing::error!(
                job_id = %job.id,
                error = %err,
                "failed to mark job failed; lease will expire and another worker may reclaim"
            );
            return;
        }
        info!(job_id = %job.id, upload_id = %job.upload_id, reason = %reason, "finalize job permanently failed");
        if let Some(metrics) = &self.metrics {
            metrics.inc_job_failed(&reason);
        }
        let _ = self.events.publish(Event::UploadFailed {
            upload_id: job.upload_id.as_str().to_string(),
            reason,
        });
    }

    fn mark_component_for_error(&self, err: &OrchestratorError) {
        let detail = err.to_string();
        let component = match err {
            OrchestratorError::Metadata(_) => METADATA_STORE,
            OrchestratorError::Jobs(_) => JOB_STORE,
            OrchestratorError::Objects(_) => OBJECT_STORE,
            OrchestratorError::Processor(_) => IMAGE_PROCESSOR,
        };
        self.mark_degraded(component, Some(&detail));
    }

    fn mark_degraded(&self, component: &str, detail: Option<&str>) {
        let mut health = self.health.lock().unwrap();
        let inserted = health.insert(component.to_string());
        if inserted {
            let degraded = health.iter().cloned().collect::<Vec<_>>();
            drop(health);
            if let Some(metrics) = &self.metrics {
                metrics.set_worker_degraded(true);
            }
            let _ = self.events.publish(Event::HealthChanged { degraded });
            if let Some(detail) = detail {
                warn!(component, detail, "worker component degraded");
            } else {
                warn!(component, "worker component degraded");
            }
        } else if let Some(detail) = detail {
            warn!(component, detail, "worker component still degraded");
        }
    }

    fn mark_recovered(&self, component: &str) {
        let mut health = self.health.lock().unwrap();
        if health.remove(component) {
            let degraded = health.iter().cloned().collect::<Vec<_>>();
            let still_degraded = !degraded.is_empty();
            drop(health);
            if let Some(metrics) = &self.metrics {
                metrics.set_worker_degraded(still_degraded);
            }
            let _ = self.events.publish(Event::HealthChanged { degraded });
            info!(component, "worker component recovered");
        }
    }
}

/// The concurrency coordinator: polls due jobs, claims them, hands them to
/// the orchestrator, and performs job bookkeeping. `start()`/`stop()` may be
/// called repeatedly; `stop()` drains in-flight work before returning.
pub struct UploadFinalizationWorker<S, J, I, B, P, C, R> {
    inner: Arc<Inner<S, J, I, B, P, C, R>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S, J, I, B, P, C, R> UploadFinalizationWorker<S, J, I, B, P, C, R>
where
    S: KeyValueStoreCas<UploadRecord> + KeyValueStoreConditional<UploadRecord> + Send + Sync + 'static,
    J: KeyValueStoreCas<FinalizeJob> + Send + Sync + 'static,
    I: KeyValueStore<JobIndex> + Send + Sync + 'static,
    B: BlobStore + Send + Sync + 'static,
    P: ImageProcessor + Send + Sync + 'static,
    C: Clock + Send + Sync + 'static,
    R: RetryExecutor + Send + Sync + 'static,
{
    /// Compose a worker around an orchestrator, a retry executor, and its
    /// tuning configuration. Shares the orchestrator's job queue directly.
    /// `metrics` is optional so tests and the demo CLI can omit a Prometheus
    /// registry entirely.
    #[must_use]
    pub fn new(
        orchestrator: Arc<UploadOrchestrator<S, J, I, B, P, C>>,
        retry: R,
        config: WorkerConfig,
        events: EventBus,
        metrics: Option<Metrics>,
    ) -> Self {
        let jobs = orchestrator.jobs();
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                jobs,
                retry,
                config,
                events,
                running: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                consecutive_idle: AtomicU32::new(0),
                health: Mutex::new(BTreeSet::new()),
                stop_tx: Mutex::new(None),
                metrics,
            }),
            task: Mutex::new(None),
        }
    }

    /// Start the run loop in the background. A no-op if already running.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let (stop_tx, stop_rx) = broadcast::channel(1);
        *self.inner.stop_tx.lock().unwrap() = Some(stop_tx);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(Inner::run_loop(inner, stop_rx));
        *self.task.lock().unwrap() = Some(handle);
    }

    /// Stop accepting new claims, interrupt any idle sleep, and wait for
    /// in-flight jobs to drain before returning. `start()` is legal again
    /// once this returns.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(tx) = self.inner.stop_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        while self.inner.in_flight.load(Ordering::Acquire) > 0 {
            self.inner
                .orchestrator
                .clock()
                .sleep(self.inner.config.drain_poll)
                .await;
        }
        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Number of jobs currently being processed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Components currently considered degraded.
    #[must_use]
    pub fn degraded_components(&self) -> Vec<String> {
        self.inner.health.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use bytes::Bytes;
    use chrono::Utc;
    use upload_core::model::StorageLocation;
    use upload_core::ports::RetryConfig;
    use upload_orchestrator::CreateUploadInput;
    use upload_store::keys::KeySpace;
    use upload_store::{UploadMetadataStore, UploadObjectStore};
    use upload_test_support::{
        BoundedRetryExecutor, FixedClock, FixedDelayBackoffPolicy, InMemoryBlobStore,
        InMemoryKeyValueStore, MissingOriginalImageProcessor, StubImageProcessor,
    };

    type TestOrchestrator<P> = UploadOrchestrator<
        InMemoryKeyValueStore<UploadRecord>,
        InMemoryKeyValueStore<FinalizeJob>,
        InMemoryKeyValueStore<JobIndex>,
        Arc<InMemoryBlobStore>,
        P,
        FixedClock,
    >;

    fn config() -> WorkerConfig {
        WorkerConfig {
            concurrency: 2,
            capacity_poll: StdDuration::from_millis(5),
            drain_poll: StdDuration::from_millis(5),
            idle_backoff: Arc::new(FixedDelayBackoffPolicy::new(StdDuration::from_millis(5))),
            io_retry: RetryConfig {
                max_attempts: 3,
                delay: Arc::new(FixedDelayBackoffPolicy::new(StdDuration::from_millis(1))),
                max_elapsed: None,
            },
            job_retry_delay: Arc::new(FixedDelayBackoffPolicy::new(StdDuration::from_millis(1))),
            max_job_attempts: 3,
            lease_duration: StdDuration::from_secs(30),
        }
    }

    fn build<P: ImageProcessor>(
        processor: P,
    ) -> (Arc<TestOrchestrator<P>>, Arc<InMemoryBlobStore>) {
        let blobs = Arc::new(InMemoryBlobStore::default());
        let metadata = UploadMetadataStore::new(InMemoryKeyValueStore::default(), KeySpace::new("acme"));
        let jobs = Arc::new(JobStore::new(
            InMemoryKeyValueStore::default(),
            InMemoryKeyValueStore::default(),
            KeySpace::new("acme"),
        ));
        let objects = UploadObjectStore::new(Arc::clone(&blobs), "bucket", "staging", "final");
        let clock = FixedClock::new(Utc::now());
        let orchestrator = Arc::new(UploadOrchestrator::new(metadata, jobs, objects, processor, clock));
        (orchestrator, blobs)
    }

    #[tokio::test]
    async fn happy_path_drives_a_queued_job_to_finalized() {
        let (orchestrator, blobs) = build(StubImageProcessor::with_variants(["thumbnail"]));
        let created = orchestrator
            .create_upload(CreateUploadInput {
                filename: Some("photo.jpg".to_string()),
                content_type: Some("image/jpeg".to_string()),
                expected_size_bytes: None,
                presign_expires_in_seconds: 900,
            })
            .await
            .unwrap();
        blobs.seed(
            &StorageLocation {
                bucket: "bucket".to_string(),
                key: format!("staging/{}/photo.jpg", created.upload_id.as_str()),
            },
            Bytes::from_static(b"pixels"),
            Some("image/jpeg".to_string()),
        );
        orchestrator.complete_upload(&created.upload_id).await.unwrap();

        let worker = UploadFinalizationWorker::new(
            Arc::clone(&orchestrator),
            BoundedRetryExecutor,
            config(),
            EventBus::with_capacity(64),
            None,
        );
        worker.start();

        let mut record = orchestrator.get_upload(&created.upload_id).await.unwrap();
        for _ in 0..200 {
            if matches!(record, Some(UploadRecord::Finalized { .. })) {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
            record = orchestrator.get_upload(&created.upload_id).await.unwrap();
        }
        worker.stop().await;

        assert!(matches!(record, Some(UploadRecord::Finalized { .. })));
        assert_eq!(worker.in_flight(), 0);
        assert!(worker.degraded_components().is_empty());
    }

    #[tokio::test]
    async fn missing_staging_object_is_retried_then_succeeds() {
        let (orchestrator, blobs) = build(StubImageProcessor::passthrough());
        let created = orchestrator
            .create_upload(CreateUploadInput {
                filename: Some("photo.jpg".to_string()),
                content_type: Some("image/jpeg".to_string()),
                expected_size_bytes: None,
                presign_expires_in_seconds: 900,
            })
            .await
            .unwrap();
        orchestrator.complete_upload(&created.upload_id).await.unwrap();

        let mut cfg = config();
        cfg.job_retry_delay = Arc::new(FixedDelayBackoffPolicy::new(StdDuration::from_millis(1)));
        let worker = UploadFinalizationWorker::new(
            Arc::clone(&orchestrator),
            BoundedRetryExecutor,
            cfg,
            EventBus::with_capacity(64),
            None,
        );
        worker.start();

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        blobs.seed(
            &StorageLocation {
                bucket: "bucket".to_string(),
                key: format!("staging/{}/photo.jpg", created.upload_id.as_str()),
            },
            Bytes::from_static(b"pixels"),
            Some("image/jpeg".to_string()),
        );

        let mut record = orchestrator.get_upload(&created.upload_id).await.unwrap();
        for _ in 0..200 {
            if matches!(record, Some(UploadRecord::Finalized { .. })) {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
            record = orchestrator.get_upload(&created.upload_id).await.unwrap();
        }
        worker.stop().await;

        assert!(matches!(record, Some(UploadRecord::Finalized { .. })));
    }

    #[tokio::test]
    async fn missing_original_variant_permanently_fails_the_upload() {
        let (orchestrator, blobs) = build(MissingOriginalImageProcessor);
        let created = orchestrator
            .create_upload(CreateUploadInput {
                filename: Some("photo.jpg".to_string()),
                content_type: Some("image/jpeg".to_string()),
                expected_size_bytes: None,
                presign_expires_in_seconds: 900,
            })
            .await
            .unwrap();
        blobs.seed(
            &StorageLocation {
                bucket: "bucket".to_string(),
                key: format!("staging/{}/photo.jpg", created.upload_id.as_str()),
            },
            Bytes::from_static(b"pixels"),
            Some("image/jpeg".to_string()),
        );
        orchestrator.complete_upload(&created.upload_id).await.unwrap();

        let worker = UploadFinalizationWorker::new(
            Arc::clone(&orchestrator),
            BoundedRetryExecutor,
            config(),
            EventBus::with_capacity(64),
            None,
        );
        worker.start();

        let mut record = orchestrator.get_upload(&created.upload_id).await.unwrap();
        for _ in 0..200 {
            if matches!(record, Some(UploadRecord::Failed { .. })) {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
            record = orchestrator.get_upload(&created.upload_id).await.unwrap();
        }
        worker.stop().await;

        match record {
            Some(UploadRecord::Failed { failure_reason, .. }) => {
                assert_eq!(failure_reason, "missing_original_variant");
            }
            other => panic!("expected a failed upload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_start_is_legal_again_after() {
        let (orchestrator, _blobs) = build(StubImageProcessor::passthrough());
        let worker = UploadFinalizationWorker::new(
            orchestrator,
            BoundedRetryExecutor,
            config(),
            EventBus::with_capacity(8),
            None,
        );
        worker.start();
        worker.stop().await;
        worker.stop().await;
        worker.start();
        worker.stop().await;
    }

    #[tokio::test]
    async fn a_supplied_metrics_registry_observes_a_finalized_job() {
        let (orchestrator, blobs) = build(StubImageProcessor::with_variants(["thumbnail"]));
        let created = orchestrator
            .create_upload(CreateUploadInput {
                filename: Some("photo.jpg".to_string()),
                content_type: Some("image/jpeg".to_string()),
                expected_size_bytes: None,
                presign_expires_in_seconds: 900,
            })
            .await
            .unwrap();
        blobs.seed(
            &StorageLocation {
                bucket: "bucket".to_string(),
                key: format!("staging/{}/photo.jpg", created.upload_id.as_str()),
            },
            Bytes::from_static(b"pixels"),
            Some("image/jpeg".to_string()),
        );
        orchestrator.complete_upload(&created.upload_id).await.unwrap();

        let metrics = upload_telemetry::Metrics::new().expect("metrics registry");
        let worker = UploadFinalizationWorker::new(
            Arc::clone(&orchestrator),
            BoundedRetryExecutor,
            config(),
            EventBus::with_capacity(64),
            Some(metrics.clone()),
        );
        worker.start();

        let mut record = orchestrator.get_upload(&created.upload_id).await.unwrap();
        for _ in 0..200 {
            if matches!(record, Some(UploadRecord::Finalized { .. })) {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
            record = orchestrator.get_upload(&created.upload_id).await.unwrap();
        }
        worker.stop().await;

        assert!(matches!(record, Some(UploadRecord::Finalized { .. })));
        let rendered = metrics.render().expect("render metrics");
        assert!(rendered.contains("upload_jobs_claimed_total"));
        assert!(rendered.contains("upload_jobs_finalized_total"));
    }
}
