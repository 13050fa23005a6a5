//! Loads configuration, wires the configured storage backend into the
//! orchestrator and worker, and runs until interrupted.
//!
//! There is no HTTP surface in this daemon: presign and completion requests
//! are expected to come from whatever process embeds
//! [`upload_orchestrator::UploadOrchestrator`] directly (see `upload-cli`
//! for a demo-mode driver). This process only owns the background
//! finalization worker.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use upload_config::{AppConfig, BackoffSettings, StaticBackoffPolicy, StoreBackend};
use upload_core::ports::{BlobStore, RetryConfig};
use upload_core::{FinalizeJob, JobIndex, UploadRecord};
use upload_events::EventBus;
use upload_orchestrator::UploadOrchestrator;
use upload_postgres::PostgresKeyValueStore;
use upload_store::keys::KeySpace;
use upload_store::{JobStore, UploadMetadataStore, UploadObjectStore};
use upload_telemetry::{LogFormat, LoggingConfig, Metrics, build_sha, init_logging};
use upload_test_support::{
    BoundedRetryExecutor, InMemoryBlobStore, InMemoryKeyValueStore, StubImageProcessor,
};
use upload_worker::{UploadFinalizationWorker, WorkerConfig};

use crate::backend::{DynJobIndex, DynJobStore, DynMetadataStore};
use crate::clock::SystemClock;
use crate::error::{AppError, AppResult};

/// Concrete orchestrator type this daemon (and `upload-cli`) instantiate,
/// regardless of which storage backend configuration selected.
pub type Orchestrator = UploadOrchestrator<
    DynMetadataStore,
    DynJobStore,
    DynJobIndex,
    Arc<dyn BlobStore>,
    StubImageProcessor,
    SystemClock,
>;
type Worker = UploadFinalizationWorker<
    DynMetadataStore,
    DynJobStore,
    DynJobIndex,
    Arc<dyn BlobStore>,
    StubImageProcessor,
    SystemClock,
    BoundedRetryExecutor,
>;

/// Load configuration from the environment and the default file search
/// path, then run until interrupted.
///
/// # Errors
///
/// Returns an error if configuration loading, telemetry initialization, or
/// storage-backend construction fails.
pub async fn run_app() -> AppResult<()> {
    let config = upload_config::load(None).map_err(|source| AppError::config("load", source))?;
    run_app_with(config).await
}

/// Run with an already-assembled configuration. Split out from [`run_app`]
/// so tests can skip environment and file loading.
///
/// # Errors
///
/// Returns an error under the same conditions as [`run_app`].
pub async fn run_app_with(config: AppConfig) -> AppResult<()> {
    init_logging(&LoggingConfig {
        level: &config.telemetry.log_level,
        format: if config.telemetry.json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        build_sha: build_sha(),
    })
    .map_err(|source| AppError::telemetry("init_logging", source))?;

    let events = EventBus::new();
    let metrics = Metrics::new().map_err(|source| AppError::telemetry("metrics_init", source))?;
    let worker_config = build_worker_config(&config)?;
    let orchestrator = Arc::new(build_orchestrator(&config).await?);

    let worker: Worker = UploadFinalizationWorker::new(
        Arc::clone(&orchestrator),
        BoundedRetryExecutor,
        worker_config,
        events,
        Some(metrics),
    );

    worker.start();
    info!("upload finalization worker started");

    tokio::signal::ctrl_c()
        .await
        .map_err(|source| AppError::store("await_shutdown_signal", source))?;

    info!("shutdown signal received; draining in-flight jobs");
    worker.stop().await;
    Ok(())
}

/// Build the orchestrator for the configured storage backend. Shared by
/// [`run_app_with`] and by `upload-cli`, so operator commands issued against
/// a `postgres`-backed configuration observe the same records the daemon
/// does.
///
/// # Errors
///
/// Returns an error if the configured backend cannot be constructed (for
/// example, a missing or unreachable `database_url`).
pub async fn build_orchestrator(config: &AppConfig) -> AppResult<Orchestrator> {
    let keys = KeySpace::new(config.store.key_space.clone());
    let objects = UploadObjectStore::new(
        blob_store(),
        config.presign.bucket.clone(),
        config.presign.staging_prefix.clone(),
        config.presign.final_prefix.clone(),
    );

    let (metadata_backend, job_backend, index_backend) = match config.store.backend {
        StoreBackend::InMemory => in_memory_backends(),
        StoreBackend::Postgres => build_postgres_backends(config).await?,
    };

    let metadata = UploadMetadataStore::new(metadata_backend, keys.clone());
    let jobs = Arc::new(JobStore::new(job_backend, index_backend, keys));

    Ok(UploadOrchestrator::new(
        metadata,
        jobs,
        objects,
        StubImageProcessor::passthrough(),
        SystemClock,
    ))
}

fn in_memory_backends() -> (DynMetadataStore, DynJobStore, DynJobIndex) {
    (
        Arc::new(InMemoryKeyValueStore::<UploadRecord>::default()),
        Arc::new(InMemoryKeyValueStore::<FinalizeJob>::default()),
        Arc::new(InMemoryKeyValueStore::<JobIndex>::default()),
    )
}

async fn build_postgres_backends(
    config: &AppConfig,
) -> AppResult<(DynMetadataStore, DynJobStore, DynJobIndex)> {
    let database_url = config.store.database_url.as_deref().ok_or_else(|| {
        AppError::store("connect", "database_url is required for the postgres backend")
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|source| AppError::store("connect", source))?;

    PostgresKeyValueStore::<UploadRecord>::ensure_schema(&pool)
        .await
        .map_err(|source| AppError::store("ensure_schema", source))?;

    let metadata: DynMetadataStore =
        Arc::new(PostgresKeyValueStore::<UploadRecord>::new(pool.clone(), "upload_metadata"));
    let jobs: DynJobStore =
        Arc::new(PostgresKeyValueStore::<FinalizeJob>::new(pool.clone(), "upload_jobs"));
    let index: DynJobIndex =
        Arc::new(PostgresKeyValueStore::<JobIndex>::new(pool, "upload_job_index"));
    Ok((metadata, jobs, index))
}

/// Object storage has no production implementation anywhere in this
/// workspace; both backends run against the in-memory blob store until one
/// is added.
fn blob_store() -> Arc<dyn BlobStore> {
    Arc::new(InMemoryBlobStore::default())
}

fn build_worker_config(config: &AppConfig) -> AppResult<WorkerConfig> {
    let worker = &config.worker;
    let worker_config = WorkerConfig {
        concurrency: worker.concurrency,
        capacity_poll: worker.capacity_poll(),
        drain_poll: worker.drain_poll(),
        idle_backoff: Arc::new(StaticBackoffPolicy::from(worker.idle_backoff)),
        io_retry: RetryConfig {
            max_attempts: worker.io_retry.max_attempts,
            delay: Arc::new(StaticBackoffPolicy::from(BackoffSettings::exponential(
                worker.io_retry.base_delay_ms,
                worker.io_retry.max_delay_ms,
            ))),
            max_elapsed: worker.io_retry.max_elapsed(),
        },
        job_retry_delay: Arc::new(StaticBackoffPolicy::from(worker.job_retry)),
        max_job_attempts: worker.max_job_attempts,
        lease_duration: worker.lease_duration(),
    };
    worker_config
        .validate()
        .map_err(|source| AppError::InvalidWorkerConfig { source })?;
    Ok(worker_config)
}
