#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! In-memory implementations of every port in [`upload_core::ports`], shared
//! across the workspace's test suites. None of these are suitable for
//! production use; they exist to make the core testable without a real
//! key-value store, blob store, or image transform.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use upload_core::error::PortResult;
use upload_core::model::StorageLocation;
use upload_core::ports::{
    BackoffPolicy, BlobStore, CasOutcome, Clock, ConditionalOutcome, ImageProcessor,
    KeyValueStore, KeyValueStoreCas, KeyValueStoreConditional, Lookup, ObjectBody, ObjectMeta,
    PresignOptions, PresignedUpload, ProcessInput, RetryConfig, RetryExecutor, RetryExhausted,
    Variant, Version, VersionedLookup,
};

/// Helpers for integration tests that need a disposable Postgres container.
pub mod docker {
    use std::path::Path;
    use std::process::Command;

    /// Returns `true` if a Docker daemon is reachable for integration tests.
    #[must_use]
    pub fn available() -> bool {
        if let Ok(host) = std::env::var("DOCKER_HOST") {
            if let Some(path) = host.strip_prefix("unix://") {
                return Path::new(path).exists();
            }
            return true;
        }

        Path::new("/var/run/docker.sock").exists()
            || Command::new("docker")
                .args(["info"])
                .output()
                .map(|output| output.status.success())
                .unwrap_or(false)
    }
}

/// A clock whose current instant is set explicitly by the test, and whose
/// `sleep` returns immediately. Useful for asserting backoff/retry timing
/// math without real wall-clock delay.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Construct a clock fixed at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    /// Set the clock to an explicit instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }
}

#[async_trait]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, _duration: Duration) {}
}

/// A trivial in-memory key-value store implementing the plain, CAS, and
/// conditional flavors of [`KeyValueStore`] over the same backing map.
pub struct InMemoryKeyValueStore<T> {
    rows: Mutex<HashMap<String, (T, u64)>>,
}

impl<T> Default for InMemoryKeyValueStore<T> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> InMemoryKeyValueStore<T> {
    /// Number of records currently stored. Test-only introspection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Whether the store currently holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<T: Send + Sync + Clone> KeyValueStore<T> for InMemoryKeyValueStore<T> {
    async fn get(&self, key: &str) -> PortResult<Lookup<T>> {
        Ok(match self.rows.lock().unwrap().get(key) {
            Some((value, _)) => Lookup::Found(value.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn set(&self, key: &str, value: T, _ttl: Option<Duration>) -> PortResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let version = rows.get(key).map_or(1, |(_, version)| version + 1);
        rows.insert(key.to_string(), (value, version));
        Ok(())
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        self.rows.lock().unwrap().remove(key);
        Ok(())
    }

    async fn has(&self, key: &str) -> PortResult<bool> {
        Ok(self.rows.lock().unwrap().contains_key(key))
    }

    async fn get_many(&self, keys: &[String]) -> PortResult<Vec<(String, T)>> {
        let rows = self.rows.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|key| rows.get(key).map(|(value, _)| (key.clone(), value.clone())))
            .collect())
    }

    async fn set_many(&self, items: Vec<(String, T)>, _ttl: Option<Duration>) -> PortResult<()> {
        for (key, value) in items {
            self.set(&key, value, None).await?;
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> PortResult<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + Sync + Clone> KeyValueStoreCas<T> for InMemoryKeyValueStore<T> {
    async fn get_versioned(&self, key: &str) -> PortResult<VersionedLookup<T>> {
        Ok(match self.rows.lock().unwrap().get(key) {
            Some((value, version)) => VersionedLookup::Found {
                value: value.clone(),
                version: Version(*version),
            },
            None => VersionedLookup::NotFound,
        })
    }

    async fn set_if_version(
        &self,
        key: &str,
        value: T,
        expected: Version,
        _ttl: Option<Duration>,
    ) -> PortResult<CasOutcome> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get(key) {
            None => Ok(CasOutcome::NotFound),
            Some((_, current)) if *current != expected.0 => Ok(CasOutcome::Conflict),
            Some(_) => {
                let next_version = expected.0 + 1;
                rows.insert(key.to_string(), (value, next_version));
                Ok(CasOutcome::Written {
                    version: Version(next_version),
                })
            }
        }
    }
}

#[async_trait]
impl<T: Send + Sync + Clone> KeyValueStoreConditional<T> for InMemoryKeyValueStore<T> {
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: T,
        _ttl: Option<Duration>,
    ) -> PortResult<ConditionalOutcome> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(key) {
            Ok(ConditionalOutcome::Skipped)
        } else {
            rows.insert(key.to_string(), (value, 1));
            Ok(ConditionalOutcome::Written)
        }
    }

    async fn set_if_exists(
        &self,
        key: &str,
        value: T,
        _ttl: Option<Duration>,
    ) -> PortResult<ConditionalOutcome> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(key) {
            let version = rows.get(key).map_or(1, |(_, version)| version + 1);
            rows.insert(key.to_string(), (value, version));
            Ok(ConditionalOutcome::Written)
        } else {
            Ok(ConditionalOutcome::Skipped)
        }
    }
}

/// A trivial in-memory blob store keyed by `{bucket}/{key}`.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, ObjectBody>>,
}

impl InMemoryBlobStore {
    fn object_key(location: &StorageLocation) -> String {
        format!("{}/{}", location.bucket, location.key)
    }

    /// Seed the store with an object, as if a client had already PUT it.
    pub fn seed(&self, location: &StorageLocation, data: bytes::Bytes, content_type: Option<String>) {
        self.objects.lock().unwrap().insert(
            Self::object_key(location),
            ObjectBody {
                size_bytes: data.len() as u64,
                data,
                content_type,
            },
        );
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get_presigned_upload_url(
        &self,
        location: &StorageLocation,
        options: PresignOptions,
    ) -> PortResult<PresignedUpload> {
        Ok(PresignedUpload {
            url: format!("https://fake-blobs.test/{}", Self::object_key(location)),
            location: location.clone(),
            expires_at: Utc::now()
                + chrono::Duration::seconds(i64::try_from(options.expires_in_seconds).unwrap_or(i64::MAX)),
        })
    }

    async fn head(&self, location: &StorageLocation) -> PortResult<Option<ObjectMeta>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&Self::object_key(location))
            .map(|object| ObjectMeta {
                size_bytes: object.size_bytes,
                content_type: object.content_type.clone(),
            }))
    }

    async fn get(&self, location: &StorageLocation) -> PortResult<Option<ObjectBody>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&Self::object_key(location))
            .cloned())
    }

    async fn put(
        &self,
        location: &StorageLocation,
        data: bytes::Bytes,
        content_type: Option<String>,
    ) -> PortResult<()> {
        self.objects.lock().unwrap().insert(
            Self::object_key(location),
            ObjectBody {
                size_bytes: data.len() as u64,
                data,
                content_type,
            },
        );
        Ok(())
    }

    async fn copy(
        &self,
        src: &StorageLocation,
        dst: &StorageLocation,
        _metadata: Option<HashMap<String, String>>,
    ) -> PortResult<()> {
        let object = self
            .objects
            .lock()
            .unwrap()
            .get(&Self::object_key(src))
            .cloned();
        if let Some(object) = object {
            self.objects
                .lock()
                .unwrap()
                .insert(Self::object_key(dst), object);
        }
        Ok(())
    }

    async fn delete(&self, location: &StorageLocation) -> PortResult<()> {
        self.objects.lock().unwrap().remove(&Self::object_key(location));
        Ok(())
    }
}

/// An image processor that echoes the input as the `"original"` variant and
/// appends any additional variants the test configured, rewriting only the
/// variant name and content type (bytes are shared with the original).
pub struct StubImageProcessor {
    extra_variants: Vec<String>,
}

impl StubImageProcessor {
    /// An image processor emitting only the required `"original"` variant.
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            extra_variants: Vec::new(),
        }
    }

    /// An image processor emitting `"original"` plus `names`, in order.
    #[must_use]
    pub fn with_variants(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            extra_variants: names.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ImageProcessor for StubImageProcessor {
    async fn process(&self, input: ProcessInput) -> PortResult<Vec<Variant>> {
        let mut variants = vec![Variant {
            name: "original".to_string(),
            data: input.data.clone(),
            content_type: input.content_type.clone(),
        }];
        for name in &self.extra_variants {
            variants.push(Variant {
                name: name.clone(),
                data: input.data.clone(),
                content_type: input.content_type.clone(),
            });
        }
        Ok(variants)
    }
}

/// An image processor that always fails to emit an `"original"` variant,
/// simulating an unrecoverable transform.
pub struct MissingOriginalImageProcessor;

#[async_trait]
impl ImageProcessor for MissingOriginalImageProcessor {
    async fn process(&self, input: ProcessInput) -> PortResult<Vec<Variant>> {
        Ok(vec![Variant {
            name: "thumbnail".to_string(),
            data: input.data,
            content_type: input.content_type,
        }])
    }
}

/// A test-only backoff policy that returns the same fixed delay for every
/// attempt, regardless of strategy or jitter. Deliberately trivial: tests
/// that exercise actual strategy/jitter behavior use
/// `upload_config::StaticBackoffPolicy` instead.
pub struct FixedDelayBackoffPolicy {
    delay: Duration,
}

impl FixedDelayBackoffPolicy {
    /// Construct a policy that always delays by `delay`.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffPolicy for FixedDelayBackoffPolicy {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// A retry executor that actually retries, sleeping via [`tokio::time::sleep`]
/// between attempts. Honors `max_attempts` and `max_elapsed`.
pub struct BoundedRetryExecutor;

#[async_trait]
impl RetryExecutor for BoundedRetryExecutor {
    async fn execute<T, E, F, Fut>(
        &self,
        config: &RetryConfig,
        op: F,
    ) -> Result<T, RetryExhausted<E>>
    where
        T: Send,
        E: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<T, E>> + Send,
    {
        let start = tokio::time::Instant::now();
        let mut attempt = 0u32;
        let mut last_error = None;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    last_error = Some(error);
                    let elapsed = start.elapsed();
                    let timed_out = config
                        .max_elapsed
                        .is_some_and(|max_elapsed| elapsed >= max_elapsed);
                    if attempt >= config.max_attempts || timed_out {
                        return Err(RetryExhausted {
                            last_error: last_error.expect("set above"),
                            attempts: attempt,
                            elapsed,
                            timed_out,
                        });
                    }
                    tokio::time::sleep(config.delay.delay(attempt)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upload_core::ports::RetryConfig as PortRetryConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn in_memory_kv_store_cas_rejects_stale_versions() {
        let store = InMemoryKeyValueStore::<String>::default();
        store.set("k", "v1".into(), None).await.unwrap();
        let VersionedLookup::Found { version, .. } = store.get_versioned("k").await.unwrap() else {
            panic!("expected a versioned value");
        };

        let outcome = store
            .set_if_version("k", "v2".into(), version, None)
            .await
            .unwrap();
        assert!(matches!(outcome, CasOutcome::Written { .. }));

        let stale = store
            .set_if_version("k", "v3".into(), version, None)
            .await
            .unwrap();
        assert!(matches!(stale, CasOutcome::Conflict));
    }

    #[tokio::test]
    async fn in_memory_blob_store_round_trips_put_and_get() {
        let store = InMemoryBlobStore::default();
        let location = StorageLocation {
            bucket: "bucket".into(),
            key: "final/x/photo.jpg".into(),
        };
        store
            .put(&location, bytes::Bytes::from_static(b"bytes"), None)
            .await
            .unwrap();

        let body = store.get(&location).await.unwrap().unwrap();
        assert_eq!(body.data.as_ref(), b"bytes");
    }

    #[tokio::test]
    async fn bounded_retry_executor_retries_until_success() {
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let config = PortRetryConfig {
            max_attempts: 3,
            delay: Arc::new(FixedDelayBackoffPolicy::new(Duration::from_millis(1))),
            max_elapsed: None,
        };
        let executor = BoundedRetryExecutor;
        let counter = attempts.clone();
        let result: Result<u32, ()> = executor
            .execute(&config, || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    if n < 2 {
                        Err(())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
    }
}
