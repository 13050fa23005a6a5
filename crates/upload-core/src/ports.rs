//! Abstract capabilities the core consumes. Every implementation lives
//! outside this crate (in-memory fakes for tests, Postgres/object-storage
//! backends for production); the core only ever depends on these trait
//! boundaries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::PortResult;
use crate::model::StorageLocation;

/// Wall-clock access and cooperative sleeping, abstracted so tests can run
/// without real time passing.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as epoch milliseconds.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Outcome of a plain key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// A value was present for the key.
    Found(T),
    /// No value was present for the key.
    NotFound,
}

impl<T> Lookup<T> {
    /// Convert to `Option<T>`, discarding the not-found/found distinction.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }
}

/// Plain (non-CAS) key-value access.
#[async_trait]
pub trait KeyValueStore<T>: Send + Sync
where
    T: Send + Sync + Clone,
{
    /// Fetch the value stored at `key`.
    async fn get(&self, key: &str) -> PortResult<Lookup<T>>;
    /// Overwrite the value stored at `key`.
    async fn set(&self, key: &str, value: T, ttl: Option<Duration>) -> PortResult<()>;
    /// Remove the value stored at `key`, if any.
    async fn delete(&self, key: &str) -> PortResult<()>;
    /// Whether a value is present at `key`.
    async fn has(&self, key: &str) -> PortResult<bool>;
    /// Batch fetch; missing keys are simply absent from the result.
    async fn get_many(&self, keys: &[String]) -> PortResult<Vec<(String, T)>>;
    /// Batch overwrite.
    async fn set_many(&self, items: Vec<(String, T)>, ttl: Option<Duration>) -> PortResult<()>;
    /// Batch delete.
    async fn delete_many(&self, keys: &[String]) -> PortResult<()>;
}

#[async_trait]
impl<T, V> KeyValueStore<V> for Arc<T>
where
    T: KeyValueStore<V> + ?Sized,
    V: Send + Sync + Clone,
{
    async fn get(&self, key: &str) -> PortResult<Lookup<V>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> PortResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        (**self).delete(key).await
    }

    async fn has(&self, key: &str) -> PortResult<bool> {
        (**self).has(key).await
    }

    async fn get_many(&self, keys: &[String]) -> PortResult<Vec<(String, V)>> {
        (**self).get_many(keys).await
    }

    async fn set_many(&self, items: Vec<(String, V)>, ttl: Option<Duration>) -> PortResult<()> {
        (**self).set_many(items, ttl).await
    }

    async fn delete_many(&self, keys: &[String]) -> PortResult<()> {
        (**self).delete_many(keys).await
    }
}

/// An opaque version token. Strictly changes on every write, including
/// same-value writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u64);

/// Outcome of a versioned read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionedLookup<T> {
    /// A value was present, along with the version it was written at.
    Found {
        /// The stored value.
        value: T,
        /// The version the value was written at.
        version: Version,
    },
    /// No value was present for the key.
    NotFound,
}

/// Outcome of a compare-and-swap write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write applied; carries the new version.
    Written {
        /// The version assigned to the new value.
        version: Version,
    },
    /// The write lost the race against a concurrent writer.
    Conflict,
    /// The key did not exist (`set_if_version` requires an existing record).
    NotFound,
}

/// Compare-and-swap key-value access, layered on top of [`KeyValueStore`].
#[async_trait]
pub trait KeyValueStoreCas<T>: KeyValueStore<T>
where
    T: Send + Sync + Clone,
{
    /// Fetch the value and its current version.
    async fn get_versioned(&self, key: &str) -> PortResult<VersionedLookup<T>>;
    /// Write `value` only if the stored version still matches `expected`.
    async fn set_if_version(
        &self,
        key: &str,
        value: T,
        expected: Version,
        ttl: Option<Duration>,
    ) -> PortResult<CasOutcome>;
}

#[async_trait]
impl<T, V> KeyValueStoreCas<V> for Arc<T>
where
    T: KeyValueStoreCas<V> + ?Sized,
    V: Send + Sync + Clone,
{
    async fn get_versioned(&self, key: &str) -> PortResult<VersionedLookup<V>> {
        (**self).get_versioned(key).await
    }

    async fn set_if_version(
        &self,
        key: &str,
        value: V,
        expected: Version,
        ttl: Option<Duration>,
    ) -> PortResult<CasOutcome> {
        (**self).set_if_version(key, value, expected, ttl).await
    }
}

/// Outcome of a conditional (existence-gated) write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOutcome {
    /// The write applied.
    Written,
    /// The write was skipped because the precondition was not met.
    Skipped,
}

/// Conditional key-value access, layered on top of [`KeyValueStore`].
#[async_trait]
pub trait KeyValueStoreConditional<T>: KeyValueStore<T>
where
    T: Send + Sync + Clone,
{
    /// Write `value` only if no record currently exists at `key`.
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: T,
        ttl: Option<Duration>,
    ) -> PortResult<ConditionalOutcome>;
    /// Write `value` only if a record currently exists at `key`.
    async fn set_if_exists(
        &self,
        key: &str,
        value: T,
        ttl: Option<Duration>,
    ) -> PortResult<ConditionalOutcome>;
}

#[async_trait]
impl<T, V> KeyValueStoreConditional<V> for Arc<T>
where
    T: KeyValueStoreConditional<V> + ?Sized,
    V: Send + Sync + Clone,
{
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: V,
        ttl: Option<Duration>,
    ) -> PortResult<ConditionalOutcome> {
        (**self).set_if_not_exists(key, value, ttl).await
    }

    async fn set_if_exists(
        &self,
        key: &str,
        value: V,
        ttl: Option<Duration>,
    ) -> PortResult<ConditionalOutcome> {
        (**self).set_if_exists(key, value, ttl).await
    }
}

/// Options accompanying a presigned-upload-URL request.
#[derive(Debug, Clone)]
pub struct PresignOptions {
    /// How long the URL remains valid for.
    pub expires_in_seconds: u64,
    /// Content type the client is expected to upload with.
    pub content_type: Option<String>,
}

/// A presigned upload URL and the location it targets.
#[derive(Debug, Clone)]
pub struct PresignedUpload {
    /// URL the client should PUT bytes to.
    pub url: String,
    /// Location the URL targets.
    pub location: StorageLocation,
    /// When the URL stops being valid.
    pub expires_at: DateTime<Utc>,
}

/// Metadata about a stored object, without its body.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Size of the object in bytes.
    pub size_bytes: u64,
    /// Content type recorded for the object, if any.
    pub content_type: Option<String>,
}

/// A stored object's full body and metadata.
#[derive(Debug, Clone)]
pub struct ObjectBody {
    /// Raw bytes of the object.
    pub data: Bytes,
    /// Size of the object in bytes (redundant with `data.len()`, kept for
    /// symmetry with backends that can report size without fetching bytes).
    pub size_bytes: u64,
    /// Content type recorded for the object, if any.
    pub content_type: Option<String>,
}

/// Abstract blob storage: presigning, staging reads, and final writes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Issue a presigned upload URL targeting `location`.
    async fn get_presigned_upload_url(
        &self,
        location: &StorageLocation,
        options: PresignOptions,
    ) -> PortResult<PresignedUpload>;
    /// Fetch metadata for `location` without reading its body.
    async fn head(&self, location: &StorageLocation) -> PortResult<Option<ObjectMeta>>;
    /// Fetch `location`'s full body and metadata.
    async fn get(&self, location: &StorageLocation) -> PortResult<Option<ObjectBody>>;
    /// Write `data` to `location`.
    async fn put(
        &self,
        location: &StorageLocation,
        data: Bytes,
        content_type: Option<String>,
    ) -> PortResult<()>;
    /// Copy `src` to `dst`, optionally attaching metadata.
    async fn copy(
        &self,
        src: &StorageLocation,
        dst: &StorageLocation,
        metadata: Option<HashMap<String, String>>,
    ) -> PortResult<()>;
    /// Delete `location`.
    async fn delete(&self, location: &StorageLocation) -> PortResult<()>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn get_presigned_upload_url(
        &self,
        location: &StorageLocation,
        options: PresignOptions,
    ) -> PortResult<PresignedUpload> {
        (**self).get_presigned_upload_url(location, options).await
    }

    async fn head(&self, location: &StorageLocation) -> PortResult<Option<ObjectMeta>> {
        (**self).head(location).await
    }

    async fn get(&self, location: &StorageLocation) -> PortResult<Option<ObjectBody>> {
        (**self).get(location).await
    }

    async fn put(
        &self,
        location: &StorageLocation,
        data: Bytes,
        content_type: Option<String>,
    ) -> PortResult<()> {
        (**self).put(location, data, content_type).await
    }

    async fn copy(
        &self,
        src: &StorageLocation,
        dst: &StorageLocation,
        metadata: Option<HashMap<String, String>>,
    ) -> PortResult<()> {
        (**self).copy(src, dst, metadata).await
    }

    async fn delete(&self, location: &StorageLocation) -> PortResult<()> {
        (**self).delete(location).await
    }
}

/// Input to the image transform.
#[derive(Debug, Clone)]
pub struct ProcessInput {
    /// Raw bytes of the staged upload.
    pub data: Bytes,
    /// Content type of the staged upload.
    pub content_type: String,
}

/// A derived artifact produced by [`ImageProcessor::process`].
#[derive(Debug, Clone)]
pub struct Variant {
    /// Variant name; at least one must be `"original"`.
    pub name: String,
    /// Raw bytes of the variant.
    pub data: Bytes,
    /// Content type of the variant.
    pub content_type: String,
}

/// Pure image-transform capability. Treated as an external collaborator: the
/// core never inspects pixels, only the variant list shape.
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Transform `input` into an ordered list of variants. At least one
    /// variant must be named `"original"` and emit the source bytes
    /// byte-for-byte.
    async fn process(&self, input: ProcessInput) -> PortResult<Vec<Variant>>;
}

/// A backoff delay strategy, queried by attempt number (1-based).
pub trait BackoffPolicy: Send + Sync {
    /// Delay to apply before the given attempt.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Configuration for a bounded retry attempt.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, inclusive of the first.
    pub max_attempts: u32,
    /// Delay policy applied between attempts.
    pub delay: Arc<dyn BackoffPolicy>,
    /// Optional ceiling on total elapsed wall time across all attempts.
    pub max_elapsed: Option<Duration>,
}

impl RetryConfig {
    /// Validate the configuration, matching the port contract that invalid
    /// configuration is rejected before execution rather than retried.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero.
    pub fn validate(&self) -> PortResult<()> {
        if self.max_attempts == 0 {
            return Err(crate::error::PortError::Invalid {
                operation: "retry_config",
                message: "max_attempts must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of an exhausted retry budget.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// The last error observed before the budget was exhausted.
    pub last_error: E,
    /// Number of attempts made.
    pub attempts: u32,
    /// Total elapsed wall time across all attempts.
    pub elapsed: Duration,
    /// Whether the budget was exhausted due to `max_elapsed` rather than
    /// `max_attempts`.
    pub timed_out: bool,
}

/// Applies a single bounded-retry policy around a fallible async operation.
#[async_trait]
pub trait RetryExecutor: Send + Sync {
    /// Execute `op`, retrying per `config` until it succeeds or the budget is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns `Err(RetryExhausted)` once the attempt or elapsed-time budget
    /// is exhausted, or the configuration itself is invalid.
    async fn execute<T, E, F, Fut>(
        &self,
        config: &RetryConfig,
        op: F,
    ) -> Result<T, RetryExhausted<E>>
    where
        T: Send,
        E: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, E>> + Send;
}
