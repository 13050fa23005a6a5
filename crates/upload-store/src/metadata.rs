//! Versioned upload metadata store with a strict state machine, enforced via
//! compare-and-swap on opaque version tokens.

use chrono::{DateTime, Utc};
use upload_core::model::transitions::{self, TransitionCheck};
use upload_core::ports::{
    ConditionalOutcome, KeyValueStore, KeyValueStoreCas, KeyValueStoreConditional,
};
use upload_core::{UploadId, UploadRecord, WriteOutcome};

use crate::error::Result as StoreResult;
use crate::keys::KeySpace;

/// Upload metadata store: `get`, `create`, and the four state-machine
/// mutators. Every mutator reads the current record with its version token
/// and writes back via compare-and-swap.
pub struct UploadMetadataStore<S> {
    store: S,
    keys: KeySpace,
}

impl<S> UploadMetadataStore<S>
where
    S: KeyValueStoreCas<UploadRecord> + KeyValueStoreConditional<UploadRecord>,
{
    /// Construct a new metadata store over `store`, namespaced under `keys`.
    #[must_use]
    pub const fn new(store: S, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Fetch the current record for `id`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn get(&self, id: &UploadId) -> StoreResult<Option<UploadRecord>> {
        let key = self.keys.upload_metadata(id);
        Ok(self.store.get(&key).await?.into_option())
    }

    /// Create a new record, write-if-absent. Duplicate ids yield
    /// [`WriteOutcome::Already`], never `Conflict`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn create(&self, record: UploadRecord) -> StoreResult<WriteOutcome> {
        let key = self.keys.upload_metadata(record.id());
        match self.store.set_if_not_exists(&key, record, None).await? {
            ConditionalOutcome::Written => Ok(WriteOutcome::Written),
            ConditionalOutcome::Skipped => Ok(WriteOutcome::Already),
        }
    }

    /// `awaiting_upload -> queued`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn mark_queued(&self, id: &UploadId, at: DateTime<Utc>) -> StoreResult<WriteOutcome> {
        let key = self.keys.upload_metadata(id);
        let Some((current, version)) = self.get_versioned(&key).await? else {
            return Ok(WriteOutcome::NotFound);
        };
        match transitions::check_mark_queued(&current) {
            TransitionCheck::Already => Ok(WriteOutcome::Already),
            TransitionCheck::Invalid { expected, actual } => {
                Ok(WriteOutcome::InvalidTransition { expected, actual })
            }
            TransitionCheck::Proceed => {
                let UploadRecord::AwaitingUpload {
                    id,
                    staging,
                    filename,
                    content_type,
                    expected_size_bytes,
                    created_at,
                    ..
                } = current
                else {
                    unreachable!("check_mark_queued only proceeds from awaiting_upload")
                };
                let next = UploadRecord::Queued {
                    id,
                    staging,
                    filename,
                    content_type,
                    expected_size_bytes,
                    created_at,
                    updated_at: at,
                    queued_at: at,
                };
                self.write_cas(&key, next, version).await
            }
        }
    }

    /// `queued -> processing`, idempotent only when `filename` matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn mark_processing(
        &self,
        id: &UploadId,
        filename: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome> {
        let key = self.keys.upload_metadata(id);
        let Some((current, version)) = self.get_versioned(&key).await? else {
            return Ok(WriteOutcome::NotFound);
        };
        match transitions::check_mark_processing(&current, filename) {
            TransitionCheck::Already => Ok(WriteOutcome::Already),
            TransitionCheck::Invalid { expected, actual } => {
                Ok(WriteOutcome::InvalidTransition { expected, actual })
            }
            TransitionCheck::Proceed => {
                let UploadRecord::Queued {
                    id,
                    staging,
                    content_type,
                    expected_size_bytes,
                    created_at,
                    queued_at,
                    ..
                } = current
                else {
                    unreachable!("check_mark_processing only proceeds from queued")
                };
                let next = UploadRecord::Processing {
                    id,
                    staging,
                    filename: filename.to_string(),
                    content_type,
                    expected_size_bytes,
                    created_at,
                    updated_at: at,
                    queued_at,
                };
                self.write_cas(&key, next, version).await
            }
        }
    }

    /// `processing -> finalized`, idempotent only when `final_location` and
    /// `actual_size_bytes` match exactly.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn mark_finalized(
        &self,
        id: &UploadId,
        final_location: upload_core::model::StorageLocation,
        actual_size_bytes: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome> {
        let key = self.keys.upload_metadata(id);
        let Some((current, version)) = self.get_versioned(&key).await? else {
            return Ok(WriteOutcome::NotFound);
        };
        match transitions::check_mark_finalized(&current, &final_location, actual_size_bytes) {
            TransitionCheck::Already => Ok(WriteOutcome::Already),
            TransitionCheck::Invalid { expected, actual } => {
                Ok(WriteOutcome::InvalidTransition { expected, actual })
            }
            TransitionCheck::Proceed => {
                let UploadRecord::Processing {
                    id,
                    staging,
                    filename,
                    content_type,
                    expected_size_bytes,
                    created_at,
                    queued_at,
                    ..
                } = current
                else {
                    unreachable!("check_mark_finalized only proceeds from processing")
                };
                let next = UploadRecord::Finalized {
                    id,
                    staging,
                    filename,
                    content_type,
                    expected_size_bytes,
                    created_at,
                    updated_at: at,
                    queued_at,
                    finalized_at: at,
                    final_location,
                    actual_size_bytes,
                };
                self.write_cas(&key, next, version).await
            }
        }
    }

    /// `processing -> failed`, idempotent only when `reason` matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    pub async fn mark_failed(
        &self,
        id: &UploadId,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome> {
        let reason = reason.into();
        let key = self.keys.upload_metadata(id);
        let Some((current, version)) = self.get_versioned(&key).await? else {
            return Ok(WriteOutcome::NotFound);
        };
        match transitions::check_mark_failed(&current, &reason) {
            TransitionCheck::Already => Ok(WriteOutcome::Already),
            TransitionCheck::Invalid { expected, actual } => {
                Ok(WriteOutcome::InvalidTransition { expected, actual })
            }
            TransitionCheck::Proceed => {
                let UploadRecord::Processing {
                    id,
                    staging,
                    filename,
                    content_type,
                    expected_size_bytes,
                    created_at,
                    queued_at,
                    ..
                } = current
                else {
                    unreachable!("check_mark_failed only proceeds from processing")
                };
                let next = UploadRecord::Failed {
                    id,
                    staging,
                    filename: Some(filename),
                    content_type,
                    expected_size_bytes,
                    created_at,
                    updated_at: at,
                    queued_at: Some(queued_at),
                    failure_reason: reason,
                };
                self.write_cas(&key, next, version).await
            }
        }
    }

    async fn get_versioned(
        &self,
        key: &str,
    ) -> StoreResult<Option<(UploadRecord, upload_core::ports::Version)>> {
        use upload_core::ports::VersionedLookup;
        match self.store.get_versioned(key).await? {
            VersionedLookup::Found { value, version } => Ok(Some((value, version))),
            VersionedLookup::NotFound => Ok(None),
        }
    }

    async fn write_cas(
        &self,
        key: &str,
        next: UploadRecord,
        expected: upload_core::ports::Version,
    ) -> StoreResult<WriteOutcome> {
        use upload_core::ports::CasOutcome;
        match self.store.set_if_version(key, next, expected, None).await? {
            CasOutcome::Written { .. } => Ok(WriteOutcome::Written),
            CasOutcome::Conflict => Ok(WriteOutcome::Conflict),
            CasOutcome::NotFound => Ok(WriteOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use upload_core::error::PortResult;
    use upload_core::model::StorageLocation;
    use upload_core::ports::{
        CasOutcome, ConditionalOutcome as PortConditionalOutcome, KeyValueStore, Lookup,
        VersionedLookup,
    };
    use upload_core::ports::Version;

    #[derive(Default)]
    struct InMemoryCasStore {
        rows: Mutex<HashMap<String, (UploadRecord, u64)>>,
    }

    #[async_trait]
    impl KeyValueStore<UploadRecord> for InMemoryCasStore {
        async fn get(&self, key: &str) -> PortResult<Lookup<UploadRecord>> {
            Ok(match self.rows.lock().unwrap().get(key) {
                Some((value, _)) => Lookup::Found(value.clone()),
                None => Lookup::NotFound,
            })
        }

        async fn set(&self, key: &str, value: UploadRecord, _ttl: Option<Duration>) -> PortResult<()> {
            let mut rows = self.rows.lock().unwrap();
            let version = rows.get(key).map_or(1, |(_, v)| v + 1);
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

        async fn get_many(&self, keys: &[String]) -> PortResult<Vec<(String, UploadRecord)>> {
            let rows = self.rows.lock().unwrap();
            Ok(keys
                .iter()
                .filter_map(|k| rows.get(k).map(|(v, _)| (k.clone(), v.clone())))
                .collect())
        }

        async fn set_many(
            &self,
            items: Vec<(String, UploadRecord)>,
            _ttl: Option<Duration>,
        ) -> PortResult<()> {
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
    impl KeyValueStoreCas<UploadRecord> for InMemoryCasStore {
        async fn get_versioned(&self, key: &str) -> PortResult<VersionedLookup<UploadRecord>> {
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
            value: UploadRecord,
            expected: Version,
            _ttl: Option<Duration>,
        ) -> PortResult<CasOutcome> {
            let mut rows = self.rows.lock().unwrap();
            match rows.get(key) {
                None => Ok(CasOutcome::NotFound),
                Some((_, current_version)) if *current_version != expected.0 => {
                    Ok(CasOutcome::Conflict)
                }
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
    impl KeyValueStoreConditional<UploadRecord> for InMemoryCasStore {
        async fn set_if_not_exists(
            &self,
            key: &str,
            value: UploadRecord,
            _ttl: Option<Duration>,
        ) -> PortResult<PortConditionalOutcome> {
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(key) {
                Ok(PortConditionalOutcome::Skipped)
            } else {
                rows.insert(key.to_string(), (value, 1));
                Ok(PortConditionalOutcome::Written)
            }
        }

        async fn set_if_exists(
            &self,
            key: &str,
            value: UploadRecord,
            _ttl: Option<Duration>,
        ) -> PortResult<PortConditionalOutcome> {
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(key) {
                let version = rows.get(key).map_or(1, |(_, v)| v + 1);
                rows.insert(key.to_string(), (value, version));
                Ok(PortConditionalOutcome::Written)
            } else {
                Ok(PortConditionalOutcome::Skipped)
            }
        }
    }

    fn awaiting(id: UploadId, now: DateTime<Utc>) -> UploadRecord {
        UploadRecord::AwaitingUpload {
            id,
            staging: StorageLocation {
                bucket: "b".into(),
                key: "staging/x".into(),
            },
            filename: Some("photo.jpg".into()),
            content_type: None,
            expected_size_bytes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn store() -> UploadMetadataStore<InMemoryCasStore> {
        UploadMetadataStore::new(InMemoryCasStore::default(), KeySpace::new("acme"))
    }

    #[tokio::test]
    async fn create_is_write_if_absent() {
        let store = store();
        let now = Utc::now();
        let id = UploadId::generate();
        let record = awaiting(id.clone(), now);

        assert_eq!(store.create(record.clone()).await.unwrap(), WriteOutcome::Written);
        assert_eq!(store.create(record).await.unwrap(), WriteOutcome::Already);
    }

    #[tokio::test]
    async fn full_happy_path_transition_sequence() {
        let store = store();
        let now = Utc::now();
        let id = UploadId::generate();
        store.create(awaiting(id.clone(), now)).await.unwrap();

        assert_eq!(
            store.mark_queued(&id, now).await.unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(
            store.mark_queued(&id, now).await.unwrap(),
            WriteOutcome::Already
        );

        assert_eq!(
            store.mark_processing(&id, "photo.jpg", now).await.unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(
            store.mark_processing(&id, "photo.jpg", now).await.unwrap(),
            WriteOutcome::Already
        );
        match store.mark_processing(&id, "other.jpg", now).await.unwrap() {
            WriteOutcome::InvalidTransition { actual, .. } => assert_eq!(actual, "processing"),
            other => panic!("expected invalid transition, got {other:?}"),
        }

        let final_location = StorageLocation {
            bucket: "b".into(),
            key: "final/x".into(),
        };
        assert_eq!(
            store
                .mark_finalized(&id, final_location.clone(), 10, now)
                .await
                .unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(
            store
                .mark_finalized(&id, final_location, 10, now)
                .await
                .unwrap(),
            WriteOutcome::Already
        );
    }

    #[tokio::test]
    async fn mark_queued_on_missing_record_is_not_found() {
        let store = store();
        let id = UploadId::generate();
        assert_eq!(
            store.mark_queued(&id, Utc::now()).await.unwrap(),
            WriteOutcome::NotFound
        );
    }
}
