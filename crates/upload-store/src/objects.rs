//! Thin, keyspace-scoped policy layer over an abstract [`BlobStore`].

use std::collections::HashMap;

use bytes::Bytes;
use upload_core::model::StorageLocation;
use upload_core::ports::{BlobStore, ObjectBody, ObjectMeta, PresignOptions, PresignedUpload};
use upload_core::UploadId;

use crate::error::Result as StoreResult;

/// Locations produced by a successful staging-to-final promotion.
#[derive(Debug, Clone)]
pub struct PromotedLocations {
    /// Staging location the client originally PUT into.
    pub staging: StorageLocation,
    /// Final location the object was copied to.
    pub final_location: StorageLocation,
}

/// Keyspace-scoped wrapper over a [`BlobStore`], applying the staging/final
/// key convention uniformly: `{prefix}/{uploadId}/{filename}`.
pub struct UploadObjectStore<B> {
    blobs: B,
    bucket: String,
    staging_prefix: String,
    final_prefix: String,
}

impl<B: BlobStore> UploadObjectStore<B> {
    /// Construct a new object store wrapper over `blobs`.
    #[must_use]
    pub fn new(
        blobs: B,
        bucket: impl Into<String>,
        staging_prefix: impl Into<String>,
        final_prefix: impl Into<String>,
    ) -> Self {
        Self {
            blobs,
            bucket: bucket.into(),
            staging_prefix: staging_prefix.into(),
            final_prefix: final_prefix.into(),
        }
    }

    fn staging_location(&self, upload_id: &UploadId, filename: &str) -> StorageLocation {
        StorageLocation {
            bucket: self.bucket.clone(),
            key: format!("{}/{upload_id}/{filename}", self.staging_prefix),
        }
    }

    fn final_location(&self, upload_id: &UploadId, filename: &str) -> StorageLocation {
        StorageLocation {
            bucket: self.bucket.clone(),
            key: format!("{}/{upload_id}/{filename}", self.final_prefix),
        }
    }

    /// Issue a presigned upload URL targeting the staging key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying blob store fails.
    pub async fn get_presigned_upload_url(
        &self,
        upload_id: &UploadId,
        filename: &str,
        content_type: Option<String>,
        expires_in_seconds: u64,
    ) -> StoreResult<PresignedUpload> {
        let location = self.staging_location(upload_id, filename);
        let presigned = self
            .blobs
            .get_presigned_upload_url(
                &location,
                PresignOptions {
                    expires_in_seconds,
                    content_type,
                },
            )
            .await?;
        Ok(presigned)
    }

    /// Fetch metadata for the staged object, or `None` if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying blob store fails.
    pub async fn head_staging_object(
        &self,
        upload_id: &UploadId,
        filename: &str,
    ) -> StoreResult<Option<ObjectMeta>> {
        let location = self.staging_location(upload_id, filename);
        Ok(self.blobs.head(&location).await?)
    }

    /// Fetch the staged object's full body, or `None` if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying blob store fails.
    pub async fn get_staging_object(
        &self,
        upload_id: &UploadId,
        filename: &str,
    ) -> StoreResult<Option<ObjectBody>> {
        let location = self.staging_location(upload_id, filename);
        Ok(self.blobs.get(&location).await?)
    }

    /// Write `data` directly to the final key for `upload_id`/`filename`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying blob store fails.
    pub async fn put_final_object(
        &self,
        upload_id: &UploadId,
        filename: &str,
        data: Bytes,
        content_type: Option<String>,
    ) -> StoreResult<StorageLocation> {
        let location = self.final_location(upload_id, filename);
        self.blobs.put(&location, data, content_type).await?;
        Ok(location)
    }

    /// Copy the staged object to its final location, then best-effort delete
    /// the staging remnant. A failed delete is logged and swallowed; the
    /// remnant is garbage-collected out-of-band. Not on the critical
    /// finalize path (variants are written directly via
    /// [`Self::put_final_object`]); retained for alternative finalize
    /// strategies.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy itself fails.
    pub async fn promote_to_final(
        &self,
        upload_id: &UploadId,
        filename: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> StoreResult<PromotedLocations> {
        let staging = self.staging_location(upload_id, filename);
        let final_location = self.final_location(upload_id, filename);
        self.blobs
            .copy(&staging, &final_location, metadata)
            .await?;
        if let Err(error) = self.blobs.delete(&staging).await {
            tracing::warn!(
                upload_id = %upload_id,
                filename,
                %error,
                "failed to delete staging object after promotion"
            );
        }
        Ok(PromotedLocations {
            staging,
            final_location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use upload_core::error::PortResult;

    #[derive(Default)]
    struct FakeBlobStore {
        put: Mutex<Vec<(StorageLocation, Bytes)>>,
        deleted: Mutex<Vec<StorageLocation>>,
    }

    #[async_trait]
    impl BlobStore for FakeBlobStore {
        async fn get_presigned_upload_url(
            &self,
            location: &StorageLocation,
            options: PresignOptions,
        ) -> PortResult<PresignedUpload> {
            Ok(PresignedUpload {
                url: format!("https://blobs.example/{}", location.key),
                location: location.clone(),
                expires_at: Utc::now()
                    + chrono::Duration::seconds(i64::try_from(options.expires_in_seconds).unwrap()),
            })
        }

        async fn head(&self, _location: &StorageLocation) -> PortResult<Option<ObjectMeta>> {
            Ok(None)
        }

        async fn get(&self, _location: &StorageLocation) -> PortResult<Option<ObjectBody>> {
            Ok(None)
        }

        async fn put(
            &self,
            location: &StorageLocation,
            data: Bytes,
            _content_type: Option<String>,
        ) -> PortResult<()> {
            self.put.lock().unwrap().push((location.clone(), data));
            Ok(())
        }

        async fn copy(
            &self,
            _src: &StorageLocation,
            _dst: &StorageLocation,
            _metadata: Option<HashMap<String, String>>,
        ) -> PortResult<()> {
            Ok(())
        }

        async fn delete(&self, location: &StorageLocation) -> PortResult<()> {
            self.deleted.lock().unwrap().push(location.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn staging_and_final_keys_follow_the_prefix_convention() {
        let store = UploadObjectStore::new(FakeBlobStore::default(), "bucket", "staging", "final");
        let upload_id = UploadId::generate();

        let location = store
            .put_final_object(&upload_id, "photo.jpg", Bytes::from_static(b"data"), None)
            .await
            .unwrap();
        assert_eq!(location.key, format!("final/{upload_id}/photo.jpg"));

        let presigned = store
            .get_presigned_upload_url(&upload_id, "photo.jpg", None, 300)
            .await
            .unwrap();
        assert_eq!(
            presigned.location.key,
            format!("staging/{upload_id}/photo.jpg")
        );
    }

    #[tokio::test]
    async fn promote_copies_then_deletes_staging() {
        let store = UploadObjectStore::new(FakeBlobStore::default(), "bucket", "staging", "final");
        let upload_id = UploadId::generate();

        let promoted = store
            .promote_to_final(&upload_id, "photo.jpg", None)
            .await
            .unwrap();
        assert_eq!(promoted.staging.key, format!("staging/{upload_id}/photo.jpg"));
        assert_eq!(promoted.final_location.key, format!("final/{upload_id}/photo.jpg"));
        assert_eq!(store.blobs.deleted.lock().unwrap().len(), 1);
    }
}
