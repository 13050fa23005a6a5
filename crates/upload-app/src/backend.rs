//! Trait-object erasure for the two `KeyValueStore` backends this daemon can
//! be configured with, so the orchestrator and worker are instantiated once
//! against a single concrete type regardless of which backend was chosen at
//! startup.
//!
//! The individual `KeyValueStore*` traits already carry a blanket
//! `impl<T: Trait + ?Sized> Trait for Arc<T>` in `upload_core::ports`, so an
//! `Arc<dyn MetadataBackend>` satisfies the orchestrator's trait bounds
//! directly once `MetadataBackend` is declared as their supertrait union.

use std::sync::Arc;

use upload_core::ports::{KeyValueStore, KeyValueStoreCas, KeyValueStoreConditional};
use upload_core::{FinalizeJob, JobIndex, UploadRecord};

/// Everything [`upload_store::UploadMetadataStore`] needs from its backing store.
pub trait MetadataBackend:
    KeyValueStoreCas<UploadRecord> + KeyValueStoreConditional<UploadRecord> + Send + Sync
{
}

impl<T> MetadataBackend for T where
    T: KeyValueStoreCas<UploadRecord> + KeyValueStoreConditional<UploadRecord> + Send + Sync
{
}

/// Type-erased metadata backend, chosen at startup.
pub type DynMetadataStore = Arc<dyn MetadataBackend>;
/// Type-erased job-record backend, chosen at startup.
pub type DynJobStore = Arc<dyn KeyValueStoreCas<FinalizeJob>>;
/// Type-erased job-index backend, chosen at startup.
pub type DynJobIndex = Arc<dyn KeyValueStore<JobIndex>>;
