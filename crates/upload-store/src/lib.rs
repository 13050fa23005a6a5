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
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Upload metadata store, finalize job queue, and object store policy layer.
//!
//! Every type in this crate is generic over the [`upload_core::ports`]
//! traits; none of it knows whether records live in memory or in Postgres.

pub mod error;
pub mod jobs;
pub mod keys;
pub mod metadata;
pub mod objects;

pub use error::{Result as StoreResult, StoreError};
pub use jobs::JobStore;
pub use metadata::UploadMetadataStore;
pub use objects::UploadObjectStore;
