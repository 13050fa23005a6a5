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

//! Postgres-backed implementation of the [`upload_core::ports`] key-value
//! traits, for deployments that want durable storage instead of the
//! in-memory fakes in `upload-test-support`.

pub mod error;
pub mod store;

pub use error::map_sqlx_error;
pub use store::PostgresKeyValueStore;
