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
#![allow(clippy::multiple_crate_versions)]

//! The single façade consumed by `upload-cli` and the finalization worker:
//! composes the metadata store, job queue, and object store with a
//! blob-promotion step. Layout: `model.rs` (request/outcome types),
//! `error.rs`, `service.rs` (the façade itself).

pub mod error;
pub mod model;
pub mod service;

pub use error::{OrchestratorError, OrchestratorResult};
pub use model::{CompleteUploadOutcome, CreateUploadInput, CreateUploadOutcome, FinalizeOutcome};
pub use service::UploadOrchestrator;
