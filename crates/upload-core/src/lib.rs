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

//! Domain types, state-machine edge checks, and abstract ports shared by the
//! upload finalization pipeline.

pub mod error;
pub mod model;
pub mod ports;

pub use error::{PortError, PortResult};
pub use model::{
    FinalizeJob, InvalidIdentifier, JobId, JobIndex, JobStatus, StorageLocation, UploadId,
    UploadRecord, WriteOutcome,
};
