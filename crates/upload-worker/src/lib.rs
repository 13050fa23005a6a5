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

//! The concurrency coordinator: polls due finalize jobs, claims them, and
//! drives each through [`upload_orchestrator::UploadOrchestrator`]. Layout:
//! `config.rs` (tuning knobs), `worker.rs` (the run loop itself).

pub mod config;
pub mod worker;

pub use config::WorkerConfig;
pub use worker::UploadFinalizationWorker;
