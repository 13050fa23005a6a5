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
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Application bootstrap wiring for the upload finalization daemon.
//!
//! Layout: `bootstrap.rs` (loads configuration, builds the chosen store
//! backend, composes the orchestrator and worker, runs until shutdown),
//! `backend.rs` (trait-object erasure over the store backend choice),
//! `clock.rs` (the production `Clock`), `error.rs` (`AppError`).

pub mod backend;
pub mod bootstrap;
pub mod clock;
pub mod error;

pub use bootstrap::run_app;
