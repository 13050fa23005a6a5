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

//! Operator CLI for ad-hoc `create`/`complete`/`status` calls against the
//! upload orchestrator.
//!
//! Layout: `cli.rs` (argument parsing, command dispatch), `client.rs`
//! (`CliError` and orchestrator construction), `output.rs` (renderers), with
//! a thin `main.rs` that delegates to `run()`.
//!
//! This CLI builds the orchestrator the same way the daemon does (see
//! `upload_app::bootstrap::build_orchestrator`), so commands issued against
//! a `postgres`-configured backend observe the same records the running
//! daemon does. Against the default in-memory backend, each invocation is
//! its own isolated process and only useful for exercising a single
//! create/complete/status sequence in one call.

pub mod cli;
pub mod client;
pub mod output;

pub use cli::run;
