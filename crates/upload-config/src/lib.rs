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

//! Layered configuration for the upload pipeline: compiled-in defaults, then
//! an optional TOML/YAML file, then `UPLOAD_*` environment overrides, then
//! whole-config validation. Layout: `defaults.rs` (compiled-in constants),
//! `model.rs` (the typed sections), `backoff.rs` (the retry/backoff policy
//! built from those sections), `loader.rs` (the layering itself),
//! `validate.rs` (post-assembly checks), `error.rs` (`ConfigError`).

pub mod backoff;
pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use backoff::StaticBackoffPolicy;
pub use error::{ConfigError, ConfigResult};
pub use loader::{load, CONFIG_FILE_ENV_VAR};
pub use model::{
    AppConfig, BackoffSettings, BackoffStrategy, IoRetrySettings, JitterStrategy, PresignSettings,
    StoreBackend, StoreSettings, TelemetrySettings, WorkerSettings,
};
