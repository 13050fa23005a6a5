//! Shared error type and orchestrator construction for the CLI.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use upload_app::bootstrap::{Orchestrator, build_orchestrator};
use upload_config::AppConfig;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    /// The command's arguments themselves were invalid.
    Validation(String),
    /// Something downstream (configuration, the storage backend) failed.
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

/// Load configuration from `config_path` (or the default search path) and
/// compose the orchestrator exactly as the daemon would.
pub(crate) async fn orchestrator_from(config_path: Option<&PathBuf>) -> CliResult<Orchestrator> {
    let config: AppConfig =
        upload_config::load(config_path.map(PathBuf::as_path)).map_err(CliError::failure)?;
    build_orchestrator(&config).await.map_err(CliError::failure)
}
