//! Argument parsing and command dispatch for the operator CLI.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use upload_core::UploadId;
use upload_orchestrator::CreateUploadInput;

use crate::client::{CliError, CliResult, orchestrator_from};
use crate::output::{self, OutputFormat};

const DEFAULT_PRESIGN_EXPIRES_IN_SECONDS: u64 = 900;

#[derive(Parser)]
#[command(name = "upload-cli", about = "Operator CLI for the upload finalization pipeline")]
struct Cli {
    /// Path to a configuration file; falls back to `UPLOAD_CONFIG_FILE`
    /// and compiled-in defaults when omitted.
    #[arg(long, global = true, env = "UPLOAD_CONFIG_FILE")]
    config: Option<PathBuf>,
    /// Output rendering.
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue a presigned upload URL and record the upload as `awaiting_upload`.
    Create(CreateArgs),
    /// Signal that the client finished PUTing the object and enqueue finalization.
    Complete(CompleteArgs),
    /// Look up the current state of an upload.
    Status(StatusArgs),
}

#[derive(clap::Args)]
struct CreateArgs {
    /// Filename the client intends to upload.
    #[arg(long)]
    filename: Option<String>,
    /// Content type the client intends to upload.
    #[arg(long)]
    content_type: Option<String>,
    /// Expected size in bytes, if known.
    #[arg(long)]
    expected_size_bytes: Option<u64>,
    /// How long the presigned URL should remain valid.
    #[arg(long, default_value_t = DEFAULT_PRESIGN_EXPIRES_IN_SECONDS)]
    expires_in_seconds: u64,
}

#[derive(clap::Args)]
struct CompleteArgs {
    /// Identifier returned by `create`.
    #[arg(long)]
    upload_id: String,
}

#[derive(clap::Args)]
struct StatusArgs {
    /// Identifier returned by `create`.
    #[arg(long)]
    upload_id: String,
}

/// Parse CLI arguments, execute the requested command, and return the
/// process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let result = dispatch(&cli).await;
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Command::Create(args) => handle_create(cli, args).await,
        Command::Complete(args) => handle_complete(cli, args).await,
        Command::Status(args) => handle_status(cli, args).await,
    }
}

async fn handle_create(cli: &Cli, args: &CreateArgs) -> CliResult<()> {
    let orchestrator = orchestrator_from(cli.config.as_ref()).await?;
    let outcome = orchestrator
        .create_upload(CreateUploadInput {
            filename: args.filename.clone(),
            content_type: args.content_type.clone(),
            expected_size_bytes: args.expected_size_bytes,
            presign_expires_in_seconds: args.expires_in_seconds,
        })
        .await
        .map_err(CliError::failure)?;
    output::render_create_outcome(&outcome, cli.format)
}

async fn handle_complete(cli: &Cli, args: &CompleteArgs) -> CliResult<()> {
    let upload_id = parse_upload_id(&args.upload_id)?;
    let orchestrator = orchestrator_from(cli.config.as_ref()).await?;
    let outcome = orchestrator
        .complete_upload(&upload_id)
        .await
        .map_err(CliError::failure)?;
    output::render_complete_outcome(&outcome, cli.format)
}

async fn handle_status(cli: &Cli, args: &StatusArgs) -> CliResult<()> {
    let upload_id = parse_upload_id(&args.upload_id)?;
    let orchestrator = orchestrator_from(cli.config.as_ref()).await?;
    let record = orchestrator.get_upload(&upload_id).await.map_err(CliError::failure)?;
    output::render_status(record.as_ref(), cli.format)
}

fn parse_upload_id(raw: &str) -> CliResult<UploadId> {
    UploadId::parse(raw).map_err(|err| CliError::validation(err.to_string()))
}
