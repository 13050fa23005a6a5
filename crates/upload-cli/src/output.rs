//! Output renderers for CLI commands.

use anyhow::anyhow;
use clap::ValueEnum;
use upload_core::UploadRecord;
use upload_orchestrator::{CompleteUploadOutcome, CreateUploadOutcome};

use crate::client::{CliError, CliResult};

/// Rendering chosen for a command's output.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON, for scripting.
    Json,
    /// Human-readable single-line summary.
    Table,
}

pub(crate) fn render_create_outcome(
    outcome: &CreateUploadOutcome,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "upload_id": outcome.upload_id.as_str(),
                    "presigned_url": outcome.presigned_url,
                    "staging": {
                        "bucket": outcome.staging.bucket,
                        "key": outcome.staging.key,
                    },
                    "expires_at": outcome.expires_at.to_rfc3339(),
                })
            );
        }
        OutputFormat::Table => {
            println!("upload_id: {}", outcome.upload_id);
            println!("presigned_url: {}", outcome.presigned_url);
            println!("staging: {}/{}", outcome.staging.bucket, outcome.staging.key);
            println!("expires_at: {}", outcome.expires_at);
        }
    }
    Ok(())
}

pub(crate) fn render_complete_outcome(
    outcome: &CompleteUploadOutcome,
    format: OutputFormat,
) -> CliResult<()> {
    let status = complete_outcome_status(outcome);
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "status": status })),
        OutputFormat::Table => println!("status: {status}"),
    }
    Ok(())
}

fn complete_outcome_status(outcome: &CompleteUploadOutcome) -> String {
    match outcome {
        CompleteUploadOutcome::Queued => "queued".to_string(),
        CompleteUploadOutcome::AlreadyQueued => "already_queued".to_string(),
        CompleteUploadOutcome::Finalized => "finalized".to_string(),
        CompleteUploadOutcome::Failed { reason } => format!("failed: {reason}"),
        CompleteUploadOutcome::NotFound => "not_found".to_string(),
    }
}

pub(crate) fn render_status(record: Option<&UploadRecord>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => match record {
            Some(record) => {
                let text =
                    serde_json::to_string_pretty(record).map_err(|err| CliError::failure(anyhow!(err)))?;
                println!("{text}");
            }
            None => println!("{}", serde_json::json!({ "status": "not_found" })),
        },
        OutputFormat::Table => match record {
            Some(record) => {
                println!("upload_id: {}", record.id());
                println!("status: {}", record.status_name());
                if let Some(filename) = record.filename() {
                    println!("filename: {filename}");
                }
                if let Some(content_type) = record.content_type() {
                    println!("content_type: {content_type}");
                }
            }
            None => println!("status: not_found"),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_failed_outcome_includes_its_reason() {
        let status = complete_outcome_status(&CompleteUploadOutcome::Failed {
            reason: "missing_original_variant".to_string(),
        });
        assert_eq!(status, "failed: missing_original_variant");
    }

    #[test]
    fn terminal_outcomes_map_to_their_status_names() {
        assert_eq!(complete_outcome_status(&CompleteUploadOutcome::Queued), "queued");
        assert_eq!(
            complete_outcome_status(&CompleteUploadOutcome::AlreadyQueued),
            "already_queued"
        );
        assert_eq!(complete_outcome_status(&CompleteUploadOutcome::Finalized), "finalized");
        assert_eq!(complete_outcome_status(&CompleteUploadOutcome::NotFound), "not_found");
    }
}
