use std::fmt::Write as _;
use std::path::Path;

use collector_core::executor::{read_summary, ExecutionSummary};

use crate::commands::cli::SummaryArgs;
use crate::error::CliError;

/// Per-step results table followed by the partial-type warning, if any.
pub fn render_summary(summary: &ExecutionSummary) -> String {
    let results = &summary.integration_step_results;
    let id_width = results
        .iter()
        .map(|r| r.id.len())
        .max()
        .unwrap_or(0)
        .max("STEP".len());

    let mut out = String::new();
    let _ = writeln!(out, "{:<id_width$}  {:<42}  TYPES", "STEP", "STATUS");
    for result in results {
        let types = if result.encountered_types.is_empty() {
            "-".to_string()
        } else {
            result.encountered_types.join(", ")
        };
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<42}  {}",
            result.id,
            result.status.as_str(),
            types
        );
    }

    let partial = &summary.metadata.partial_datasets;
    if !partial.is_empty() {
        let _ = writeln!(
            out,
            "\nWARNING: partial datasets (producing steps did not succeed): {}",
            partial.types.join(", ")
        );
    }
    out
}

pub async fn handle_summary(args: SummaryArgs, root: &Path) -> Result<i32, CliError> {
    let summary = read_summary(root).await?;
    if args.json {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::Command(e.to_string()))?;
        println!("{json}");
    } else {
        print!("{}", render_summary(&summary));
    }
    Ok(0)
}
