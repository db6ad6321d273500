//! Sweep artifact export — JSON and CSV.
//!
//! JSON carries the full records (round-trippable, schema-versioned);
//! CSV is a flat one-row-per-run summary for spreadsheets and ad-hoc
//! analysis. Persisted JSON includes a `schema_version` field and loads
//! reject versions newer than this build understands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::runner::{RunRecord, SCHEMA_VERSION};
use crate::sweep::SweepResults;

/// The persisted form of a sweep: versioned wrapper around the records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepArtifact {
    pub schema_version: u32,
    pub records: Vec<RunRecord>,
}

/// Serialize sweep results to pretty JSON.
pub fn export_json(results: &SweepResults) -> Result<String> {
    let artifact = SweepArtifact {
        schema_version: SCHEMA_VERSION,
        records: results.all().to_vec(),
    };
    serde_json::to_string_pretty(&artifact).context("failed to serialize sweep results to JSON")
}

/// Deserialize sweep results from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<SweepResults> {
    let artifact: SweepArtifact =
        serde_json::from_str(json).context("failed to deserialize sweep results from JSON")?;
    if artifact.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            artifact.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(SweepResults::new(artifact.records))
}

/// Export a flat summary as CSV, one row per run.
///
/// Columns: run_id, call_id, strategy_id, provider, status, exit_reason,
/// final_pnl_percent, total_fees_paid, events, candles_consumed, error
pub fn export_summary_csv(results: &SweepResults) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "run_id",
        "call_id",
        "strategy_id",
        "provider",
        "status",
        "exit_reason",
        "final_pnl_percent",
        "total_fees_paid",
        "events",
        "candles_consumed",
        "error",
    ])?;

    for record in results.all() {
        match record.result() {
            Some(result) => {
                let exit_reason = serde_json::to_value(result.exit_reason)
                    .context("exit reason must serialize")?;
                wtr.write_record([
                    &record.run_id,
                    &record.call_id,
                    &record.strategy_id,
                    &record.provider,
                    "ok",
                    exit_reason.as_str().unwrap_or("unknown"),
                    &format!("{:.6}", result.final_pnl_percent),
                    &format!("{:.6}", result.total_fees_paid),
                    &result.events.len().to_string(),
                    &result.candles_consumed.to_string(),
                    "",
                ])?;
            }
            None => {
                let (kind, message) = record.error().unwrap_or(("unknown", ""));
                wtr.write_record([
                    &record.run_id,
                    &record.call_id,
                    &record.strategy_id,
                    &record.provider,
                    "error",
                    "",
                    "",
                    "",
                    "",
                    "",
                    &format!("{kind}: {message}"),
                ])?;
            }
        }
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write the full artifact set for a sweep under `output_dir`:
/// `sweep.json` (full records) and `summary.csv` (flat rows).
/// Returns the paths written.
pub fn save_artifacts(results: &SweepResults, output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create '{}'", output_dir.display()))?;

    let json_path = output_dir.join("sweep.json");
    std::fs::write(&json_path, export_json(results)?)
        .with_context(|| format!("failed to write '{}'", json_path.display()))?;

    let csv_path = output_dir.join("summary.csv");
    std::fs::write(&csv_path, export_summary_csv(results)?)
        .with_context(|| format!("failed to write '{}'", csv_path.display()))?;

    Ok(vec![json_path, csv_path])
}
