//! CSV result tables.
//!
//! Two files per run: the per-query results table and a one-row accuracy
//! table. Both are rendered fully in memory, written to a sibling temp file
//! and renamed into place, so a reader never sees a half-written report.

use crate::model::EvaluationRecord;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Values for the one-row accuracy table.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyRow {
    /// `(k, accuracy@k)` in cutoff order.
    pub accuracy: Vec<(usize, f64)>,
    pub evaluated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Header row of the per-query table for `cutoffs`.
#[must_use]
pub fn results_header(cutoffs: &[usize]) -> Vec<String> {
    let mut header = vec!["Query".to_string(), "Expected Pages".to_string()];
    for k in cutoffs {
        header.push(format!("Retrieved Pages (Top {k})"));
        header.push(format!("Match Found (Top {k})"));
    }
    header
}

/// Render the per-query table.
///
/// A record that lacks one of `cutoffs` gets empty cells for it.
///
/// # Errors
///
/// CSV encoding failure.
pub fn render_results(records: &[EvaluationRecord], cutoffs: &[usize]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(results_header(cutoffs))?;
    for record in records {
        let mut row = vec![record.query.clone(), record.expected.to_string()];
        for &k in cutoffs {
            match record.cutoff(k) {
                Some(result) => {
                    row.push(result.pages.join(", "));
                    row.push(py_bool(result.matched).to_string());
                }
                None => {
                    row.push(String::new());
                    row.push(String::new());
                }
            }
        }
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(csv::IntoInnerError::into_error)
        .context("failed to flush results table")
}

/// Render the accuracy table.
///
/// # Errors
///
/// CSV encoding failure.
pub fn render_accuracy(row: &AccuracyRow) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header: Vec<String> = row
        .accuracy
        .iter()
        .map(|(k, _)| format!("Accuracy (Top {k})"))
        .collect();
    header.extend(["Evaluated", "Skipped", "Failed"].map(String::from));
    writer.write_record(&header)?;

    let mut values: Vec<String> = row.accuracy.iter().map(|(_, a)| format!("{a:.4}")).collect();
    values.push(row.evaluated.to_string());
    values.push(row.skipped.to_string());
    values.push(row.failed.to_string());
    writer.write_record(&values)?;
    writer
        .into_inner()
        .map_err(csv::IntoInnerError::into_error)
        .context("failed to flush accuracy table")
}

/// Write `records` as the per-query results CSV at `path`.
///
/// # Errors
///
/// Rendering or file I/O failure.
pub fn write_results(path: &Path, records: &[EvaluationRecord], cutoffs: &[usize]) -> Result<()> {
    let body = render_results(records, cutoffs)?;
    write_atomic(path, &body)
}

/// Write the accuracy CSV at `path`.
///
/// # Errors
///
/// Rendering or file I/O failure.
pub fn write_accuracy(path: &Path, row: &AccuracyRow) -> Result<()> {
    let body = render_accuracy(row)?;
    write_atomic(path, &body)
}

/// Write to `<path>.tmp`, then rename over `path`.
///
/// # Errors
///
/// Directory creation, write, or rename failure.
pub fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp_name);

    fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to atomically move {} to {}",
            tmp.display(),
            path.display()
        )
    })?;
    tracing::info!(path = %path.display(), bytes = body.len(), "report written");
    Ok(())
}

const fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}
