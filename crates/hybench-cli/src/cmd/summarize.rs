use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context, Result};
use clap::Args;
use hybench_core::checkpoint::read_records;
use hybench_core::config::{RunConfig, parse_cutoffs, validate_cutoffs};
use hybench_core::model::EvaluationRecord;
use hybench_core::report;
use hybench_search::eval::AccuracySummary;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Arguments for `hybench summarize`.
#[derive(Args, Debug)]
pub struct SummarizeArgs {
    /// Checkpoint file written by `hybench eval`.
    pub checkpoint: PathBuf,

    /// Cutoffs to report. Defaults to the cutoffs stored in the checkpoint.
    #[arg(long)]
    pub cutoffs: Option<String>,

    /// Also write the per-query results CSV here.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Also write the one-row accuracy CSV here.
    #[arg(long)]
    pub accuracy: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SummarizeReport {
    checkpoint: PathBuf,
    records: usize,
    summary: AccuracySummary,
}

/// Recompute the accuracy summary from a checkpoint without calling any
/// service. Safe to run while an evaluation holds the checkpoint.
///
/// # Errors
///
/// Unreadable or corrupt checkpoint, invalid cutoffs, or a report write
/// failure.
pub fn run_summarize(
    args: &SummarizeArgs,
    config_path: Option<&Path>,
    output: OutputMode,
    cwd: &Path,
) -> Result<()> {
    let records = read_records(&args.checkpoint)?;
    let cutoffs = match args.cutoffs.as_deref() {
        Some(raw) => parse_cutoffs(raw).map_err(anyhow::Error::msg)?,
        None => stored_cutoffs(&records)
            .map_or_else(|| RunConfig::load(config_path, cwd).map(|c| c.eval.cutoffs), Ok)?,
    };
    validate_cutoffs(&cutoffs)?;

    // Skipped and failed queries are never persisted, so they are unknown here.
    let summary = AccuracySummary::from_records(&records, &cutoffs, 0, 0);

    if let Some(path) = &args.report {
        report::write_results(path, &records, &cutoffs).context("failed to write results table")?;
    }
    if let Some(path) = &args.accuracy {
        report::write_accuracy(path, &summary.to_row())
            .context("failed to write accuracy table")?;
    }

    let result = SummarizeReport {
        checkpoint: args.checkpoint.clone(),
        records: records.len(),
        summary,
    };
    render_mode(output, &result, render_text, render_pretty)
}

/// Union of the cutoffs present in the records, or `None` if there are none.
fn stored_cutoffs(records: &[EvaluationRecord]) -> Option<Vec<usize>> {
    let ks: BTreeSet<usize> = records.iter().flat_map(EvaluationRecord::ks).collect();
    if ks.is_empty() {
        None
    } else {
        Some(ks.into_iter().collect())
    }
}

fn render_text(report: &SummarizeReport, w: &mut dyn Write) -> io::Result<()> {
    for cutoff in &report.summary.cutoffs {
        writeln!(
            w,
            "accuracy@{}\t{:.4}\tndcg@{}\t{:.4}",
            cutoff.k, cutoff.accuracy, cutoff.k, cutoff.mean_ndcg
        )?;
    }
    writeln!(w, "evaluated\t{}", report.summary.evaluated)?;
    writeln!(w, "degraded\t{}", report.summary.degraded)
}

fn render_pretty(report: &SummarizeReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Summary: {}", report.checkpoint.display()))?;
    pretty_kv(w, "Records", report.records.to_string())?;
    pretty_kv(w, "Degraded", report.summary.degraded.to_string())?;
    writeln!(w)?;
    writeln!(w, "{:>6}  {:>9}  {:>9}  {:>7}", "k", "accuracy", "ndcg", "matches")?;
    for cutoff in &report.summary.cutoffs {
        writeln!(
            w,
            "{:>6}  {:>9.4}  {:>9.4}  {:>7}",
            cutoff.k, cutoff.accuracy, cutoff.mean_ndcg, cutoff.matches
        )?;
    }
    Ok(())
}
