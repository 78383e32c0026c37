use super::{PipelineArgs, load_config, pacer};
use crate::client::Clients;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context, Result};
use clap::Args;
use hybench_core::cancel::CancelToken;
use hybench_core::checkpoint::CheckpointStore;
use hybench_core::config::Credentials;
use hybench_core::dataset::Dataset;
use hybench_core::model::{EvaluationRecord, QueryKey};
use hybench_core::report;
use hybench_search::eval::AccuracySummary;
use hybench_search::pipeline::{BatchOutcome, Orchestrator, QueryItem};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Arguments for `hybench eval`.
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Gold dataset CSV with question and pages columns.
    #[arg(long, short)]
    pub dataset: PathBuf,

    /// Checkpoint file (JSON Lines). Defaults to `<dataset>.checkpoint.jsonl`.
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Per-query results CSV. Defaults to `<dataset>.results.csv`.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// One-row accuracy CSV. Defaults to `<dataset>.accuracy.csv`.
    #[arg(long)]
    pub accuracy: Option<PathBuf>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Evaluate only the first N dataset rows.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Discard an existing checkpoint and start over.
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Debug, Serialize)]
struct EvalReport {
    dataset: String,
    mode: String,
    rerank: bool,
    checkpoint: PathBuf,
    report: PathBuf,
    accuracy_table: PathBuf,
    batch: BatchOutcome,
    summary: AccuracySummary,
}

/// Run the batch evaluation.
///
/// # Errors
///
/// Configuration, credential, dataset or checkpoint failures, and report
/// write failures. Per-query failures are reported, not raised.
pub fn run_eval(
    args: &EvalArgs,
    config_path: Option<&Path>,
    output: OutputMode,
    cwd: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    let config = load_config(config_path, cwd, &args.pipeline)?;
    let clients = Clients::from_config(&config, &Credentials::from_env())?;

    let mut dataset = Dataset::load(
        &args.dataset,
        &config.eval.question_column,
        &config.eval.pages_column,
    )?;
    if let Some(limit) = args.limit {
        dataset.truncate(limit);
    }
    let items = QueryItem::from_dataset(&dataset, config.checkpoint.key);

    let checkpoint = args
        .checkpoint
        .clone()
        .unwrap_or_else(|| args.dataset.with_extension("checkpoint.jsonl"));
    let mut store = if args.fresh {
        CheckpointStore::open_fresh(&checkpoint)?
    } else {
        CheckpointStore::open(&checkpoint)?
    };
    info!(
        dataset = %dataset.name,
        queries = items.len(),
        already_done = store.len(),
        mode = %config.retrieval.mode,
        rerank = config.rerank.enabled,
        "starting batch"
    );

    let mut orchestrator = Orchestrator::new(&config, clients.services(), pacer(&config, cancel))?;
    let batch = orchestrator.run_batch(&items, &mut store)?;

    let records = records_for(store.records(), &items);
    let summary = AccuracySummary::from_records(
        &records,
        &config.eval.cutoffs,
        batch.skipped,
        batch.failed,
    );

    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| args.dataset.with_extension("results.csv"));
    let accuracy_path = args
        .accuracy
        .clone()
        .unwrap_or_else(|| args.dataset.with_extension("accuracy.csv"));
    report::write_results(&report_path, &records, &config.eval.cutoffs)
        .context("failed to write results table")?;
    report::write_accuracy(&accuracy_path, &summary.to_row())
        .context("failed to write accuracy table")?;

    let result = EvalReport {
        dataset: dataset.name.clone(),
        mode: config.retrieval.mode.to_string(),
        rerank: config.rerank.enabled,
        checkpoint,
        report: report_path,
        accuracy_table: accuracy_path,
        batch,
        summary,
    };
    render_mode(output, &result, render_text, render_pretty)
}

/// Persisted records for this dataset's items, in dataset order.
/// Records that answer one of `items`. A record stored for the same key but a
/// different question is stale and left out.
fn records_for(records: &[EvaluationRecord], items: &[QueryItem]) -> Vec<EvaluationRecord> {
    let current: HashSet<(&QueryKey, &str)> =
        items.iter().map(|i| (&i.key, i.query.as_str())).collect();
    let mut out: Vec<EvaluationRecord> = records
        .iter()
        .filter(|r| current.contains(&(&r.key, r.query.as_str())))
        .cloned()
        .collect();
    out.sort_by(|a, b| a.row.cmp(&b.row).then_with(|| a.key.cmp(&b.key)));
    out
}

fn render_text(report: &EvalReport, w: &mut dyn Write) -> io::Result<()> {
    for cutoff in &report.summary.cutoffs {
        writeln!(w, "accuracy@{}\t{:.4}", cutoff.k, cutoff.accuracy)?;
    }
    writeln!(w, "evaluated\t{}", report.summary.evaluated)?;
    writeln!(w, "skipped\t{}", report.summary.skipped)?;
    writeln!(w, "failed\t{}", report.summary.failed)?;
    writeln!(w, "degraded\t{}", report.summary.degraded)?;
    writeln!(w, "resumed\t{}", report.batch.resumed)?;
    writeln!(w, "interrupted\t{}", report.batch.interrupted)
}

fn render_pretty(report: &EvalReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Evaluation: {}", report.dataset))?;
    pretty_kv(w, "Mode", &report.mode)?;
    pretty_kv(w, "Rerank", if report.rerank { "on" } else { "off" })?;
    pretty_kv(
        w,
        "Queries",
        format!(
            "{} evaluated this run, {} resumed, {} skipped, {} failed",
            report.batch.evaluated, report.batch.resumed, report.batch.skipped, report.batch.failed
        ),
    )?;
    if report.summary.degraded > 0 {
        pretty_kv(w, "Degraded", format!("{} (rerank fell back)", report.summary.degraded))?;
    }
    writeln!(w)?;

    writeln!(w, "{:>6}  {:>9}  {:>9}  {:>7}", "k", "accuracy", "ndcg", "matches")?;
    for cutoff in &report.summary.cutoffs {
        writeln!(
            w,
            "{:>6}  {:>9.4}  {:>9.4}  {:>7}",
            cutoff.k, cutoff.accuracy, cutoff.mean_ndcg, cutoff.matches
        )?;
    }
    writeln!(w)?;

    if !report.batch.issues.is_empty() {
        pretty_section(w, "Issues")?;
        for issue in &report.batch.issues {
            let row = issue.row.map_or_else(|| "-".to_string(), |r| r.to_string());
            writeln!(w, "row {row:>5}  {:<8} {}", issue.state.as_str(), issue.reason)?;
        }
        writeln!(w)?;
    }

    pretty_kv(w, "Checkpoint", report.checkpoint.display().to_string())?;
    pretty_kv(w, "Results", report.report.display().to_string())?;
    pretty_kv(w, "Accuracy", report.accuracy_table.display().to_string())?;
    if report.batch.interrupted {
        writeln!(
            w,
            "\ninterrupted: {} queries not attempted; rerun the same command to resume",
            report.batch.remaining
        )?;
    }
    Ok(())
}
