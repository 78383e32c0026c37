use super::{PipelineArgs, load_config, pacer};
use crate::client::Clients;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context, Result};
use clap::Args;
use hybench_core::cancel::CancelToken;
use hybench_core::config::Credentials;
use hybench_core::page::PageScheme;
use hybench_search::pipeline::{Orchestrator, Ranking};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;

/// Arguments for `hybench search`.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Free-text query.
    pub query: String,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Number of hits to print.
    #[arg(long, short = 'n', default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    rank: usize,
    id: String,
    page: Option<String>,
    fused_score: f64,
    /// Per-list ranks in lexical, vector order for hybrid runs.
    list_ranks: Vec<Option<usize>>,
    relevance_score: Option<f64>,
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchResult {
    query: String,
    mode: String,
    reranked: bool,
    degraded: bool,
    hits: Vec<SearchHit>,
}

/// Run one query through retrieval, fusion and optional rerank.
///
/// # Errors
///
/// Configuration or credential failures, or a query that could not be
/// retrieved.
pub fn run_search(
    args: &SearchArgs,
    config_path: Option<&Path>,
    output: OutputMode,
    cwd: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    let config = load_config(config_path, cwd, &args.pipeline)?;
    let clients = Clients::from_config(&config, &Credentials::from_env())?;
    let mut orchestrator = Orchestrator::new(&config, clients.services(), pacer(&config, cancel))?;

    let ranking = orchestrator
        .search(&args.query)
        .with_context(|| format!("search failed for '{}'", args.query))?;

    let result = SearchResult {
        query: args.query.clone(),
        mode: config.retrieval.mode.to_string(),
        reranked: ranking.reranked.is_some(),
        degraded: ranking.degraded(),
        hits: hits(&ranking, config.eval.page, args.limit),
    };
    render_mode(output, &result, render_text, render_pretty)
}

fn hits(ranking: &Ranking, scheme: PageScheme, limit: usize) -> Vec<SearchHit> {
    let fused: HashMap<&str, (f64, &[Option<usize>])> = ranking
        .fused
        .iter()
        .map(|f| (f.document.id.as_str(), (f.score, f.ranks.as_slice())))
        .collect();
    let relevance: HashMap<&str, Option<f64>> = ranking
        .reranked
        .as_ref()
        .map(|r| {
            r.documents
                .iter()
                .map(|d| (d.document.id.as_str(), d.relevance_score))
                .collect()
        })
        .unwrap_or_default();

    ranking
        .documents()
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(idx, doc)| {
            let (fused_score, ranks) = fused
                .get(doc.id.as_str())
                .map_or((0.0, Vec::new()), |(score, ranks)| (*score, ranks.to_vec()));
            SearchHit {
                rank: idx + 1,
                page: scheme.page_of(&doc),
                fused_score,
                list_ranks: ranks,
                relevance_score: relevance.get(doc.id.as_str()).copied().flatten(),
                title: doc.title.clone(),
                id: doc.id,
            }
        })
        .collect()
}

fn render_text(result: &SearchResult, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "rank\tpage\tscore\tid")?;
    for hit in &result.hits {
        writeln!(
            w,
            "{}\t{}\t{:.5}\t{}",
            hit.rank,
            hit.page.as_deref().unwrap_or("-"),
            hit.relevance_score.unwrap_or(hit.fused_score),
            hit.id
        )?;
    }
    Ok(())
}

fn render_pretty(result: &SearchResult, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Search: {}", result.query))?;
    pretty_kv(w, "Mode", &result.mode)?;
    let rerank = match (result.reranked, result.degraded) {
        (false, _) => "off",
        (true, false) => "on",
        (true, true) => "unavailable, fused order shown",
    };
    pretty_kv(w, "Rerank", rerank)?;
    writeln!(w)?;
    if result.hits.is_empty() {
        return writeln!(w, "no hits");
    }
    writeln!(
        w,
        "{:>4}  {:>6}  {:>9}  {:>9}  {}",
        "#", "page", "rrf", "rerank", "id"
    )?;
    for hit in &result.hits {
        let rerank = hit
            .relevance_score
            .map_or_else(|| "-".to_string(), |s| format!("{s:.4}"));
        writeln!(
            w,
            "{:>4}  {:>6}  {:>9.5}  {:>9}  {}",
            hit.rank,
            hit.page.as_deref().unwrap_or("-"),
            hit.fused_score,
            rerank,
            hit.id
        )?;
        if let Some(title) = &hit.title {
            writeln!(w, "{:>4}  {title}", "")?;
        }
    }
    Ok(())
}
