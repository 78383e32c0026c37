pub mod check;
pub mod completions;
pub mod eval;
pub mod search;
pub mod summarize;

use anyhow::{Context, Result};
use clap::Args;
use hybench_core::cancel::CancelToken;
use hybench_core::config::{Overrides, RetrievalMode, RunConfig, parse_cutoffs};
use hybench_core::rate_limit::{Pacer, ThreadSleeper};
use std::path::Path;

/// Pipeline flags shared by `eval`, `search` and `check`.
#[derive(Args, Debug, Default)]
pub struct PipelineArgs {
    /// Retrieval mode: lexical, vector, hybrid or service-hybrid.
    #[arg(long)]
    pub mode: Option<RetrievalMode>,

    /// Rerank the fused candidates.
    #[arg(long, overrides_with = "no_rerank")]
    pub rerank: bool,

    /// Skip reranking even if the config enables it.
    #[arg(long, overrides_with = "rerank")]
    pub no_rerank: bool,

    /// Comma-separated cutoffs, e.g. `5,10,25`.
    #[arg(long)]
    pub cutoffs: Option<String>,

    /// Hits requested from each search call.
    #[arg(long)]
    pub top_k: Option<usize>,
}

impl PipelineArgs {
    /// # Errors
    ///
    /// A malformed `--cutoffs` value.
    pub fn overrides(&self) -> Result<Overrides> {
        let cutoffs = self
            .cutoffs
            .as_deref()
            .map(parse_cutoffs)
            .transpose()
            .map_err(anyhow::Error::msg)?;
        let rerank = match (self.rerank, self.no_rerank) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        };
        Ok(Overrides {
            mode: self.mode,
            rerank,
            cutoffs,
            top_k: self.top_k,
        })
    }
}

/// Load layered config, apply flag overrides and validate.
///
/// # Errors
///
/// Any read, parse, or validation failure.
pub fn load_config(explicit: Option<&Path>, cwd: &Path, pipeline: &PipelineArgs) -> Result<RunConfig> {
    let config = RunConfig::load(explicit, cwd)?.with_overrides(pipeline.overrides()?);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Real-time pacer for a run.
#[must_use]
pub fn pacer(config: &RunConfig, cancel: &CancelToken) -> Pacer {
    Pacer::new(
        config.rate_limit.clone(),
        Box::new(ThreadSleeper::new(cancel.clone())),
        cancel.clone(),
    )
}
