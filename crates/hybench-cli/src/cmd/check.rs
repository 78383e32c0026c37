use super::{PipelineArgs, load_config};
use crate::client::Clients;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::Result;
use clap::Args;
use hybench_core::config::{ConfigError, Credentials, RunConfig};
use hybench_core::timing;
use hybench_search::pipeline::Retriever;
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

/// Arguments for `hybench check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Query sent to the index to confirm it answers.
    #[arg(long, default_value = "test")]
    pub probe_query: String,

    /// Only validate configuration and environment; make no network call.
    #[arg(long)]
    pub no_probe: bool,
}

#[derive(Debug, Serialize)]
struct Probe {
    ok: bool,
    hits: usize,
    elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    mode: String,
    rerank: bool,
    cutoffs: Vec<usize>,
    top_k: usize,
    rerank_top_n: Option<usize>,
    missing: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    probe: Option<Probe>,
}

/// Validate configuration and credentials, then optionally send one
/// lexical probe query.
///
/// # Errors
///
/// Invalid configuration, missing credentials, or a failed probe.
pub fn run_check(
    args: &CheckArgs,
    config_path: Option<&Path>,
    output: OutputMode,
    cwd: &Path,
) -> Result<()> {
    let config = load_config(config_path, cwd, &args.pipeline)?;
    let creds = Credentials::from_env();
    let missing = creds.missing_for(&config);

    let probe = if args.no_probe || !missing.is_empty() {
        None
    } else {
        Some(probe(&config, &creds, &args.probe_query)?)
    };

    let report = CheckReport {
        mode: config.retrieval.mode.to_string(),
        rerank: config.rerank.enabled,
        cutoffs: config.eval.cutoffs.clone(),
        top_k: config.retrieval.top_k,
        rerank_top_n: config.rerank.enabled.then(|| config.rerank_top_n()),
        missing,
        probe,
    };
    render_mode(output, &report, render_text, render_pretty)?;

    if !report.missing.is_empty() {
        return Err(ConfigError::MissingCredential {
            vars: report.missing,
        }
        .into());
    }
    if let Some(Probe {
        error: Some(error), ..
    }) = report.probe
    {
        anyhow::bail!("probe query failed: {error}");
    }
    Ok(())
}

fn probe(config: &RunConfig, creds: &Credentials, query: &str) -> Result<Probe> {
    let clients = Clients::from_config(config, creds)?;
    let started = Instant::now();
    let result = timing::timed("search.probe", || {
        clients
            .search
            .search_lexical(query, &config.retrieval.lexical_fields, 1)
    });
    let elapsed_ms = started.elapsed().as_millis();
    Ok(match result {
        Ok(list) => Probe {
            ok: true,
            hits: list.len(),
            elapsed_ms,
            error: None,
        },
        Err(err) => Probe {
            ok: false,
            hits: 0,
            elapsed_ms,
            error: Some(err.to_string()),
        },
    })
}

fn render_text(report: &CheckReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "mode\t{}", report.mode)?;
    writeln!(w, "rerank\t{}", report.rerank)?;
    for var in &report.missing {
        writeln!(w, "missing\t{var}")?;
    }
    if let Some(probe) = &report.probe {
        writeln!(
            w,
            "probe\t{}\t{}ms",
            if probe.ok { "ok" } else { "failed" },
            probe.elapsed_ms
        )?;
    }
    Ok(())
}

fn render_pretty(report: &CheckReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Configuration")?;
    pretty_kv(w, "Mode", &report.mode)?;
    let rerank = report
        .rerank_top_n
        .map_or_else(|| "off".to_string(), |n| format!("on (top {n})"));
    pretty_kv(w, "Rerank", rerank)?;
    let cutoffs: Vec<String> = report.cutoffs.iter().map(ToString::to_string).collect();
    pretty_kv(w, "Cutoffs", cutoffs.join(", "))?;
    pretty_kv(w, "Top k", report.top_k.to_string())?;
    writeln!(w)?;

    pretty_section(w, "Environment")?;
    if report.missing.is_empty() {
        writeln!(w, "all required variables set")?;
    } else {
        for var in &report.missing {
            writeln!(w, "missing  {var}")?;
        }
    }

    if let Some(probe) = &report.probe {
        writeln!(w)?;
        pretty_section(w, "Probe")?;
        match &probe.error {
            None => pretty_kv(
                w,
                "Search",
                format!("ok, {} hit(s) in {}ms", probe.hits, probe.elapsed_ms),
            )?,
            Some(error) => pretty_kv(w, "Search", format!("failed: {error}"))?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_lists_missing_variables() {
        let report = CheckReport {
            mode: "hybrid".into(),
            rerank: true,
            cutoffs: vec![5, 10],
            top_k: 50,
            rerank_top_n: Some(10),
            missing: vec!["COHERE_API_KEY"],
            probe: None,
        };
        let mut out = Vec::new();
        render_pretty(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("on (top 10)"));
        assert!(text.contains("missing  COHERE_API_KEY"));
        assert!(!text.contains("Probe"));
    }

    #[test]
    fn text_reports_probe_status() {
        let report = CheckReport {
            mode: "lexical".into(),
            rerank: false,
            cutoffs: vec![5],
            top_k: 50,
            rerank_top_n: None,
            missing: Vec::new(),
            probe: Some(Probe {
                ok: false,
                hits: 0,
                elapsed_ms: 12,
                error: Some("boom".into()),
            }),
        };
        let mut out = Vec::new();
        render_text(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("probe\tfailed\t12ms"));
    }
}
