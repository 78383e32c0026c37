#![forbid(unsafe_code)]

mod client;
mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use hybench_core::cancel::CancelToken;
use hybench_core::timing;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "hybench: hybrid retrieval accuracy benchmark",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit an upstream latency report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Output format: pretty, text or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Config file layered over `./hybench.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Evaluate",
        about = "Evaluate a gold dataset",
        long_about = "Run every dataset question through retrieval, fusion and optional rerank, \
                      then score page-level accuracy@k and NDCG. Progress is checkpointed; \
                      rerunning the same command resumes where it stopped.",
        after_help = "EXAMPLES:\n    # Hybrid retrieval with default cutoffs\n    hybench eval -d gold.csv\n\n    # Lexical only, custom cutoffs\n    hybench eval -d gold.csv --mode lexical --cutoffs 1,5,10\n\n    # Rerank the fused candidates\n    hybench eval -d gold.csv --rerank\n\n    # Emit machine-readable output\n    hybench eval -d gold.csv --format json"
    )]
    Eval(cmd::eval::EvalArgs),

    #[command(
        next_help_heading = "Evaluate",
        about = "Run one query",
        long_about = "Run a single free-text query and print the ranked hits with their pages.",
        after_help = "EXAMPLES:\n    # Top 10 hybrid hits\n    hybench search \"what is the refund window\"\n\n    # Reranked, top 5\n    hybench search \"refund window\" --rerank -n 5"
    )]
    Search(cmd::search::SearchArgs),

    #[command(
        next_help_heading = "Evaluate",
        about = "Summarize a checkpoint",
        long_about = "Recompute accuracy@k and NDCG from an existing checkpoint without calling any service.",
        after_help = "EXAMPLES:\n    # Summarize with the cutoffs stored in the checkpoint\n    hybench summarize gold.checkpoint.jsonl\n\n    # Rewrite the accuracy table for fewer cutoffs\n    hybench summarize gold.checkpoint.jsonl --cutoffs 5,10 --accuracy acc.csv"
    )]
    Summarize(cmd::summarize::SummarizeArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Check configuration and credentials",
        long_about = "Validate configuration, list missing environment variables and send one probe query.",
        after_help = "EXAMPLES:\n    # Full check including a probe query\n    hybench check\n\n    # Validate without network access\n    hybench check --no-probe --rerank"
    )]
    Check(cmd::check::CheckArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    hybench completions bash\n\n    # Generate zsh completions\n    hybench completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("HYBENCH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "hybench=debug,info"
        } else {
            "hybench=info,warn"
        })
    });

    let format = env::var("HYBENCH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn install_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || token.cancel()) {
        warn!(error = %err, "could not install interrupt handler");
    }
}

fn run(cli: &Cli, output: OutputMode, cancel: &CancelToken) -> anyhow::Result<()> {
    let cwd = env::current_dir()?;
    let config = cli.config.as_deref();

    match &cli.command {
        Commands::Eval(args) => timing::timed("cmd.eval", || {
            cmd::eval::run_eval(args, config, output, &cwd, cancel)
        }),
        Commands::Search(args) => timing::timed("cmd.search", || {
            cmd::search::run_search(args, config, output, &cwd, cancel)
        }),
        Commands::Summarize(args) => timing::timed("cmd.summarize", || {
            cmd::summarize::run_summarize(args, config, output, &cwd)
        }),
        Commands::Check(args) => {
            timing::timed("cmd.check", || cmd::check::run_check(args, config, output, &cwd))
        }
        Commands::Completions(args) => timing::timed("cmd.completions", || {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command, &mut std::io::stdout())
        }),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let timing_enabled = cli.timing || timing::timing_enabled_from_env();
    timing::set_timing_enabled(timing_enabled);
    timing::clear();
    debug!(?cli, "parsed arguments");

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);

    let output = cli.output_mode();
    let command_result = run(&cli, output, &cancel);

    if timing_enabled {
        let report = timing::take_report();
        if report.is_empty() {
            eprintln!("timing report: no samples recorded");
        } else {
            eprintln!("timing report:");
            eprintln!("{}", report.render_table());
            eprintln!("timing report (json):");
            eprintln!("{}", serde_json::to_string_pretty(&report.to_json())?);
        }
    }

    if let Err(err) = command_result {
        render_error(output, &CliError::from(&err))?;
        std::process::exit(1);
    }
    Ok(())
}
