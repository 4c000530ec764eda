#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use firstlight_core::config::{ConfigError, resolve_config, resolve_output};
use firstlight_core::error::ErrorCode;
use firstlight_core::event::LoadError;
use firstlight_core::pipeline::PipelineError;
use firstlight_core::sink::SinkError;
use firstlight_core::timing::{self, StageTimer};
use firstlight_core::verify::VerifyError;
use firstlight_core::verify::artifacts::ArtifactError;
use output::{CliError, OutputMode, render_error};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "firstlight: launch-cohort curation for review datasets",
    long_about = None
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit per-stage timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Emit JSON output (alias for `--format json`).
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Project config file [default: ./firstlight.toml].
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Output mode from flags and environment only, for errors raised
    /// before the config files are read.
    fn fallback_output_mode(&self) -> OutputMode {
        OutputMode::from_resolved(&resolve_output(
            self.json,
            self.format.map(OutputMode::as_str),
            None,
            env::var("FORMAT").ok(),
        ))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Curation",
        about = "Label a launch cohort and write filtered datasets",
        long_about = "Anchor every product at its first review, count the signal and outcome \
                      windows, keep products that are eligible and fully observable, and write \
                      reviews_filtered, product_index, meta_clean_filtered and manifest.json.",
        after_help = "EXAMPLES:\n    # Curate into a fresh directory\n    fl curate --reviews reviews.jsonl --meta meta.jsonl --out cohort\n\n    # Replace a previous run\n    fl curate --out cohort --force\n\n    # Emit machine-readable output\n    fl curate --json"
    )]
    Curate(cmd::curate::CurateArgs),

    #[command(
        next_help_heading = "Curation",
        about = "Re-check an output directory",
        long_about = "Re-hash every artifact against manifest.json and re-run the product key and \
                      keep-set consistency checks.",
        after_help = "EXAMPLES:\n    # Verify a curated directory\n    fl verify cohort\n\n    # Emit machine-readable output\n    fl verify cohort --json"
    )]
    Verify(cmd::verify::VerifyArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    fl completions bash\n\n    # Generate zsh completions\n    fl completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("FIRSTLIGHT_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "firstlight_core=debug,fl=debug,info"
        } else {
            "firstlight_core=info,fl=info,warn"
        })
    });

    let format = env::var("FIRSTLIGHT_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

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

/// Stable error code for the first recognised error in the chain.
fn error_code(err: &anyhow::Error) -> ErrorCode {
    err.chain()
        .find_map(|cause| {
            cause
                .downcast_ref::<PipelineError>()
                .map(PipelineError::code)
                .or_else(|| cause.downcast_ref::<ArtifactError>().map(ArtifactError::code))
                .or_else(|| cause.downcast_ref::<VerifyError>().map(VerifyError::code))
                .or_else(|| cause.downcast_ref::<SinkError>().map(SinkError::code))
                .or_else(|| cause.downcast_ref::<LoadError>().map(LoadError::code))
                .or_else(|| cause.downcast_ref::<ConfigError>().map(ConfigError::code))
        })
        .unwrap_or(ErrorCode::InternalUnexpected)
}

fn execute(cli: Cli, output: &mut OutputMode, timer: &mut StageTimer) -> anyhow::Result<()> {
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args.shell, &mut command);
    }

    let cwd = env::current_dir().context("cannot determine the working directory")?;
    let effective = resolve_config(
        &cwd,
        cli.config.as_deref(),
        cli.json,
        cli.format.map(OutputMode::as_str),
    )?;
    *output = OutputMode::from_resolved(&effective.resolved_output);
    debug!(output = output.as_str(), "output mode resolved");

    match cli.command {
        Commands::Curate(args) => {
            cmd::curate::run_curate(args, &effective.project, *output, timer)
        }
        Commands::Verify(args) => cmd::verify::run_verify(&args, *output, timer),
        Commands::Completions(_) => Ok(()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let timing_enabled = cli.timing || timing::timing_enabled_from_env();
    let mut timer = StageTimer::new();
    let mut output = cli.fallback_output_mode();

    let result = execute(cli, &mut output, &mut timer);

    if timing_enabled {
        let report = timer.report();
        if report.is_empty() {
            eprintln!("timing report: no samples recorded");
        } else {
            eprintln!("timing report:");
            eprintln!("{}", report.display_table());
            eprintln!("timing report (json):");
            match serde_json::to_string_pretty(&report.to_json()) {
                Ok(json) => eprintln!("{json}"),
                Err(e) => eprintln!("timing report unavailable: {e}"),
            }
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let cli_error = CliError::coded(error_code(&err), err.to_string());
            if render_error(output, &cli_error).is_err() {
                eprintln!("error: {err}");
            }
            ExitCode::FAILURE
        }
    }
}
