use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hubbench_core::SweepSpec;
use hubbench_runner::{ExecutorKind, SweepOptions, TrialOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hubbench",
    version,
    about = "Cold-start and API latency benchmarks for a session-orchestration hub"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the parameter sweep, one isolated trial per configuration,
    /// streaming CSV rows to stdout.
    Sweep {
        /// Comma-separated population sizes, e.g. 10,100,1000
        #[arg(long)]
        populations: Option<String>,
        /// Comma-separated active fractions in [0, 1], e.g. 0,0.25,1
        #[arg(long)]
        fractions: Option<String>,
        /// YAML sweep spec; flags override its values
        #[arg(long)]
        spec: Option<PathBuf>,
        /// Run trials in this process instead of one worker process each
        #[arg(long)]
        in_process: bool,
        /// Register restored sessions with a real configurable-http-proxy
        #[arg(long)]
        with_proxy: bool,
        /// Tenant-listing page size served by the hub
        #[arg(long)]
        page_limit: Option<u64>,
    },
    /// Internal worker: runs one trial read from an input file.
    #[command(hide = true)]
    Trial {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Commands::Sweep {
            populations,
            fractions,
            spec,
            in_process,
            with_proxy,
            page_limit,
        } => run_sweep_command(populations, fractions, spec, in_process, with_proxy, page_limit),
        Commands::Trial { input, output } => run_trial_worker(&input, &output),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,hubbench_runner=info,hubbench_hub=warn,hubbench_cli=info")
    });
    // logs go to stderr so stdout stays a clean CSV stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_sweep_command(
    populations: Option<String>,
    fractions: Option<String>,
    spec: Option<PathBuf>,
    in_process: bool,
    with_proxy: bool,
    page_limit: Option<u64>,
) -> Result<()> {
    let mut spec = match spec {
        Some(path) => SweepSpec::load(&path)?,
        None => SweepSpec::default(),
    };
    if let Some(raw) = populations {
        spec.populations = parse_usize_list(&raw)?;
    }
    if let Some(raw) = fractions {
        spec.fractions = parse_f64_list(&raw)?;
    }
    if with_proxy {
        spec.with_proxy = true;
    }
    if let Some(limit) = page_limit {
        spec.page_limit = limit;
    }

    let grid = spec.grid()?;
    let options = SweepOptions {
        executor: if in_process {
            ExecutorKind::InProcess
        } else {
            ExecutorKind::Subprocess
        },
        trial: TrialOptions {
            with_proxy: spec.with_proxy,
            page_limit: spec.page_limit,
        },
        worker: None,
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    hubbench_runner::run_sweep(&grid, &options, &mut out)?;
    Ok(())
}

fn run_trial_worker(input: &Path, output: &Path) -> Result<()> {
    let (config, options) = hubbench_runner::read_worker_input(input)?;
    let outcome = hubbench_runner::run_trial(&config, &options);
    hubbench_runner::write_worker_output(output, &outcome)?;
    // the envelope carries the failure detail; the exit status mirrors it
    outcome.map(|_| ()).map_err(Into::into)
}

fn parse_usize_list(raw: &str) -> Result<Vec<usize>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .with_context(|| format!("invalid population {part:?}"))
        })
        .collect()
}

fn parse_f64_list(raw: &str) -> Result<Vec<f64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>()
                .with_context(|| format!("invalid fraction {part:?}"))
        })
        .collect()
}
