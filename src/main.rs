//! `dmmt`: answers every line of input values on stdin with one line of
//! target values on stdout.
//!
//! ```bash
//! echo "3 4" | dmmt model.yml
//! dmmt --plan model.yml simulation.yml
//! ```

use anyhow::Context;
use clap::Parser;
use dmmt_core::{format_trace, Model, VarRef, DEFAULT_MAX_DEPTH};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Discrete-time dynamic model simulator
#[derive(Parser, Debug)]
#[command(name = "dmmt")]
#[command(about = "Simulate a discrete-time dynamic model described in YAML sources")]
struct Args {
    /// Model sources, merged in order
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Print the simulation plan as JSON and exit
    #[arg(long)]
    plan: bool,

    /// Print the audit trace of this reference to stderr after every line
    #[arg(long, value_name = "REF")]
    trace: Option<String>,

    /// Maximum evaluation depth before a line fails
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Skip writing the simulation logs
    #[arg(long)]
    no_log: bool,
}

fn main() -> anyhow::Result<()> {
    // stdout carries the line protocol only.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut model = Model::from_files(args.sources.as_slice())
        .context("failed to load model")?
        .with_max_depth(args.max_depth);

    if args.plan {
        println!("{}", serde_json::to_string_pretty(model.plan())?);
        return Ok(());
    }

    let trace_target = args
        .trace
        .as_deref()
        .map(VarRef::parse)
        .transpose()
        .context("invalid --trace reference")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        match model.process_input(&line) {
            Ok(result) => {
                writeln!(out, "{}", result)?;
                out.flush()?;
                if !args.no_log {
                    if let Err(e) = model.write_logs() {
                        warn!(error = %e, "Simulation log not written");
                    }
                }
            }
            Err(e) if e.is_input_exhausted() => {
                info!(error = %e, "Input exhausted, stopping");
                break;
            }
            Err(e) => {
                error!(error = %e, line = %line, "Evaluation failed");
                writeln!(out, "{}", model.placeholder_line())?;
                out.flush()?;
            }
        }
        if let Some(target) = &trace_target {
            eprint!("{}", format_trace(&model, target));
        }
    }

    Ok(())
}
