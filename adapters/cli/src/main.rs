#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a scripted Bastion stage and prints the result.

mod runner;
mod stage;

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use crate::{
    runner::StageRunner,
    stage::{StageFile, DEMO_STAGE},
};

/// Runs a scripted placement stage headlessly.
#[derive(Debug, Parser)]
#[command(name = "bastion", about = "Runs a scripted grid placement stage")]
struct Cli {
    /// Stage script (TOML). The bundled demo runs when omitted.
    #[arg(long)]
    stage: Option<PathBuf>,
    /// Number of ticks to simulate, overriding the script.
    #[arg(long)]
    ticks: Option<u32>,
    /// Simulated frame length in milliseconds, overriding the script.
    #[arg(long = "frame-ms")]
    frame_ms: Option<u64>,
    /// Raises log verbosity; repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Entry point for the Bastion command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(log_level(cli.verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (source, origin) = match &cli.stage {
        Some(path) => (
            fs::read_to_string(path)
                .with_context(|| format!("failed to read stage script at {}", path.display()))?,
            path.display().to_string(),
        ),
        None => (DEMO_STAGE.to_owned(), "bundled demo".to_owned()),
    };
    let stage = StageFile::parse(&source)
        .with_context(|| format!("failed to load stage from {origin}"))?;
    let ticks = cli.ticks.unwrap_or(stage.ticks);

    let mut runner = StageRunner::new(stage).context("failed to build stage")?;
    if let Some(frame_ms) = cli.frame_ms.filter(|frame_ms| *frame_ms > 0) {
        runner.set_frame(Duration::from_millis(frame_ms));
    }

    tracing::info!(stage = %origin, ticks, "running stage");
    let report = runner.run(ticks);
    println!("{report}");
    Ok(())
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}
