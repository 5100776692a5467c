//! nsleuth - find every live network namespace and what holds it open
//!
//! Walks the process table and the mount table, then re-runs the mount
//! walk from inside every other mount namespace it can reach, and prints
//! one line per distinct network namespace found.

use anyhow::Context;
use clap::Parser;
use std::process;
use tracing::Level;

mod cli;
mod report;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity. Diagnostics go to stderr: stdout
    // belongs to the report lines alone.
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("❌ Error: {e:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let host = nsleuth_discover::LinuxHost::new().context("Failed to prepare host access")?;

    let table = nsleuth_discover::run(&host).context("Discovery failed")?;

    report::print(&table, std::io::stdout().lock()).context("Failed to write report")?;

    Ok(())
}
