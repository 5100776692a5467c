//! CLI argument definitions

use clap::Parser;

#[derive(Parser)]
#[command(name = "nsleuth")]
#[command(about = "Finds every live network namespace and what keeps it alive", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
