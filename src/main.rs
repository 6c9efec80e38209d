//! afinar CLI
//!
//! # Usage
//!
//! ```bash
//! # One training run (resumes from the latest checkpoint if present)
//! afinar train --config config.json --train train.json --valid valid.json
//!
//! # TPE sweep over learning rate and regularizer strength
//! afinar search --config config.json --train train.json --valid valid.json --trials 25
//!
//! # Evaluate the best checkpoint, optionally with MC-dropout uncertainty
//! afinar evaluate --config config.json --test test.json --mc-passes 20
//! ```

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use afinar::cli::{run_command, Cli};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
