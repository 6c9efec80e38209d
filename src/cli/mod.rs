//! CLI command surface

mod commands;
mod data;

pub use commands::run_command;
pub use data::JsonDataset;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sparsity-regularized fine-tuning experiments
#[derive(Debug, Parser)]
#[command(name = "afinar", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Train one model, resuming from the latest checkpoint if present
    Train {
        /// Experiment configuration (JSON)
        #[arg(long)]
        config: PathBuf,
        /// Training split (JSON dataset)
        #[arg(long)]
        train: PathBuf,
        /// Validation split (JSON dataset)
        #[arg(long)]
        valid: PathBuf,
    },
    /// Sweep learning rate and regularizer strength with TPE search
    Search {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        train: PathBuf,
        #[arg(long)]
        valid: PathBuf,
        /// Total trial budget, including trials restored from the log
        #[arg(long, default_value_t = 20)]
        trials: usize,
    },
    /// Evaluate the best checkpoint on a held-out split
    Evaluate {
        #[arg(long)]
        config: PathBuf,
        /// Test split (JSON dataset)
        #[arg(long)]
        test: PathBuf,
        /// Enable uncertainty estimation with this many stochastic passes
        #[arg(long)]
        mc_passes: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_train() {
        let cli = Cli::try_parse_from([
            "afinar", "train", "--config", "c.json", "--train", "tr.json", "--valid", "va.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Train { .. }));
    }

    #[test]
    fn test_cli_parses_search_with_budget() {
        let cli = Cli::try_parse_from([
            "afinar", "search", "--config", "c.json", "--train", "tr.json", "--valid", "va.json",
            "--trials", "7",
        ])
        .unwrap();
        match cli.command {
            Command::Search { trials, .. } => assert_eq!(trials, 7),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_missing_args() {
        assert!(Cli::try_parse_from(["afinar", "train", "--config", "c.json"]).is_err());
    }
}
