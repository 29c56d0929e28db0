pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the per-user config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every due query once
    Run {
        /// Crawl the given queries against an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,

        /// Query to crawl in a dry run (repeatable)
        #[arg(short, long = "query", requires = "dry_run")]
        queries: Vec<String>,
    },

    /// Show the effective configuration
    Config,
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { dry_run, queries } => {
            if dry_run {
                info!("Starting dry run over {} queries", queries.len());
            }
            commands::run(cli.config, dry_run, queries).await
        }
        Commands::Config => commands::show_config(cli.config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn test_parse_dry_run_queries() {
        let cli = Cli::try_parse_from([
            "wiki-scraper",
            "run",
            "--dry-run",
            "--query",
            "rust",
            "-q",
            "how to implement quicksort",
            "--verbose",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Run { dry_run, queries } => {
                assert!(dry_run);
                assert_eq!(queries, vec!["rust", "how to implement quicksort"]);
            }
            Commands::Config => panic!("expected run"),
        }
    }

    #[test]
    fn test_queries_require_dry_run() {
        assert!(Cli::try_parse_from(["wiki-scraper", "run", "--query", "rust"]).is_err());
    }

    #[test]
    fn test_global_config_path() {
        let cli = Cli::try_parse_from(["wiki-scraper", "config", "--config", "/etc/scraper.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/scraper.yaml")));
    }
}
