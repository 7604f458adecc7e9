//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// factsync - reconcile remote fact sets
#[derive(Parser, Debug)]
#[command(name = "factsync")]
#[command(version)]
#[command(about = "Diff, apply and verify declared facts against an eventually consistent store")]
#[command(
    long_about = "factsync loads a plan of observed and desired facts for one store, computes the minimal add/remove/update operations, applies them concurrently and re-reads the store until it reports exactly the desired facts."
)]
pub struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the operations needed to reach the desired facts
    Diff {
        /// Plan file (TOML, or JSON with a .json extension)
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Reconcile a simulated store seeded with the plan's observed facts
    Reconcile {
        /// Plan file (TOML, or JSON with a .json extension)
        #[arg(short, long)]
        plan: PathBuf,

        /// Reads that return stale state after each mutation
        #[arg(long, default_value_t = 0)]
        lag: usize,

        /// Reconciler config file; FACTSYNC_* variables override it
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reconcile() {
        let cli = Cli::try_parse_from(["factsync", "reconcile", "--plan", "plan.toml", "--lag", "2"]);

        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Reconcile { lag: 2, config: None, .. })
        ));
    }
}
