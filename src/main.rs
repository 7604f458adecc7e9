//! # factsync
//!
//! Loads a plan, then either prints the diff or runs a full reconciliation
//! against an in-memory store that simulates eventual consistency.
//!
//! Logs go to stderr through `tracing`; the result is printed to stdout as
//! JSON. Ctrl+C cancels a running reconciliation.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use factsync::cli::{Cli, Commands};
use factsync::json::{DiffOutput, JsonError, JsonSuccess, ReconcileOutput};
use factsync::plan::Plan;
use factsync_reconciler::{InMemoryFactStore, Reconciler, ReconcilerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Diff { plan } => run_diff(&plan).await,
        Commands::Reconcile { plan, lag, config } => {
            run_reconcile(&plan, lag, config.as_deref()).await
        }
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_diff(plan_path: &Path) -> Result<()> {
    let plan = Plan::load(plan_path)?;
    let store = InMemoryFactStore::new(plan.store.clone()).with_facts(plan.observed);

    let outcome = Reconciler::default()
        .plan(&plan.desired, &store, &CancellationToken::new())
        .await;

    match outcome {
        Ok(diff) => {
            info!(store = %plan.store, operations = diff.len(), "Diff computed");
            print_json(&JsonSuccess::new(DiffOutput::new(plan.store.to_string(), diff)))
        }
        Err(e) => fail(&e),
    }
}

async fn run_reconcile(plan_path: &Path, lag: usize, config_path: Option<&Path>) -> Result<()> {
    let plan = Plan::load(plan_path)?;
    let config = load_config(config_path)?;
    let reconciler = Reconciler::builder()
        .with_config(config)
        .build()
        .context("Invalid reconciler configuration")?;

    let store = Arc::new(
        InMemoryFactStore::new(plan.store.clone())
            .with_facts(plan.observed)
            .with_visibility_lag(lag),
    );

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let outcome = reconciler.reconcile(&plan.desired, store, &cancel).await;
    watcher.abort();

    match outcome {
        Ok(converged) => print_json(&JsonSuccess::new(ReconcileOutput::new(
            plan.store.to_string(),
            converged,
        ))),
        Err(e) => fail(&e),
    }
}

fn load_config(path: Option<&Path>) -> Result<ReconcilerConfig> {
    let config = match path {
        Some(path) => ReconcilerConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ReconcilerConfig::default(),
    };
    Ok(config.with_env_overrides())
}

/// Cancel `token` on Ctrl+C.
async fn cancel_on_ctrl_c(token: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received Ctrl+C, cancelling reconciliation");
            token.cancel();
        }
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

fn fail(error: &factsync_reconciler::Error) -> Result<()> {
    error!(error = %error, "Reconciliation failed");
    let json = JsonError::from(error);
    print_json(&json)?;
    std::process::exit(json.exit_code());
}
