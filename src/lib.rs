#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # factsync
//!
//! Command-line front end for the reconciliation engine: plan files, CLI
//! definitions and JSON output.

pub mod cli;
pub mod json;
pub mod plan;

pub use factsync_core;
pub use factsync_reconciler;
