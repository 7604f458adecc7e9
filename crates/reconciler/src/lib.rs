//! Reconciliation engine for remote fact sets.
//!
//! A caller declares the facts a remote service should hold for one scope
//! (say, the permissions of one group). The engine makes the remote side
//! match:
//!
//! - **Diffing**: read the store and compute additions, removals and
//!   in-place updates ([`diff`]).
//! - **Mutating**: apply every operation concurrently under one deadline
//!   ([`MutationDispatcher`]).
//! - **Verifying**: re-read with bounded backoff until the store reports
//!   exactly the desired set ([`ConsistencyVerifier`]).
//!
//! The remote service is eventually consistent, so a reconciliation only
//! succeeds once a read confirms the result. Every blocking step honours a
//! [`CancellationToken`] supplied by the caller.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use factsync_core::{FactScope, FactSet, Permission, Scope};
//! use factsync_reconciler::{CancellationToken, InMemoryFactStore, Reconciler};
//!
//! # async fn run() -> factsync_reconciler::Result<()> {
//! let devs = FactScope::group_permissions(Scope::Organization, "devs");
//! let store = Arc::new(InMemoryFactStore::new(devs.clone()).with_visibility_lag(2));
//! let desired: FactSet = vec![devs.fact(Permission::Admin)].into();
//!
//! let converged = Reconciler::default()
//!     .reconcile(&desired, store, &CancellationToken::new())
//!     .await?;
//! assert!(converged.facts.set_eq(&desired));
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod reconciler;
pub mod store;
pub mod types;
pub mod verify;

// Re-export main types
pub use config::{ReconcilerConfig, RetryPolicy};
pub use diff::{diff, order_facts_like, ordered_like};
pub use dispatch::MutationDispatcher;
pub use error::{Error, OperationFailure, RemoteError, RemoteResult, Result};
pub use reconciler::{Reconciler, ReconcilerBuilder};
pub use store::{InMemoryFactStore, RemoteFactStore};
pub use tokio_util::sync::CancellationToken;
pub use types::{
    Converged, DiffResult, DispatchReport, FactUpdate, Operation, Phase, ReconciliationOutcome,
};
pub use verify::{Backoff, ConsistencyVerifier};
