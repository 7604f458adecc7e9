//! Core types for the reconciler.

use std::fmt;

use factsync_core::{Fact, FactSet};
use serde::{Deserialize, Serialize};

/// Phases of one reconciliation.
///
/// `Diffing -> Mutating -> Verifying -> {Converged | Failed}`. An empty
/// diff skips straight to converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Diffing,
    Mutating,
    Verifying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Diffing => write!(f, "diffing"),
            Self::Mutating => write!(f, "mutating"),
            Self::Verifying => write!(f, "verifying"),
        }
    }
}

/// An in-place change of a fact that keeps its identity.
///
/// Only conditions have one: same metric, different operator or threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactUpdate {
    /// The fact as observed, carrying the remote id.
    pub current: Fact,
    /// The desired content, with the remote id carried over.
    pub desired: Fact,
}

/// A single mutation against a remote fact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create a fact that is desired but not observed.
    Add(Fact),
    /// Delete a fact that is observed but not desired.
    Remove(Fact),
    /// Change a fact in place.
    Update(FactUpdate),
}

impl Operation {
    /// The fact this operation leaves behind (or deletes, for removals).
    pub fn target(&self) -> &Fact {
        match self {
            Self::Add(fact) | Self::Remove(fact) => fact,
            Self::Update(update) => &update.desired,
        }
    }

    /// Get a description of the operation.
    pub fn description(&self) -> String {
        match self {
            Self::Add(fact) => format!("add {fact}"),
            Self::Remove(fact) => format!("remove {fact}"),
            Self::Update(update) => {
                format!("update {} to {}", update.current, update.desired.attribute)
            }
        }
    }
}

/// Additions, removals and in-place updates turning observed into desired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub additions: Vec<Fact>,
    pub removals: Vec<Fact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<FactUpdate>,
}

impl DiffResult {
    /// Whether no operation is needed.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty() && self.updates.is_empty()
    }

    /// Total number of operations.
    pub fn len(&self) -> usize {
        self.additions
            .len()
            .saturating_add(self.removals.len())
            .saturating_add(self.updates.len())
    }

    /// Flatten into operations: removals, then updates, then additions.
    ///
    /// The order is cosmetic; the dispatcher runs them concurrently.
    pub fn into_operations(self) -> Vec<Operation> {
        self.removals
            .into_iter()
            .map(Operation::Remove)
            .chain(self.updates.into_iter().map(Operation::Update))
            .chain(self.additions.into_iter().map(Operation::Add))
            .collect()
    }

    /// The fact set `observed` would become if every operation succeeded.
    pub fn apply_to(&self, observed: &FactSet) -> FactSet {
        let removed: Vec<_> = self
            .removals
            .iter()
            .chain(self.updates.iter().map(|u| &u.current))
            .map(Fact::identity)
            .collect();

        observed
            .iter()
            .filter(|f| !removed.contains(&f.identity()))
            .cloned()
            .chain(self.updates.iter().map(|u| u.desired.clone()))
            .chain(self.additions.iter().cloned())
            .collect()
    }
}

/// Outcome of the mutation phase, with partial success support.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Operations the remote service accepted.
    pub succeeded: Vec<Operation>,
    /// Operations that failed with errors.
    pub failed: Vec<crate::error::OperationFailure>,
}

impl DispatchReport {
    /// Check if all operations succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Get the total number of completed operations.
    pub fn total(&self) -> usize {
        self.succeeded.len().saturating_add(self.failed.len())
    }
}

/// A fact set confirmed by reading it back from the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Converged {
    /// The observed facts, ordered like the desired declaration.
    pub facts: FactSet,
    /// Operations applied to get here; empty on the fast path.
    pub applied: Vec<Operation>,
    /// Number of reads the verifier needed; zero on the fast path.
    pub verify_attempts: u32,
}

impl Converged {
    /// Whether the store was already converged before any mutation.
    pub fn was_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Result of one reconciliation: a confirmed fact set or the reason it
/// could not be confirmed.
pub type ReconciliationOutcome = crate::error::Result<Converged>;
