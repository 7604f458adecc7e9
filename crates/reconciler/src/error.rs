//! Error types for the reconciler crate.

use std::fmt;
use std::time::Duration;

use factsync_core::{Fact, FactSet};
use thiserror::Error;

use crate::types::{Operation, Phase};

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for calls against a remote fact store.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Failure of a single call against the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote service unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("remote service rejected '{fact}': {reason}")]
    Rejected { fact: Box<Fact>, reason: String },

    #[error("remote call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

impl RemoteError {
    /// Create an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a rejected error for one fact.
    pub fn rejected(fact: Fact, reason: impl Into<String>) -> Self {
        Self::Rejected {
            fact: Box::new(fact),
            reason: reason.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            after_ms: duration_ms(after),
        }
    }

    /// Whether the failure is a transport problem rather than a refusal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

/// One operation that the remote service did not apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    pub operation: Operation,
    pub error: RemoteError,
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation.description(), self.error)
    }
}

/// Reconciler error types.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("{} mutation(s) failed: {}", .failures.len(), join(.failures))]
    Mutation { failures: Vec<OperationFailure> },

    #[error("mutations timed out after {deadline_ms}ms with {pending} operation(s) outstanding")]
    DispatchTimeout { deadline_ms: u64, pending: usize },

    #[error(
        "remote state did not converge after {attempts} attempt(s) in {elapsed_ms}ms: missing [{}], unexpected [{}]",
        join(.missing),
        join(.unexpected)
    )]
    ConvergenceTimeout {
        elapsed_ms: u64,
        attempts: u32,
        last_observed: FactSet,
        missing: Vec<Fact>,
        unexpected: Vec<Fact>,
        last_error: Option<RemoteError>,
    },

    #[error("failed to observe remote state: {source}")]
    ObservationFailed {
        #[source]
        source: RemoteError,
    },

    #[error("reconciliation cancelled while {phase}")]
    Cancelled { phase: Phase },

    #[error("invalid desired state: {reason}")]
    InvalidDesiredState { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a mutation error from per-operation failures.
    pub fn mutation(failures: Vec<OperationFailure>) -> Self {
        Self::Mutation { failures }
    }

    /// Create a dispatch timeout error.
    pub fn dispatch_timeout(deadline: Duration, pending: usize) -> Self {
        Self::DispatchTimeout {
            deadline_ms: duration_ms(deadline),
            pending,
        }
    }

    /// Create a convergence timeout error from the last observation.
    pub fn convergence_timeout(
        elapsed: Duration,
        attempts: u32,
        want: &FactSet,
        last_observed: FactSet,
        last_error: Option<RemoteError>,
    ) -> Self {
        Self::ConvergenceTimeout {
            elapsed_ms: duration_ms(elapsed),
            attempts,
            missing: want.difference(&last_observed),
            unexpected: last_observed.difference(want),
            last_observed,
            last_error,
        }
    }

    /// Create an observation failed error.
    pub fn observation_failed(source: RemoteError) -> Self {
        Self::ObservationFailed { source }
    }

    /// Create a cancelled error.
    pub fn cancelled(phase: Phase) -> Self {
        Self::Cancelled { phase }
    }

    /// Create an invalid desired state error.
    pub fn invalid_desired_state(reason: impl Into<String>) -> Self {
        Self::InvalidDesiredState {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// The reconciliation phase the error came from.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::ObservationFailed { .. } | Self::InvalidDesiredState { .. } => {
                Some(Phase::Diffing)
            }
            Self::Mutation { .. } | Self::DispatchTimeout { .. } => Some(Phase::Mutating),
            Self::ConvergenceTimeout { .. } => Some(Phase::Verifying),
            Self::Cancelled { phase } => Some(*phase),
            Self::InvalidConfig { .. } => None,
        }
    }

    /// Facts the error leaves unresolved, in the order they were reported.
    pub fn unresolved_facts(&self) -> Vec<&Fact> {
        match self {
            Self::Mutation { failures } => {
                failures.iter().map(|f| f.operation.target()).collect()
            }
            Self::ConvergenceTimeout {
                missing,
                unexpected,
                ..
            } => missing.iter().chain(unexpected).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether running the whole reconciliation again may succeed.
    ///
    /// Every remote-side failure qualifies because diffing always starts
    /// from a fresh read.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidDesiredState { .. } | Self::InvalidConfig { .. }
        )
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use factsync_core::{FactScope, Permission, Scope};

    fn devs() -> FactScope {
        FactScope::group_permissions(Scope::Organization, "devs")
    }

    #[test]
    fn test_mutation_error_names_each_failed_fact() {
        let g = devs();
        let err = Error::mutation(vec![OperationFailure {
            operation: Operation::Add(g.fact(Permission::Provisioning)),
            error: RemoteError::rejected(g.fact(Permission::Provisioning), "not allowed"),
        }]);

        let message = err.to_string();
        assert!(message.contains("1 mutation(s) failed"));
        assert!(message.contains("provisioning"));
        assert_eq!(err.phase(), Some(Phase::Mutating));
        assert_eq!(err.unresolved_facts().len(), 1);
    }

    #[test]
    fn test_convergence_timeout_lists_missing_and_unexpected() {
        let g = devs();
        let want: FactSet = vec![g.fact(Permission::Admin), g.fact(Permission::Scan)].into();
        let observed: FactSet = vec![g.fact(Permission::Scan), g.fact(Permission::GateAdmin)].into();

        let err = Error::convergence_timeout(Duration::from_secs(30), 7, &want, observed, None);

        assert!(matches!(
            &err,
            Error::ConvergenceTimeout { missing, unexpected, .. }
                if missing == &vec![g.fact(Permission::Admin)]
                    && unexpected == &vec![g.fact(Permission::GateAdmin)]
        ));
        assert_eq!(err.phase(), Some(Phase::Verifying));
        assert!(err.to_string().contains("7 attempt(s)"));
    }

    #[test]
    fn test_remote_error_classification() {
        assert!(RemoteError::unavailable("502").is_transient());
        assert!(RemoteError::timeout(Duration::from_secs(1)).is_transient());
        assert!(!RemoteError::rejected(devs().fact(Permission::User), "bad").is_transient());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::dispatch_timeout(Duration::from_secs(30), 2).is_retryable());
        assert!(Error::cancelled(Phase::Verifying).is_retryable());
        assert!(!Error::invalid_desired_state("wrong subject").is_retryable());
    }
}
