//! JSON output structures for the CLI.
//!
//! Every command prints one JSON document on stdout: a success wrapper
//! around its payload, or an error with a machine-readable code.

use factsync_reconciler::{Converged, DiffResult, Error, Operation, Phase};
use serde::{Deserialize, Serialize};

/// Standard JSON success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSuccess<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T> JsonSuccess<T> {
    /// Create a new success response
    pub const fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Payload of `factsync diff`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffOutput {
    pub store: String,
    pub operations: Vec<String>,
    pub diff: DiffResult,
}

impl DiffOutput {
    /// Describe a diff computed for `store`.
    pub fn new(store: impl Into<String>, diff: DiffResult) -> Self {
        let operations = diff
            .clone()
            .into_operations()
            .iter()
            .map(Operation::description)
            .collect();
        Self {
            store: store.into(),
            operations,
            diff,
        }
    }
}

/// Payload of `factsync reconcile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOutput {
    pub store: String,
    pub noop: bool,
    #[serde(flatten)]
    pub converged: Converged,
}

impl ReconcileOutput {
    /// Describe a converged reconciliation of `store`.
    pub fn new(store: impl Into<String>, converged: Converged) -> Self {
        Self {
            store: store.into(),
            noop: converged.was_noop(),
            converged,
        }
    }
}

/// Standard JSON error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonError {
    pub success: bool,
    pub error: ErrorDetail,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (`SCREAMING_SNAKE_CASE`)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Reconciliation phase the error came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Semantic exit code (1-4)
    pub exit_code: i32,
    /// Facts left unresolved
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
    /// Optional suggestion for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Error codes for machine-readable errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MutationFailed,
    DispatchTimeout,
    ConvergenceTimeout,
    ObservationFailed,
    Cancelled,
    InvalidDesiredState,
    InvalidConfig,
}

impl ErrorCode {
    /// Get the string representation of the error code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MutationFailed => "MUTATION_FAILED",
            Self::DispatchTimeout => "DISPATCH_TIMEOUT",
            Self::ConvergenceTimeout => "CONVERGENCE_TIMEOUT",
            Self::ObservationFailed => "OBSERVATION_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::InvalidDesiredState => "INVALID_DESIRED_STATE",
            Self::InvalidConfig => "INVALID_CONFIG",
        }
    }

    /// The code for a reconciler error.
    #[must_use]
    pub const fn of(error: &Error) -> Self {
        match error {
            Error::Mutation { .. } => Self::MutationFailed,
            Error::DispatchTimeout { .. } => Self::DispatchTimeout,
            Error::ConvergenceTimeout { .. } => Self::ConvergenceTimeout,
            Error::ObservationFailed { .. } => Self::ObservationFailed,
            Error::Cancelled { .. } => Self::Cancelled,
            Error::InvalidDesiredState { .. } => Self::InvalidDesiredState,
            Error::InvalidConfig { .. } => Self::InvalidConfig,
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

/// Classify an error into a semantic exit code.
///
/// - 1: Invalid input (plan, config, facts)
/// - 2: Remote state left unconverged (mutation or verification failed)
/// - 3: Remote service unreachable
/// - 4: Cancelled
const fn classify_exit_code(error: &Error) -> i32 {
    match error {
        Error::InvalidDesiredState { .. } | Error::InvalidConfig { .. } => 1,
        Error::Mutation { .. } | Error::DispatchTimeout { .. } | Error::ConvergenceTimeout { .. } => 2,
        Error::ObservationFailed { .. } => 3,
        Error::Cancelled { .. } => 4,
    }
}

fn suggestion(error: &Error) -> Option<String> {
    match error {
        Error::ConvergenceTimeout { .. } => Some(
            "Mutations may still be propagating; run the reconciliation again".to_string(),
        ),
        Error::Mutation { .. } | Error::DispatchTimeout { .. } => {
            Some("Re-run to retry; the next diff starts from fresh remote state".to_string())
        }
        Error::InvalidDesiredState { .. } => {
            Some("Check that every desired fact matches the plan's kind, scope and subject".to_string())
        }
        _ => None,
    }
}

impl From<&Error> for JsonError {
    fn from(error: &Error) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: ErrorCode::of(error).into(),
                message: error.to_string(),
                phase: error.phase(),
                exit_code: classify_exit_code(error),
                unresolved: error
                    .unresolved_facts()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                suggestion: suggestion(error),
            },
        }
    }
}

impl JsonError {
    /// The exit code the process should end with.
    pub const fn exit_code(&self) -> i32 {
        self.error.exit_code
    }
}
