//! Error types for the sequence graph engine.

use std::fmt;

use thiserror::Error;

use crate::export::ExportError;
use crate::sequence::registry::StepKind;

/// Result type alias for flow operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// A single problem found while validating step content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Schema field name (`recipient_email`, `subject`, `body`, `minutes`).
    pub field: &'static str,
    /// Human readable description of the problem.
    pub problem: String,
}

impl FieldIssue {
    /// The field was absent or blank.
    pub fn missing(field: &'static str) -> Self {
        Self {
            field,
            problem: "is required".to_string(),
        }
    }

    /// The field was present but could not be accepted.
    pub fn invalid(field: &'static str, problem: impl Into<String>) -> Self {
        Self {
            field,
            problem: problem.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.problem)
    }
}

/// Errors that can occur while editing or exporting a sequence.
///
/// None of these leave the graph partially mutated; every operation validates
/// and plans before it touches state.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Submitted content is malformed or incomplete. Re-prompt the user.
    #[error("Invalid {kind} content: {}", join_issues(.issues))]
    Validation { kind: StepKind, issues: Vec<FieldIssue> },

    /// The referenced step is no longer part of the graph.
    #[error("Step not found: {0}")]
    NotFound(String),

    /// The operation would break the single-path or entry-point invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A session (or an export) is already in progress.
    #[error("Session already active: {0}")]
    Reentrancy(String),

    /// A session operation was called while the controller was idle.
    #[error("No active session")]
    NoActiveSession,

    /// A kind name that is not part of the registry.
    #[error("Unknown step kind: {0}")]
    UnknownKind(String),

    /// The external process starter reported a failure.
    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    /// Automerge error while reading or writing a sequence document.
    #[error("Automerge error: {0}")]
    Automerge(#[from] automerge::AutomergeError),

    /// Autosurgeon hydration error.
    #[error("Hydration error: {0}")]
    Hydrate(#[from] autosurgeon::HydrateError),

    /// Autosurgeon reconcile error.
    #[error("Reconcile error: {0}")]
    Reconcile(#[from] autosurgeon::ReconcileError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl FlowError {
    /// Creates a Validation error.
    pub fn validation(kind: StepKind, issues: Vec<FieldIssue>) -> Self {
        Self::Validation { kind, issues }
    }

    /// Creates a NotFound error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Creates an InvariantViolation error.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Creates a Reentrancy error.
    pub fn reentrancy(state: impl Into<String>) -> Self {
        Self::Reentrancy(state.into())
    }

    /// Creates an UnknownKind error.
    pub fn unknown_kind(name: impl Into<String>) -> Self {
        Self::UnknownKind(name.into())
    }

    /// Creates a Serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Field issues carried by a Validation error, empty otherwise.
    pub fn issues(&self) -> &[FieldIssue] {
        match self {
            Self::Validation { issues, .. } => issues,
            _ => &[],
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
