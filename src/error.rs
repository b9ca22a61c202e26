//! Error taxonomy of the remediation core.

use thiserror::Error;

use crate::supervisor::Feature;

/// Errors raised by the catalog, the synthesizer, the executor
/// pre-flight and the operator control plane.
///
/// A non-zero child exit is *not* an error: it is reported through
/// [`ExecutionResult`](crate::sandbox::ExecutionResult).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemediationError {
    /// The kind has no template registered in the catalog
    #[error("Unknown action kind: {0}")]
    UnknownKind(String),

    /// A template placeholder has no bound value
    #[error("Missing parameter '{name}' for {kind}")]
    MissingParameter { kind: String, name: String },

    /// A bound value does not match the template's parameter schema
    #[error("Parameter '{name}' for {kind} must be {expected}")]
    InvalidParameter {
        kind: String,
        name: String,
        expected: &'static str,
    },

    /// Pre-flight syntax check rejected the source before any spawn
    #[error("Invalid source (line {line}): {reason}")]
    InvalidSource { line: usize, reason: String },

    /// The operator control of a feature is locked after a fault
    #[error("{0} control is disabled for this session")]
    ControlLocked(Feature),

    /// Re-arming is refused by the one-shot breaker policy
    #[error("{0} cannot be re-armed without a restart")]
    RearmNotAllowed(Feature),

    /// No pending entry with this id
    #[error("No pending action #{0}")]
    UnknownEntry(u64),
}

pub type Result<T> = std::result::Result<T, RemediationError>;
