//! Error types and error code constants for fixall.
//!
//! This module provides a unified error type (`FixAllError`) that every
//! engine component returns, bridges collaborator and snapshot errors into
//! it, and maps each variant to a stable exit code for JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Resolution errors (scope target not in the snapshot)
//! - `4`: Analysis failed (a collaborator failed or a fetch task panicked)
//! - `5`: Cancelled
//! - `10`: Internal errors (bugs, unreadable or malformed snapshot files)

use std::fmt;

use thiserror::Error;

use crate::types::{GroupId, UnitId};
use crate::workspace::SnapshotError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output and process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller.
    InvalidArguments = 2,
    /// Scope target could not be resolved in the snapshot.
    ResolutionError = 3,
    /// A collaborator failed.
    AnalysisFailed = 4,
    /// The aggregation was cancelled.
    Cancelled = 5,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Collaborator Operations
// ============================================================================

/// The collaborator call that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchForUnit,
    FetchForGroup,
    IsGenerated,
    MaterializeTree,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::FetchForUnit => write!(f, "fetch_for_unit"),
            Operation::FetchForGroup => write!(f, "fetch_for_group"),
            Operation::IsGenerated => write!(f, "is_generated"),
            Operation::MaterializeTree => write!(f, "materialize_tree"),
        }
    }
}

/// Error returned by collaborator implementations.
///
/// Collaborators only distinguish "I observed cancellation" from "I failed";
/// the engine attaches the operation and target when bridging.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator observed the cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// The collaborator failed.
    #[error("{0}")]
    Failed(String),
}

impl CollaboratorError {
    /// Create a failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        CollaboratorError::Failed(message.into())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for the aggregation engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FixAllError {
    /// Cancellation was observed at a suspension point.
    #[error("aggregation cancelled")]
    Cancelled,

    /// A collaborator call failed.
    #[error("{operation} failed for {target}: {message}")]
    CollaboratorFailure {
        operation: Operation,
        target: String,
        message: String,
    },

    /// A fan-out fetch task panicked.
    #[error("fetch task for group {group} panicked: {message}")]
    TaskPanicked { group: GroupId, message: String },

    /// Scope names a unit that is not in the snapshot.
    #[error("unknown unit: {unit}")]
    UnknownUnit { unit: UnitId },

    /// Scope names a group that is not in the snapshot.
    #[error("unknown group: {group}")]
    UnknownGroup { group: GroupId },

    /// The snapshot is structurally invalid.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot { message: String },

    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&FixAllError> for OutputErrorCode {
    fn from(err: &FixAllError) -> Self {
        match err {
            FixAllError::Cancelled => OutputErrorCode::Cancelled,
            FixAllError::CollaboratorFailure { .. } => OutputErrorCode::AnalysisFailed,
            FixAllError::TaskPanicked { .. } => OutputErrorCode::AnalysisFailed,
            FixAllError::UnknownUnit { .. } => OutputErrorCode::ResolutionError,
            FixAllError::UnknownGroup { .. } => OutputErrorCode::ResolutionError,
            FixAllError::InvalidSnapshot { .. } => OutputErrorCode::InternalError,
            FixAllError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            FixAllError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<FixAllError> for OutputErrorCode {
    fn from(err: FixAllError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridge: SnapshotError -> FixAllError
// ============================================================================

impl From<SnapshotError> for FixAllError {
    fn from(err: SnapshotError) -> Self {
        FixAllError::InvalidSnapshot {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl FixAllError {
    /// Bridge a collaborator error raised by `operation` on `target`.
    pub fn from_collaborator(
        err: CollaboratorError,
        operation: Operation,
        target: impl fmt::Display,
    ) -> Self {
        match err {
            CollaboratorError::Cancelled => FixAllError::Cancelled,
            CollaboratorError::Failed(message) => FixAllError::CollaboratorFailure {
                operation,
                target: target.to_string(),
                message,
            },
        }
    }

    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        FixAllError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        FixAllError::InternalError {
            message: message.into(),
        }
    }

    /// True for the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FixAllError::Cancelled)
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod error_code_mapping {
        use super::*;

        #[test]
        fn cancelled_maps_to_cancelled() {
            assert_eq!(FixAllError::Cancelled.error_code(), OutputErrorCode::Cancelled);
            assert_eq!(FixAllError::Cancelled.error_code().code(), 5);
        }

        #[test]
        fn collaborator_failure_maps_to_analysis_failed() {
            let err = FixAllError::CollaboratorFailure {
                operation: Operation::FetchForGroup,
                target: "B".to_string(),
                message: "analyzer crashed".to_string(),
            };
            assert_eq!(err.error_code().code(), 4);
        }

        #[test]
        fn unknown_targets_map_to_resolution_error() {
            let unit = FixAllError::UnknownUnit {
                unit: UnitId::new("zz"),
            };
            let group = FixAllError::UnknownGroup {
                group: GroupId::new("Z"),
            };
            assert_eq!(unit.error_code(), OutputErrorCode::ResolutionError);
            assert_eq!(group.error_code(), OutputErrorCode::ResolutionError);
        }

        #[test]
        fn invalid_arguments_maps_to_2() {
            assert_eq!(FixAllError::invalid_args("bad").error_code().code(), 2);
        }

        #[test]
        fn internal_maps_to_10() {
            assert_eq!(FixAllError::internal("bug").error_code().code(), 10);
        }
    }

    mod bridges {
        use super::*;

        #[test]
        fn collaborator_cancellation_becomes_cancelled() {
            let err = FixAllError::from_collaborator(
                CollaboratorError::Cancelled,
                Operation::MaterializeTree,
                "a1",
            );
            assert!(err.is_cancelled());
        }

        #[test]
        fn collaborator_failure_keeps_operation_and_target() {
            let err = FixAllError::from_collaborator(
                CollaboratorError::failed("boom"),
                Operation::IsGenerated,
                UnitId::new("a1"),
            );
            assert_eq!(err.to_string(), "is_generated failed for a1: boom");
        }

        #[test]
        fn snapshot_error_becomes_invalid_snapshot() {
            let err: FixAllError = SnapshotError::DuplicateGroup {
                group: GroupId::new("A"),
            }
            .into();
            assert_eq!(err.to_string(), "invalid snapshot: duplicate group id: A");
        }
    }
}
