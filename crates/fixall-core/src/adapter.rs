//! Collaborator traits: the only boundary between the aggregation engine and
//! the analyzers that produce diagnostics.
//!
//! The engine never analyzes anything itself. It consumes:
//! - [`DiagnosticSource`]: fetch diagnostics for one unit or one group
//! - [`UnitInspector`]: decide whether a unit is generated, and materialize
//!   the tree a unit's diagnostics are reported against
//!
//! Every method takes the call's [`CancellationToken`]. Implementations may
//! observe it themselves (returning [`CollaboratorError::Cancelled`]), but
//! the engine does not rely on that: each call is routed through
//! [`run_cancellable`], which checks the token before the call, races the
//! call against it, and checks again after resuming.
//!
//! Traits use `#[async_trait]` so collaborators can be held as
//! `Arc<dyn Trait>` and moved into spawned fan-out tasks.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{CollaboratorError, FixAllError, Operation};
use crate::types::{Diagnostic, TreeId};
use crate::workspace::{Group, Unit};

// ============================================================================
// Traits
// ============================================================================

/// Produces diagnostics for a unit or a whole group.
#[async_trait]
pub trait DiagnosticSource: Send + Sync {
    /// Diagnostics reported for a single unit.
    async fn diagnostics_for_unit(
        &self,
        unit: &Unit,
        cancel: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, CollaboratorError>;

    /// Diagnostics reported for every unit of a group.
    async fn diagnostics_for_group(
        &self,
        group: &Group,
        cancel: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, CollaboratorError>;
}

/// Answers per-unit questions about the snapshot.
#[async_trait]
pub trait UnitInspector: Send + Sync {
    /// True when the unit is generated or otherwise excluded from fixing.
    async fn is_generated(
        &self,
        unit: &Unit,
        cancel: &CancellationToken,
    ) -> Result<bool, CollaboratorError>;

    /// Identity of the unit's parsed representation in this snapshot.
    async fn materialize_tree(
        &self,
        unit: &Unit,
        cancel: &CancellationToken,
    ) -> Result<TreeId, CollaboratorError>;
}

/// The pair of collaborators an aggregation runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn DiagnosticSource>,
    pub inspector: Arc<dyn UnitInspector>,
}

impl Collaborators {
    /// Bundle a source and an inspector.
    pub fn new(source: Arc<dyn DiagnosticSource>, inspector: Arc<dyn UnitInspector>) -> Self {
        Collaborators { source, inspector }
    }

    /// Use one value for both roles.
    pub fn from_shared<T>(analysis: Arc<T>) -> Self
    where
        T: DiagnosticSource + UnitInspector + 'static,
    {
        Collaborators {
            source: analysis.clone(),
            inspector: analysis,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Run one collaborator call as a cancellable suspension point.
///
/// - Already cancelled: the call is not started.
/// - Cancelled while suspended: the call is dropped.
/// - Cancelled by the time the call returns: its value is discarded.
///
/// In all three cases the outcome is [`FixAllError::Cancelled`]. Collaborator
/// failures are bridged with `operation` and `target` attached.
pub async fn run_cancellable<T, F>(
    cancel: &CancellationToken,
    operation: Operation,
    target: impl fmt::Display,
    call: F,
) -> Result<T, FixAllError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    if cancel.is_cancelled() {
        return Err(FixAllError::Cancelled);
    }

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = call => Some(result),
    };

    match outcome {
        None => Err(FixAllError::Cancelled),
        Some(_) if cancel.is_cancelled() => Err(FixAllError::Cancelled),
        Some(Ok(value)) => Ok(value),
        Some(Err(err)) => Err(FixAllError::from_collaborator(err, operation, target)),
    }
}

// ============================================================================
// Tests
// ============================================================================
