//! Aggregation entry point.
//!
//! Wires one call's collector, partitioner, and generated-unit filter
//! together. Nothing built here outlives the call: the identity map, the
//! filter's verdict cache, and the result are all per-call.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use fixall_core::adapter::Collaborators;
use fixall_core::config::AggregationOptions;
use fixall_core::error::FixAllError;
use fixall_core::progress::ProgressReporter;
use fixall_core::scope::Scope;
use fixall_core::types::AggregationResult;
use fixall_core::workspace::WorkspaceSnapshot;

use crate::collector::ScopeCollector;
use crate::generated::GeneratedUnitFilter;
use crate::partition::DiagnosticPartitioner;

/// Runs aggregations against one snapshot and one set of collaborators.
#[derive(Debug, Clone)]
pub struct Aggregator {
    snapshot: Arc<WorkspaceSnapshot>,
    collaborators: Collaborators,
    options: AggregationOptions,
}

impl Aggregator {
    /// Create an aggregator with default options.
    pub fn new(snapshot: Arc<WorkspaceSnapshot>, collaborators: Collaborators) -> Self {
        Aggregator {
            snapshot,
            collaborators,
            options: AggregationOptions::default(),
        }
    }

    /// Replace the engine options.
    pub fn with_options(mut self, options: AggregationOptions) -> Self {
        self.options = options;
        self
    }

    /// The snapshot this aggregator reads.
    pub fn snapshot(&self) -> &WorkspaceSnapshot {
        &self.snapshot
    }

    /// Compute the per-unit diagnostics for `scope`.
    ///
    /// Returns [`FixAllError::Cancelled`] if `cancel` fires at any point
    /// before the result is handed back; a partial result is never returned.
    pub async fn aggregate(
        &self,
        scope: &Scope,
        progress: Arc<dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<AggregationResult, FixAllError> {
        let filter = GeneratedUnitFilter::new(Arc::clone(&self.collaborators.inspector), cancel.clone());

        let collected = ScopeCollector::new(&self.snapshot, &self.collaborators.source, self.options)
            .collect(scope, &filter, &progress, cancel)
            .await?;

        let result = if collected.diagnostics.is_empty() {
            AggregationResult::new()
        } else {
            DiagnosticPartitioner::new(
                &self.snapshot,
                &*self.collaborators.inspector,
                self.options.tree_mode,
            )
            .partition(collected.diagnostics, &collected.groups_in_play, &filter, cancel)
            .await?
        };

        if cancel.is_cancelled() {
            return Err(FixAllError::Cancelled);
        }

        tracing::info!(
            scope = %scope,
            units = result.len(),
            diagnostics = result.diagnostic_count(),
            "aggregation complete"
        );
        Ok(result)
    }
}

/// One-shot aggregation with default options.
pub async fn aggregate(
    snapshot: Arc<WorkspaceSnapshot>,
    scope: &Scope,
    collaborators: Collaborators,
    progress: Arc<dyn ProgressReporter>,
    cancel: &CancellationToken,
) -> Result<AggregationResult, FixAllError> {
    Aggregator::new(snapshot, collaborators)
        .aggregate(scope, progress, cancel)
        .await
}

// ============================================================================
// Tests
// ============================================================================
