//! Diagnostic partitioner.
//!
//! Buckets a flat diagnostic list by owning unit:
//! 1. Build a [`UnitIdentityMap`] over the groups in play
//! 2. Resolve each diagnostic's tree; unresolvable diagnostics are dropped
//! 3. Drop buckets whose unit is excluded by the [`GeneratedUnitFilter`]
//!
//! Within a bucket the collector's order is preserved.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;

use fixall_core::adapter::UnitInspector;
use fixall_core::config::TreeMode;
use fixall_core::error::FixAllError;
use fixall_core::types::{AggregationResult, Diagnostic, UnitId};
use fixall_core::workspace::{Group, WorkspaceSnapshot};

use crate::generated::GeneratedUnitFilter;
use crate::identity::UnitIdentityMap;

/// Groups diagnostics into per-unit buckets.
pub struct DiagnosticPartitioner<'a> {
    snapshot: &'a WorkspaceSnapshot,
    inspector: &'a dyn UnitInspector,
    tree_mode: TreeMode,
}

impl<'a> DiagnosticPartitioner<'a> {
    pub fn new(
        snapshot: &'a WorkspaceSnapshot,
        inspector: &'a dyn UnitInspector,
        tree_mode: TreeMode,
    ) -> Self {
        DiagnosticPartitioner {
            snapshot,
            inspector,
            tree_mode,
        }
    }

    /// Partition `diagnostics` across the members of `groups_in_play`.
    pub async fn partition(
        &self,
        diagnostics: Vec<Diagnostic>,
        groups_in_play: &[Arc<Group>],
        filter: &GeneratedUnitFilter,
        cancel: &CancellationToken,
    ) -> Result<AggregationResult, FixAllError> {
        if diagnostics.is_empty() {
            return Ok(AggregationResult::new());
        }

        let identities =
            UnitIdentityMap::build(groups_in_play, self.inspector, self.tree_mode, cancel).await?;

        let mut order: Vec<UnitId> = Vec::new();
        let mut buckets: HashMap<UnitId, Vec<Diagnostic>> = HashMap::new();
        let mut unresolved = 0usize;

        for diagnostic in diagnostics {
            let owner = diagnostic
                .tree
                .as_ref()
                .and_then(|tree| identities.resolve(tree))
                .cloned();
            let Some(owner) = owner else {
                unresolved += 1;
                continue;
            };
            buckets
                .entry(owner.clone())
                .or_insert_with(|| {
                    order.push(owner);
                    Vec::new()
                })
                .push(diagnostic);
        }

        if unresolved > 0 {
            tracing::debug!(unresolved, "dropped diagnostics without an owning unit");
        }

        let verdicts = try_join_all(order.iter().map(|unit_id| async move {
            match self.snapshot.unit(unit_id) {
                Some(unit) => filter.is_excluded(unit).await,
                None => Err(FixAllError::internal(format!(
                    "resolved unit {} is not in the snapshot",
                    unit_id
                ))),
            }
        }))
        .await?;

        let kept = order
            .into_iter()
            .zip(verdicts)
            .filter(|(_, excluded)| !excluded)
            .filter_map(|(unit_id, _)| {
                let bucket = buckets.remove(&unit_id)?;
                Some((unit_id, bucket))
            });

        Ok(AggregationResult::from_buckets(kept))
    }
}

// ============================================================================
// Tests
// ============================================================================
