//! Unit identity map: resolves a diagnostic's tree back to its unit.
//!
//! Diagnostics only carry a [`TreeId`]. The map is built per aggregation
//! call from exactly the groups in play, because tree identities belong to
//! one snapshot and must never be reused across calls.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;

use fixall_core::adapter::{run_cancellable, UnitInspector};
use fixall_core::config::TreeMode;
use fixall_core::error::{FixAllError, Operation};
use fixall_core::types::{TreeId, UnitId};
use fixall_core::workspace::{Group, Unit};

/// Mapping from tree identity to owning unit for one snapshot.
#[derive(Debug, Clone, Default)]
pub struct UnitIdentityMap {
    trees: HashMap<TreeId, UnitId>,
}

impl UnitIdentityMap {
    /// Build the map for every member of `groups`.
    ///
    /// Materializing a tree is the only suspension point; insertion happens
    /// afterwards in group/unit enumeration order regardless of `mode`, so
    /// the result does not depend on completion order.
    pub async fn build(
        groups: &[Arc<Group>],
        inspector: &dyn UnitInspector,
        mode: TreeMode,
        cancel: &CancellationToken,
    ) -> Result<Self, FixAllError> {
        let units: Vec<&Unit> = groups.iter().flat_map(|g| g.members()).collect();

        let trees: Vec<TreeId> = match mode {
            TreeMode::Concurrent => {
                try_join_all(units.iter().map(|unit| materialize(inspector, unit, cancel))).await?
            }
            TreeMode::Sequential => {
                let mut trees = Vec::with_capacity(units.len());
                for unit in &units {
                    trees.push(materialize(inspector, unit, cancel).await?);
                }
                trees
            }
        };

        let mut map = UnitIdentityMap {
            trees: HashMap::with_capacity(units.len()),
        };
        for (tree, unit) in trees.into_iter().zip(units) {
            map.insert(tree, unit.id.clone());
        }
        Ok(map)
    }

    /// Record `tree -> unit`. A repeated tree keeps the later unit.
    fn insert(&mut self, tree: TreeId, unit: UnitId) {
        if let Some(previous) = self.trees.get(&tree) {
            debug_assert!(
                previous == &unit,
                "tree {} maps to both {} and {}",
                tree,
                previous,
                unit
            );
            tracing::warn!(
                tree = %tree,
                previous = %previous,
                unit = %unit,
                "tree identity collision; keeping later unit"
            );
        }
        self.trees.insert(tree, unit);
    }

    /// The unit owning `tree`, if it is in play.
    pub fn resolve(&self, tree: &TreeId) -> Option<&UnitId> {
        self.trees.get(tree)
    }

    /// Number of trees recorded.
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// True when no trees were recorded.
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

async fn materialize(
    inspector: &dyn UnitInspector,
    unit: &Unit,
    cancel: &CancellationToken,
) -> Result<TreeId, FixAllError> {
    run_cancellable(
        cancel,
        Operation::MaterializeTree,
        &unit.id,
        inspector.materialize_tree(unit, cancel),
    )
    .await
}

// ============================================================================
// Tests
// ============================================================================
