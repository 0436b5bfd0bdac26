//! Workspace snapshot: groups of units under analysis.
//!
//! A [`WorkspaceSnapshot`] is an immutable view of every [`Group`] and
//! [`Unit`] available for one aggregation call:
//! - Groups keep the order in which they were supplied
//! - Units keep their order within their group
//! - Unit and group ids are unique across the snapshot
//!
//! Groups are held behind `Arc` so fan-out tasks can own the group they
//! fetch without copying its member list.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::types::{Dialect, GroupId, UnitId};

// ============================================================================
// Unit and Group
// ============================================================================

/// A logical source artifact (one file within one compilation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// Stable key.
    pub id: UnitId,
    /// Display name (typically a file name).
    pub name: String,
    /// Owning group.
    pub group: GroupId,
}

/// Units sharing one analysis configuration (one compiled project).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Stable key.
    pub id: GroupId,
    /// Display name (typically a project name).
    pub name: String,
    /// Analysis language shared by every member.
    pub dialect: Dialect,
    /// Member units in enumeration order.
    pub units: Vec<Unit>,
}

impl Group {
    /// Create an empty group.
    pub fn new(id: impl Into<GroupId>, name: impl Into<String>, dialect: impl Into<Dialect>) -> Self {
        Group {
            id: id.into(),
            name: name.into(),
            dialect: dialect.into(),
            units: Vec::new(),
        }
    }

    /// Add a member unit owned by this group.
    pub fn with_unit(mut self, id: impl Into<UnitId>, name: impl Into<String>) -> Self {
        let unit = Unit {
            id: id.into(),
            name: name.into(),
            group: self.id.clone(),
        };
        self.units.push(unit);
        self
    }

    /// Member units in enumeration order.
    pub fn members(&self) -> &[Unit] {
        &self.units
    }
}

// ============================================================================
// Snapshot Errors
// ============================================================================

/// Structural problems detected while building a snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    /// Two groups share an id.
    #[error("duplicate group id: {group}")]
    DuplicateGroup { group: GroupId },

    /// Two units share an id (possibly across groups).
    #[error("duplicate unit id: {unit}")]
    DuplicateUnit { unit: UnitId },

    /// A unit claims a group other than the one containing it.
    #[error("unit {unit} declares group {declared} but is listed under {actual}")]
    MismatchedGroup {
        unit: UnitId,
        declared: GroupId,
        actual: GroupId,
    },
}

// ============================================================================
// Workspace Snapshot
// ============================================================================

/// Immutable collection of groups for the duration of one aggregation.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSnapshot {
    groups: Vec<Arc<Group>>,
    group_index: HashMap<GroupId, usize>,
    /// unit id -> (group index, member index)
    unit_index: HashMap<UnitId, (usize, usize)>,
}

impl WorkspaceSnapshot {
    /// Build a snapshot, validating id uniqueness and group membership.
    pub fn new(groups: Vec<Group>) -> Result<Self, SnapshotError> {
        let mut group_index = HashMap::with_capacity(groups.len());
        let mut unit_index = HashMap::new();

        for (gi, group) in groups.iter().enumerate() {
            if group_index.insert(group.id.clone(), gi).is_some() {
                return Err(SnapshotError::DuplicateGroup {
                    group: group.id.clone(),
                });
            }
            for (ui, unit) in group.units.iter().enumerate() {
                if unit.group != group.id {
                    return Err(SnapshotError::MismatchedGroup {
                        unit: unit.id.clone(),
                        declared: unit.group.clone(),
                        actual: group.id.clone(),
                    });
                }
                if unit_index.insert(unit.id.clone(), (gi, ui)).is_some() {
                    return Err(SnapshotError::DuplicateUnit {
                        unit: unit.id.clone(),
                    });
                }
            }
        }

        Ok(WorkspaceSnapshot {
            groups: groups.into_iter().map(Arc::new).collect(),
            group_index,
            unit_index,
        })
    }

    /// All groups in workspace order.
    pub fn groups(&self) -> &[Arc<Group>] {
        &self.groups
    }

    /// Look up a group by id.
    pub fn group(&self, id: &GroupId) -> Option<&Arc<Group>> {
        self.group_index.get(id).map(|&gi| &self.groups[gi])
    }

    /// Look up a unit by id.
    pub fn unit(&self, id: &UnitId) -> Option<&Unit> {
        self.unit_index
            .get(id)
            .map(|&(gi, ui)| &self.groups[gi].units[ui])
    }

    /// The group owning `unit`.
    pub fn group_of(&self, unit: &UnitId) -> Option<&Arc<Group>> {
        self.unit_index.get(unit).map(|&(gi, _)| &self.groups[gi])
    }

    /// Groups analyzed with `dialect`, in workspace order.
    pub fn groups_with_dialect(&self, dialect: &Dialect) -> Vec<Arc<Group>> {
        self.groups
            .iter()
            .filter(|g| &g.dialect == dialect)
            .cloned()
            .collect()
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of units across all groups.
    pub fn unit_count(&self) -> usize {
        self.unit_index.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
