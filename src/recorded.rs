//! Recorded analysis: collaborators replayed from a JSON document.
//!
//! The document describes a workspace snapshot together with what its
//! analyzers would report:
//!
//! ```json
//! {
//!   "groups": [
//!     {
//!       "id": "A", "name": "App", "dialect": "csharp",
//!       "units": [ { "id": "a1", "name": "Program.cs", "generated": false } ],
//!       "diagnostics": [
//!         { "id": "CS0168", "severity": "warning", "message": "...", "tree": "tree:a1" }
//!       ],
//!       "failure": null,
//!       "delay_ms": 0
//!     }
//!   ]
//! }
//! ```
//!
//! A unit's tree defaults to `tree:<unit id>`. `failure` makes every fetch
//! touching the group fail; `delay_ms` delays those fetches (cancellably).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use fixall_core::adapter::{DiagnosticSource, UnitInspector};
use fixall_core::error::{CollaboratorError, FixAllError};
use fixall_core::types::{Diagnostic, Dialect, GroupId, TreeId, UnitId};
use fixall_core::workspace::{Group, SnapshotError, Unit, WorkspaceSnapshot};

// ============================================================================
// Document Format
// ============================================================================

#[derive(Debug, Deserialize)]
struct Document {
    groups: Vec<GroupRecord>,
}

#[derive(Debug, Deserialize)]
struct GroupRecord {
    id: GroupId,
    name: String,
    dialect: Dialect,
    #[serde(default)]
    units: Vec<UnitRecord>,
    #[serde(default)]
    diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default)]
    delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UnitRecord {
    id: UnitId,
    name: String,
    #[serde(default)]
    tree: Option<TreeId>,
    #[serde(default)]
    generated: bool,
}

/// Errors loading a recorded analysis.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed analysis record: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl From<RecordError> for FixAllError {
    fn from(err: RecordError) -> Self {
        FixAllError::InvalidSnapshot {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Recorded Analysis
// ============================================================================

#[derive(Debug)]
struct GroupBehavior {
    diagnostics: Vec<Diagnostic>,
    failure: Option<String>,
    delay: Option<Duration>,
}

/// Replays recorded diagnostics as both collaborator roles.
#[derive(Debug)]
pub struct RecordedAnalysis {
    snapshot: Arc<WorkspaceSnapshot>,
    behaviors: HashMap<GroupId, GroupBehavior>,
    trees: HashMap<UnitId, TreeId>,
    generated: HashSet<UnitId>,
    fetched_groups: Mutex<Vec<GroupId>>,
    fetched_units: Mutex<Vec<UnitId>>,
}

impl RecordedAnalysis {
    /// Read and parse a record file.
    pub fn load(path: &Path) -> Result<Self, RecordError> {
        let json = std::fs::read_to_string(path).map_err(|source| RecordError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Parse a record document.
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        let document: Document = serde_json::from_str(json)?;

        let mut groups = Vec::with_capacity(document.groups.len());
        let mut behaviors = HashMap::with_capacity(document.groups.len());
        let mut trees = HashMap::new();
        let mut generated = HashSet::new();

        for record in document.groups {
            let mut group = Group::new(record.id.clone(), record.name, record.dialect);
            for unit in record.units {
                let tree = unit
                    .tree
                    .unwrap_or_else(|| TreeId::new(format!("tree:{}", unit.id)));
                trees.insert(unit.id.clone(), tree);
                if unit.generated {
                    generated.insert(unit.id.clone());
                }
                group = group.with_unit(unit.id, unit.name);
            }
            behaviors.insert(
                record.id,
                GroupBehavior {
                    diagnostics: record.diagnostics,
                    failure: record.failure,
                    delay: record.delay_ms.map(Duration::from_millis),
                },
            );
            groups.push(group);
        }

        Ok(RecordedAnalysis {
            snapshot: Arc::new(WorkspaceSnapshot::new(groups)?),
            behaviors,
            trees,
            generated,
            fetched_groups: Mutex::new(Vec::new()),
            fetched_units: Mutex::new(Vec::new()),
        })
    }

    /// The recorded workspace.
    pub fn snapshot(&self) -> Arc<WorkspaceSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Groups fetched so far, in call order.
    pub fn fetched_groups(&self) -> Vec<GroupId> {
        self.fetched_groups
            .lock()
            .expect("fetch log poisoned")
            .clone()
    }

    /// Units fetched so far, in call order.
    pub fn fetched_units(&self) -> Vec<UnitId> {
        self.fetched_units
            .lock()
            .expect("fetch log poisoned")
            .clone()
    }

    fn tree_of(&self, unit: &UnitId) -> TreeId {
        self.trees
            .get(unit)
            .cloned()
            .unwrap_or_else(|| TreeId::new(format!("tree:{}", unit)))
    }

    /// Apply the group's delay and failure, then hand back its diagnostics.
    async fn replay(
        &self,
        group: &GroupId,
        cancel: &CancellationToken,
    ) -> Result<&[Diagnostic], CollaboratorError> {
        let Some(behavior) = self.behaviors.get(group) else {
            return Ok(&[]);
        };

        if let Some(delay) = behavior.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(CollaboratorError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if let Some(message) = &behavior.failure {
            return Err(CollaboratorError::failed(message.clone()));
        }
        Ok(&behavior.diagnostics)
    }
}

#[async_trait]
impl DiagnosticSource for RecordedAnalysis {
    async fn diagnostics_for_unit(
        &self,
        unit: &Unit,
        cancel: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, CollaboratorError> {
        self.fetched_units
            .lock()
            .expect("fetch log poisoned")
            .push(unit.id.clone());

        let tree = self.tree_of(&unit.id);
        let diagnostics = self.replay(&unit.group, cancel).await?;
        Ok(diagnostics
            .iter()
            .filter(|d| d.tree.as_ref() == Some(&tree))
            .cloned()
            .collect())
    }

    async fn diagnostics_for_group(
        &self,
        group: &Group,
        cancel: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, CollaboratorError> {
        self.fetched_groups
            .lock()
            .expect("fetch log poisoned")
            .push(group.id.clone());

        Ok(self.replay(&group.id, cancel).await?.to_vec())
    }
}

#[async_trait]
impl UnitInspector for RecordedAnalysis {
    async fn is_generated(
        &self,
        unit: &Unit,
        _cancel: &CancellationToken,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.generated.contains(&unit.id))
    }

    async fn materialize_tree(
        &self,
        unit: &Unit,
        _cancel: &CancellationToken,
    ) -> Result<TreeId, CollaboratorError> {
        Ok(self.tree_of(&unit.id))
    }
}

// ============================================================================
// Tests
// ============================================================================
