//! In-memory collaborators for engine unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fixall_core::adapter::{DiagnosticSource, UnitInspector};
use fixall_core::error::CollaboratorError;
use fixall_core::types::{Diagnostic, GroupId, Severity, TreeId, UnitId};
use fixall_core::workspace::{Group, Unit, WorkspaceSnapshot};

/// Scriptable analysis host implementing both collaborator traits.
///
/// Every unit's tree is `tree:<unit id>`.
pub struct MockAnalysis {
    snapshot: WorkspaceSnapshot,
    group_diagnostics: HashMap<GroupId, Vec<Diagnostic>>,
    generated: HashSet<UnitId>,
    group_failures: HashMap<GroupId, String>,
    unit_failures: HashMap<UnitId, String>,
    generated_failures: HashMap<UnitId, String>,
    tree_failures: HashMap<UnitId, String>,
    delays: HashMap<GroupId, u64>,
    panics: HashSet<GroupId>,
    fetched_groups: Mutex<Vec<GroupId>>,
    fetched_units: Mutex<Vec<UnitId>>,
    materialize_calls: AtomicUsize,
    generated_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockAnalysis {
    /// Groups A (csharp: a1, a2), B (csharp: b1), C (visualbasic: c1).
    ///
    /// A reports `d1` on a1, B reports `d2` on b1, C reports `d3` on c1.
    pub fn standard() -> Self {
        let snapshot = WorkspaceSnapshot::new(vec![
            Group::new("A", "App", "csharp")
                .with_unit("a1", "Program.cs")
                .with_unit("a2", "Startup.cs"),
            Group::new("B", "Lib", "csharp").with_unit("b1", "Util.cs"),
            Group::new("C", "Legacy", "visualbasic").with_unit("c1", "Module.vb"),
        ])
        .expect("standard snapshot is valid");

        let mut group_diagnostics = HashMap::new();
        group_diagnostics.insert(
            GroupId::new("A"),
            vec![Diagnostic::new("X1", Severity::Warning, "d1", "tree:a1")],
        );
        group_diagnostics.insert(
            GroupId::new("B"),
            vec![Diagnostic::new("X1", Severity::Warning, "d2", "tree:b1")],
        );
        group_diagnostics.insert(
            GroupId::new("C"),
            vec![Diagnostic::new("X1", Severity::Warning, "d3", "tree:c1")],
        );

        MockAnalysis {
            snapshot,
            group_diagnostics,
            generated: HashSet::new(),
            group_failures: HashMap::new(),
            unit_failures: HashMap::new(),
            generated_failures: HashMap::new(),
            tree_failures: HashMap::new(),
            delays: HashMap::new(),
            panics: HashSet::new(),
            fetched_groups: Mutex::new(Vec::new()),
            fetched_units: Mutex::new(Vec::new()),
            materialize_calls: AtomicUsize::new(0),
            generated_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_group_diagnostics(mut self, group: &str, diagnostics: Vec<Diagnostic>) -> Self {
        self.group_diagnostics.insert(GroupId::new(group), diagnostics);
        self
    }

    pub fn generated(mut self, unit: &str) -> Self {
        self.generated.insert(UnitId::new(unit));
        self
    }

    pub fn fail_group(mut self, group: &str, message: &str) -> Self {
        self.group_failures
            .insert(GroupId::new(group), message.to_string());
        self
    }

    pub fn fail_unit(mut self, unit: &str, message: &str) -> Self {
        self.unit_failures
            .insert(UnitId::new(unit), message.to_string());
        self
    }

    /// Make `is_generated` fail for `unit`.
    pub fn fail_generated(mut self, unit: &str, message: &str) -> Self {
        self.generated_failures
            .insert(UnitId::new(unit), message.to_string());
        self
    }

    pub fn fail_tree(mut self, unit: &str, message: &str) -> Self {
        self.tree_failures
            .insert(UnitId::new(unit), message.to_string());
        self
    }

    pub fn delay_group(mut self, group: &str, millis: u64) -> Self {
        self.delays.insert(GroupId::new(group), millis);
        self
    }

    pub fn panic_group(mut self, group: &str) -> Self {
        self.panics.insert(GroupId::new(group));
        self
    }

    pub fn snapshot(&self) -> &WorkspaceSnapshot {
        &self.snapshot
    }

    /// Groups whose fetch started, sorted by id.
    pub fn fetched_groups(&self) -> Vec<GroupId> {
        let mut groups = self.fetched_groups.lock().unwrap().clone();
        groups.sort();
        groups
    }

    /// Units whose fetch started, sorted by id.
    pub fn fetched_units(&self) -> Vec<UnitId> {
        let mut units = self.fetched_units.lock().unwrap().clone();
        units.sort();
        units
    }

    pub fn materialize_calls(&self) -> usize {
        self.materialize_calls.load(Ordering::SeqCst)
    }

    pub fn generated_calls(&self) -> usize {
        self.generated_calls.load(Ordering::SeqCst)
    }

    /// Highest number of group fetches observed running at once.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DiagnosticSource for MockAnalysis {
    async fn diagnostics_for_unit(
        &self,
        unit: &Unit,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, CollaboratorError> {
        self.fetched_units.lock().unwrap().push(unit.id.clone());
        if let Some(message) = self.unit_failures.get(&unit.id) {
            return Err(CollaboratorError::failed(message.clone()));
        }
        let tree = TreeId::new(format!("tree:{}", unit.id));
        Ok(self
            .group_diagnostics
            .get(&unit.group)
            .map(|all| {
                all.iter()
                    .filter(|d| d.tree.as_ref() == Some(&tree))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn diagnostics_for_group(
        &self,
        group: &Group,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Diagnostic>, CollaboratorError> {
        self.fetched_groups.lock().unwrap().push(group.id.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if let Some(millis) = self.delays.get(&group.id) {
            tokio::time::sleep(Duration::from_millis(*millis)).await;
        }
        if self.panics.contains(&group.id) {
            panic!("injected panic in group {}", group.id);
        }
        if let Some(message) = self.group_failures.get(&group.id) {
            return Err(CollaboratorError::failed(message.clone()));
        }
        Ok(self
            .group_diagnostics
            .get(&group.id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl UnitInspector for MockAnalysis {
    async fn is_generated(
        &self,
        unit: &Unit,
        _cancel: &CancellationToken,
    ) -> Result<bool, CollaboratorError> {
        self.generated_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.generated_failures.get(&unit.id) {
            return Err(CollaboratorError::failed(message.clone()));
        }
        Ok(self.generated.contains(&unit.id))
    }

    async fn materialize_tree(
        &self,
        unit: &Unit,
        _cancel: &CancellationToken,
    ) -> Result<TreeId, CollaboratorError> {
        self.materialize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.tree_failures.get(&unit.id) {
            return Err(CollaboratorError::failed(message.clone()));
        }
        Ok(TreeId::new(format!("tree:{}", unit.id)))
    }
}
