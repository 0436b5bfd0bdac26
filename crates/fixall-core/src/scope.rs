//! Aggregation scope and display title composition.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{GroupId, UnitId};
use crate::workspace::{Group, Unit};

// ============================================================================
// Scope
// ============================================================================

/// Breadth of one aggregation call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A single unit.
    Unit(UnitId),
    /// Every unit of a single group.
    Group(GroupId),
    /// Every group sharing the dialect of `trigger`.
    Workspace { trigger: GroupId },
}

impl Scope {
    /// The scope tag without its target.
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Unit(_) => ScopeKind::Unit,
            Scope::Group(_) => ScopeKind::Group,
            Scope::Workspace { .. } => ScopeKind::Workspace,
        }
    }

    /// The id the scope is anchored on (the triggering group for workspace).
    pub fn target(&self) -> &str {
        match self {
            Scope::Unit(unit) => unit.as_str(),
            Scope::Group(group) => group.as_str(),
            Scope::Workspace { trigger } => trigger.as_str(),
        }
    }

    /// Build a scope from its tag and target id.
    pub fn from_kind(kind: ScopeKind, target: impl Into<String>) -> Self {
        let target = target.into();
        match kind {
            ScopeKind::Unit => Scope::Unit(UnitId::new(target)),
            ScopeKind::Group => Scope::Group(GroupId::new(target)),
            ScopeKind::Workspace => Scope::Workspace {
                trigger: GroupId::new(target),
            },
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.target())
    }
}

/// Scope tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Unit,
    Group,
    Workspace,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Unit => write!(f, "unit"),
            ScopeKind::Group => write!(f, "group"),
            ScopeKind::Workspace => write!(f, "workspace"),
        }
    }
}

// ============================================================================
// Default Title
// ============================================================================

/// Compose the display title for fixing `rule_ids` across `scope`.
///
/// A single rule id is used verbatim; several are joined with `,`. The unit
/// and group scopes name their trigger; when it is not supplied the scope
/// target id stands in for the name.
///
/// | Scope     | Title                          |
/// |-----------|--------------------------------|
/// | unit      | `Fix all 'X1' in 'Program.cs'` |
/// | group     | `Fix all 'X1' in 'App'`        |
/// | workspace | `Fix all 'X1' in workspace`    |
pub fn default_title<S: AsRef<str>>(
    scope: &Scope,
    rule_ids: &[S],
    trigger_unit: Option<&Unit>,
    trigger_group: Option<&Group>,
) -> String {
    let subject = match rule_ids {
        [] => "Fix all".to_string(),
        ids => {
            let ids: Vec<&str> = ids.iter().map(|id| id.as_ref()).collect();
            format!("Fix all '{}'", ids.join(","))
        }
    };

    match scope {
        Scope::Unit(unit) => {
            let name = trigger_unit.map_or(unit.as_str(), |u| u.name.as_str());
            format!("{} in '{}'", subject, name)
        }
        Scope::Group(group) => {
            let name = trigger_group.map_or(group.as_str(), |g| g.name.as_str());
            format!("{} in '{}'", subject, name)
        }
        Scope::Workspace { .. } => format!("{} in workspace", subject),
    }
}

// ============================================================================
// Tests
// ============================================================================
