//! Identifier and finding types shared across the workspace model, the
//! engine, and the output module.
//!
//! Identifiers are opaque string newtypes. They carry no meaning beyond
//! equality and ordering; the analyzers that produce them decide their
//! format.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier.
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }
    };
}

string_id!(
    /// Stable key of a logical source unit (one file within one compilation).
    UnitId
);

string_id!(
    /// Stable key of a group of units sharing one analysis configuration.
    GroupId
);

string_id!(
    /// Identity of a unit's parsed representation at snapshot time.
    ///
    /// Diagnostics reference a tree, never a unit directly. Tree identities
    /// are snapshot-specific and must not be carried across snapshots.
    TreeId
);

string_id!(
    /// Analysis language of a group (e.g. `csharp`, `visualbasic`).
    Dialect
);

// ============================================================================
// Severity
// ============================================================================

/// Severity of a diagnostic, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hidden,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Hidden => write!(f, "hidden"),
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

// ============================================================================
// Diagnostic
// ============================================================================

/// An immutable analysis finding.
///
/// `tree` is the only attribution key: a diagnostic without a tree, or whose
/// tree does not belong to a unit in play, never reaches an
/// [`AggregationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Rule identifier (e.g. `CS0168`).
    pub id: String,
    /// Reported severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Parsed representation the finding was reported against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<TreeId>,
}

impl Diagnostic {
    /// Create a diagnostic attributed to `tree`.
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        tree: impl Into<TreeId>,
    ) -> Self {
        Diagnostic {
            id: id.into(),
            severity,
            message: message.into(),
            tree: Some(tree.into()),
        }
    }

    /// Create a diagnostic with no tree (e.g. a compilation-level finding).
    pub fn unattributed(
        id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            id: id.into(),
            severity,
            message: message.into(),
            tree: None,
        }
    }
}

// ============================================================================
// Aggregation Result
// ============================================================================

/// Diagnostics bucketed by the unit that owns them.
///
/// Every bucket is non-empty. Within a bucket, diagnostics keep the order in
/// which the collector discovered them. Iteration order across units is
/// unspecified; sort by [`UnitId`] when a stable order is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationResult {
    buckets: HashMap<UnitId, Vec<Diagnostic>>,
}

impl AggregationResult {
    /// Create an empty result.
    pub fn new() -> Self {
        AggregationResult::default()
    }

    /// Build a result from buckets, discarding empty ones.
    pub fn from_buckets(buckets: impl IntoIterator<Item = (UnitId, Vec<Diagnostic>)>) -> Self {
        AggregationResult {
            buckets: buckets
                .into_iter()
                .filter(|(_, diagnostics)| !diagnostics.is_empty())
                .collect(),
        }
    }

    /// Diagnostics attributed to `unit`, if any.
    pub fn get(&self, unit: &UnitId) -> Option<&[Diagnostic]> {
        self.buckets.get(unit).map(Vec::as_slice)
    }

    /// Number of units with at least one diagnostic.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when no unit has diagnostics.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of diagnostics across all units.
    pub fn diagnostic_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Iterate over `(unit, diagnostics)` in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&UnitId, &[Diagnostic])> {
        self.buckets.iter().map(|(unit, d)| (unit, d.as_slice()))
    }

    /// Units present in the result, sorted by id.
    pub fn units(&self) -> Vec<&UnitId> {
        let mut units: Vec<&UnitId> = self.buckets.keys().collect();
        units.sort();
        units
    }

    /// Order-insensitive view of the result as `(unit, diagnostic)` pairs.
    pub fn pairs(&self) -> BTreeSet<(UnitId, Diagnostic)> {
        self.buckets
            .iter()
            .flat_map(|(unit, diagnostics)| diagnostics.iter().map(move |d| (unit.clone(), d.clone())))
            .collect()
    }

    /// Consume the result, returning the underlying map.
    pub fn into_map(self) -> HashMap<UnitId, Vec<Diagnostic>> {
        self.buckets
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod identifiers {
        use super::*;

        #[test]
        fn ids_display_their_value() {
            assert_eq!(UnitId::new("a1").to_string(), "a1");
            assert_eq!(GroupId::from("A").as_str(), "A");
        }

        #[test]
        fn ids_serialize_transparently() {
            let json = serde_json::to_string(&TreeId::new("tree:a1")).unwrap();
            assert_eq!(json, "\"tree:a1\"");
        }
    }

    mod diagnostics {
        use super::*;

        #[test]
        fn severity_orders_by_weight() {
            assert!(Severity::Error > Severity::Warning);
            assert!(Severity::Info > Severity::Hidden);
        }

        #[test]
        fn unattributed_diagnostic_omits_tree_in_json() {
            let d = Diagnostic::unattributed("CS8019", Severity::Hidden, "unused using");
            let json = serde_json::to_value(&d).unwrap();
            assert!(json.get("tree").is_none());
            assert_eq!(json["severity"], "hidden");
        }

        #[test]
        fn diagnostic_deserializes_without_tree() {
            let d: Diagnostic =
                serde_json::from_str(r#"{"id":"X1","severity":"warning","message":"m"}"#).unwrap();
            assert_eq!(d.tree, None);
        }
    }

    mod aggregation_result {
        use super::*;

        #[test]
        fn from_buckets_drops_empty_units() {
            let result = AggregationResult::from_buckets(vec![
                (UnitId::new("a1"), vec![]),
                (
                    UnitId::new("a2"),
                    vec![Diagnostic::new("X1", Severity::Warning, "m", "t2")],
                ),
            ]);
            assert_eq!(result.len(), 1);
            assert!(result.get(&UnitId::new("a1")).is_none());
            assert_eq!(result.diagnostic_count(), 1);
        }

        #[test]
        fn units_are_sorted() {
            let d = Diagnostic::new("X1", Severity::Warning, "m", "t");
            let result = AggregationResult::from_buckets(vec![
                (UnitId::new("b"), vec![d.clone()]),
                (UnitId::new("a"), vec![d]),
            ]);
            let units: Vec<&str> = result.units().into_iter().map(UnitId::as_str).collect();
            assert_eq!(units, vec!["a", "b"]);
        }
    }
}
