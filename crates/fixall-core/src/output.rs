//! JSON output types and serialization for CLI responses.
//!
//! ## Design Principles
//!
//! 1. **Status first:** Every response has `status` as first field
//! 2. **Deterministic:** Same input -> same output. The engine leaves unit
//!    order unspecified, so responses sort units by id
//! 3. **Versioned:** Schema version in response enables forward compatibility

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{FixAllError, OutputErrorCode};
use crate::scope::{Scope, ScopeKind};
use crate::types::{AggregationResult, Diagnostic};
use crate::workspace::WorkspaceSnapshot;

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Aggregate Response
// ============================================================================

/// Scope echo in responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeInfo {
    /// `unit`, `group`, or `workspace`.
    pub kind: ScopeKind,
    /// Unit id, group id, or triggering group id.
    pub target: String,
}

impl From<&Scope> for ScopeInfo {
    fn from(scope: &Scope) -> Self {
        ScopeInfo {
            kind: scope.kind(),
            target: scope.target().to_string(),
        }
    }
}

/// Diagnostics owned by one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDiagnostics {
    /// Unit id.
    pub unit: String,
    /// Unit display name (empty if the unit is unknown to the snapshot).
    pub name: String,
    /// Owning group id.
    pub group: String,
    /// Diagnostics in discovery order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Counts for an aggregate response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    /// Units with at least one diagnostic.
    pub units: usize,
    /// Total diagnostics.
    pub diagnostics: usize,
}

/// Response for `fixall aggregate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResponse {
    /// Always `ok`.
    pub status: String,
    /// Schema version.
    pub schema_version: String,
    /// The scope that was aggregated.
    pub scope: ScopeInfo,
    /// Display title for the fix action.
    pub title: String,
    /// Per-unit diagnostics, sorted by unit id.
    pub units: Vec<UnitDiagnostics>,
    /// Counts.
    pub summary: Summary,
}

impl AggregateResponse {
    /// Build a response from an aggregation result.
    pub fn new(
        scope: &Scope,
        title: impl Into<String>,
        snapshot: &WorkspaceSnapshot,
        result: &AggregationResult,
    ) -> Self {
        let units = result
            .units()
            .into_iter()
            .map(|unit_id| {
                let unit = snapshot.unit(unit_id);
                UnitDiagnostics {
                    unit: unit_id.to_string(),
                    name: unit.map(|u| u.name.clone()).unwrap_or_default(),
                    group: unit.map(|u| u.group.to_string()).unwrap_or_default(),
                    diagnostics: result.get(unit_id).map(<[_]>::to_vec).unwrap_or_default(),
                }
            })
            .collect();

        AggregateResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            scope: ScopeInfo::from(scope),
            title: title.into(),
            units,
            summary: Summary {
                units: result.len(),
                diagnostics: result.diagnostic_count(),
            },
        }
    }
}

/// Response for `fixall title`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleResponse {
    /// Always `ok`.
    pub status: String,
    /// Schema version.
    pub schema_version: String,
    /// The scope the title describes.
    pub scope: ScopeInfo,
    /// Composed title.
    pub title: String,
}

impl TitleResponse {
    /// Build a title response.
    pub fn new(scope: &Scope, title: impl Into<String>) -> Self {
        TitleResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            scope: ScopeInfo::from(scope),
            title: title.into(),
        }
    }
}

// ============================================================================
// Error Response
// ============================================================================

/// Error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
}

impl ErrorInfo {
    /// Create from a FixAllError.
    pub fn from_error(err: &FixAllError) -> Self {
        ErrorInfo {
            code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
        }
    }
}

/// Error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `error`.
    pub status: String,
    /// Schema version.
    pub schema_version: String,
    /// Error details.
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Create from a FixAllError.
    pub fn from_error(err: &FixAllError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Severity, UnitId};
    use crate::workspace::Group;

    fn snapshot() -> WorkspaceSnapshot {
        WorkspaceSnapshot::new(vec![Group::new("A", "App", "csharp")
            .with_unit("a2", "Startup.cs")
            .with_unit("a1", "Program.cs")])
        .unwrap()
    }

    #[test]
    fn aggregate_response_sorts_units_and_counts() {
        let result = AggregationResult::from_buckets(vec![
            (
                UnitId::new("a2"),
                vec![Diagnostic::new("X1", Severity::Warning, "second", "tree:a2")],
            ),
            (
                UnitId::new("a1"),
                vec![
                    Diagnostic::new("X1", Severity::Warning, "first", "tree:a1"),
                    Diagnostic::new("X2", Severity::Error, "other", "tree:a1"),
                ],
            ),
        ]);
        let scope = Scope::Group("A".into());
        let response = AggregateResponse::new(&scope, "Fix all 'X1' in 'App'", &snapshot(), &result);

        assert_eq!(response.units[0].unit, "a1");
        assert_eq!(response.units[0].name, "Program.cs");
        assert_eq!(response.units[1].group, "A");
        assert_eq!(
            response.summary,
            Summary {
                units: 2,
                diagnostics: 3
            }
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["scope"]["kind"], "group");
        assert_eq!(json["units"][0]["diagnostics"][1]["id"], "X2");
    }

    #[test]
    fn error_response_carries_code() {
        let response = ErrorResponse::from_error(&FixAllError::Cancelled);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["code"], 5);
        assert_eq!(json["error"]["message"], "aggregation cancelled");
    }

    #[test]
    fn emit_writes_pretty_json_line() {
        let response = TitleResponse::new(&Scope::Unit("a1".into()), "Fix all");
        let mut buf = Vec::new();
        emit_response(&response, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\"title\": \"Fix all\""));
    }
}
