//! Generated-unit filter.
//!
//! One filter instance lives for one aggregation call and is shared by the
//! collector (unit scope pre-check) and the partitioner (per-bucket check),
//! so every code path applies the same exclusion policy and each unit is
//! asked about at most once per call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use fixall_core::adapter::{run_cancellable, UnitInspector};
use fixall_core::error::{FixAllError, Operation};
use fixall_core::types::UnitId;
use fixall_core::workspace::Unit;

/// Per-call exclusion predicate with memoized verdicts.
pub struct GeneratedUnitFilter {
    inspector: Arc<dyn UnitInspector>,
    cancel: CancellationToken,
    verdicts: Mutex<HashMap<UnitId, bool>>,
}

impl GeneratedUnitFilter {
    /// Create a filter bound to one call's cancellation token.
    pub fn new(inspector: Arc<dyn UnitInspector>, cancel: CancellationToken) -> Self {
        GeneratedUnitFilter {
            inspector,
            cancel,
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    /// True when `unit` must not be fixed.
    pub async fn is_excluded(&self, unit: &Unit) -> Result<bool, FixAllError> {
        let cached = self
            .verdicts
            .lock()
            .expect("verdict cache poisoned")
            .get(&unit.id)
            .copied();
        if let Some(verdict) = cached {
            return Ok(verdict);
        }

        let generated = run_cancellable(
            &self.cancel,
            Operation::IsGenerated,
            &unit.id,
            self.inspector.is_generated(unit, &self.cancel),
        )
        .await?;

        if generated {
            tracing::debug!(unit = %unit.id, "excluding generated unit");
        }
        self.verdicts
            .lock()
            .expect("verdict cache poisoned")
            .insert(unit.id.clone(), generated);
        Ok(generated)
    }
}

// ============================================================================
// Tests
// ============================================================================
