//! Progress reporting for workspace fan-out.
//!
//! The collector declares how many group fetches it will run, then signals
//! one completion per fetch whether the fetch succeeded, failed, or
//! panicked. [`CompletionGuard`] provides that guarantee by signalling on
//! drop.
//!
//! Contract for one aggregation call:
//! - `expected_items(n)` is called at most once, before any completion
//! - `item_completed()` may be called concurrently from many tasks
//! - the number of completions equals `n`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Reporter Trait
// ============================================================================

/// Side channel driven by the collector.
pub trait ProgressReporter: Send + Sync {
    /// Declare the number of items the call will complete.
    fn expected_items(&self, count: usize);

    /// Signal that one item finished.
    fn item_completed(&self);
}

/// Reporter that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn expected_items(&self, _count: usize) {}

    fn item_completed(&self) {}
}

// ============================================================================
// Tracker
// ============================================================================

/// Point-in-time view of a [`ProgressTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Declared item count, if declared.
    pub expected: Option<usize>,
    /// Completions so far.
    pub completed: usize,
}

/// `expected` value before any declaration.
const UNDECLARED: usize = usize::MAX;

/// Counting reporter, safe under concurrent declaration and completion.
#[derive(Debug)]
pub struct ProgressTracker {
    expected: AtomicUsize,
    completed: AtomicUsize,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        ProgressTracker {
            expected: AtomicUsize::new(UNDECLARED),
            completed: AtomicUsize::new(0),
        }
    }
}

impl ProgressTracker {
    /// Create a tracker with nothing declared.
    pub fn new() -> Self {
        ProgressTracker::default()
    }

    /// Current counters.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let completed = self.completed.load(Ordering::Acquire);
        let expected = match self.expected.load(Ordering::Acquire) {
            UNDECLARED => None,
            count => Some(count),
        };
        ProgressSnapshot {
            expected,
            completed,
        }
    }

    /// True when a count was declared and every item completed.
    pub fn is_complete(&self) -> bool {
        let snapshot = self.snapshot();
        snapshot.expected == Some(snapshot.completed)
    }
}

impl ProgressReporter for ProgressTracker {
    fn expected_items(&self, count: usize) {
        // Only the first declaration lands, even when callers race.
        let declared = self.expected.compare_exchange(
            UNDECLARED,
            count.min(UNDECLARED - 1),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        debug_assert!(declared.is_ok(), "expected_items declared twice");
        if let Err(existing) = declared {
            tracing::warn!(
                count,
                existing,
                "ignoring second expected_items declaration"
            );
        }
    }

    fn item_completed(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }
}

/// Tracker that also logs each completion.
#[derive(Debug)]
pub struct TracingProgress {
    label: String,
    tracker: ProgressTracker,
}

impl TracingProgress {
    /// Create a logging tracker; `label` names the operation in log events.
    pub fn new(label: impl Into<String>) -> Self {
        TracingProgress {
            label: label.into(),
            tracker: ProgressTracker::new(),
        }
    }

    /// Current counters.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }
}

impl ProgressReporter for TracingProgress {
    fn expected_items(&self, count: usize) {
        self.tracker.expected_items(count);
        tracing::info!(label = %self.label, expected = count, "progress started");
    }

    fn item_completed(&self) {
        self.tracker.item_completed();
        let snapshot = self.tracker.snapshot();
        tracing::info!(
            label = %self.label,
            completed = snapshot.completed,
            expected = snapshot.expected.unwrap_or(0),
            "progress"
        );
    }
}

// ============================================================================
// Completion Guard
// ============================================================================

/// Signals exactly one `item_completed()` when dropped.
///
/// Create one at the start of each fan-out task so the completion is
/// reported on every exit path, including early returns and panics.
pub struct CompletionGuard {
    reporter: Arc<dyn ProgressReporter>,
}

impl CompletionGuard {
    /// Arm a guard for one item.
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        CompletionGuard { reporter }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.reporter.item_completed();
    }
}

// ============================================================================
// Tests
// ============================================================================
