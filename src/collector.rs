//! Scope diagnostic collector.
//!
//! Runs the collection strategy matching the scope:
//! - unit: skip generated units, otherwise one `diagnostics_for_unit` call
//! - group: one `diagnostics_for_group` call
//! - workspace: one concurrent `diagnostics_for_group` task per group
//!   sharing the trigger group's dialect, joined before returning
//!
//! Only the workspace strategy reports progress. Each fan-out task owns a
//! [`CompletionGuard`], so every candidate group produces exactly one
//! completion whether its fetch succeeds, fails, panics, or never starts.
//!
//! Fan-out failures do not cancel sibling fetches. After the join,
//! cancellation wins over failures, and among failures the first in
//! workspace order is returned.
//!
//! Dropping the collect future aborts every fan-out task still running or
//! waiting for a fetch slot.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::join_all;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use fixall_core::adapter::{run_cancellable, DiagnosticSource};
use fixall_core::config::AggregationOptions;
use fixall_core::error::{FixAllError, Operation};
use fixall_core::progress::{CompletionGuard, ProgressReporter};
use fixall_core::scope::Scope;
use fixall_core::types::{Diagnostic, GroupId, UnitId};
use fixall_core::workspace::{Group, WorkspaceSnapshot};

use crate::generated::GeneratedUnitFilter;

/// Outcome of one spawned group fetch.
type FetchOutcome = Result<Result<Vec<Diagnostic>, FixAllError>, JoinError>;

/// Flat collector output handed to the partitioner.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Diagnostics in discovery order (workspace order across groups).
    pub diagnostics: Vec<Diagnostic>,
    /// Groups whose units may own the diagnostics.
    pub groups_in_play: Vec<Arc<Group>>,
}

impl Collected {
    fn empty() -> Self {
        Collected::default()
    }
}

/// Executes the scope-appropriate collection strategy.
pub struct ScopeCollector<'a> {
    snapshot: &'a WorkspaceSnapshot,
    source: &'a Arc<dyn DiagnosticSource>,
    options: AggregationOptions,
}

impl<'a> ScopeCollector<'a> {
    pub fn new(
        snapshot: &'a WorkspaceSnapshot,
        source: &'a Arc<dyn DiagnosticSource>,
        options: AggregationOptions,
    ) -> Self {
        ScopeCollector {
            snapshot,
            source,
            options,
        }
    }

    /// Collect the flat diagnostics for `scope`.
    pub async fn collect(
        &self,
        scope: &Scope,
        filter: &GeneratedUnitFilter,
        progress: &Arc<dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<Collected, FixAllError> {
        match scope {
            Scope::Unit(unit) => self.collect_unit(unit, filter, cancel).await,
            Scope::Group(group) => self.collect_group(group, cancel).await,
            Scope::Workspace { trigger } => self.collect_workspace(trigger, progress, cancel).await,
        }
    }

    async fn collect_unit(
        &self,
        unit_id: &UnitId,
        filter: &GeneratedUnitFilter,
        cancel: &CancellationToken,
    ) -> Result<Collected, FixAllError> {
        let unit = self
            .snapshot
            .unit(unit_id)
            .ok_or_else(|| FixAllError::UnknownUnit {
                unit: unit_id.clone(),
            })?;
        let group = self
            .snapshot
            .group_of(unit_id)
            .ok_or_else(|| FixAllError::internal(format!("unit {} has no group", unit_id)))?;

        if filter.is_excluded(unit).await? {
            return Ok(Collected::empty());
        }

        let diagnostics = run_cancellable(
            cancel,
            Operation::FetchForUnit,
            &unit.id,
            self.source.diagnostics_for_unit(unit, cancel),
        )
        .await?;

        Ok(Collected {
            diagnostics,
            groups_in_play: vec![Arc::clone(group)],
        })
    }

    async fn collect_group(
        &self,
        group_id: &GroupId,
        cancel: &CancellationToken,
    ) -> Result<Collected, FixAllError> {
        let group = self
            .snapshot
            .group(group_id)
            .ok_or_else(|| FixAllError::UnknownGroup {
                group: group_id.clone(),
            })?;

        let diagnostics = fetch_group(self.source.as_ref(), group, cancel).await?;

        Ok(Collected {
            diagnostics,
            groups_in_play: vec![Arc::clone(group)],
        })
    }

    async fn collect_workspace(
        &self,
        trigger: &GroupId,
        progress: &Arc<dyn ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<Collected, FixAllError> {
        let trigger_group = self
            .snapshot
            .group(trigger)
            .ok_or_else(|| FixAllError::UnknownGroup {
                group: trigger.clone(),
            })?;
        let candidates = self.snapshot.groups_with_dialect(&trigger_group.dialect);

        tracing::debug!(
            trigger = %trigger,
            dialect = %trigger_group.dialect,
            candidates = candidates.len(),
            "fanning out group fetches"
        );
        progress.expected_items(candidates.len());

        let limiter = self
            .options
            .max_parallel_fetches
            .map(|max| Arc::new(Semaphore::new(max.get())));

        let tasks: Vec<_> = candidates
            .iter()
            .map(|group| {
                // Armed before spawning: an unpolled task still reports on drop.
                let completion = CompletionGuard::new(Arc::clone(progress));
                let group = Arc::clone(group);
                let source = Arc::clone(self.source);
                let limiter = limiter.clone();
                let cancel = cancel.clone();

                FetchTask(tokio::spawn(async move {
                    let _completion = completion;
                    let _permit = match limiter {
                        Some(limiter) => Some(acquire_permit(limiter, &cancel).await?),
                        None => None,
                    };
                    let diagnostics = fetch_group(source.as_ref(), &group, &cancel).await?;
                    tracing::debug!(
                        group = %group.id,
                        diagnostics = diagnostics.len(),
                        "group fetch completed"
                    );
                    Ok::<_, FixAllError>(diagnostics)
                }))
            })
            .collect();

        let outcomes = join_all(tasks).await;
        let diagnostics = merge_outcomes(&candidates, outcomes, cancel)?;

        Ok(Collected {
            diagnostics,
            groups_in_play: candidates,
        })
    }
}

/// Spawned group fetch that is aborted when its handle is dropped.
struct FetchTask(JoinHandle<Result<Vec<Diagnostic>, FixAllError>>);

impl Future for FetchTask {
    type Output = FetchOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl Drop for FetchTask {
    fn drop(&mut self) {
        // No-op once the task has finished.
        self.0.abort();
    }
}

async fn fetch_group(
    source: &dyn DiagnosticSource,
    group: &Group,
    cancel: &CancellationToken,
) -> Result<Vec<Diagnostic>, FixAllError> {
    run_cancellable(
        cancel,
        Operation::FetchForGroup,
        &group.id,
        source.diagnostics_for_group(group, cancel),
    )
    .await
}

async fn acquire_permit(
    limiter: Arc<Semaphore>,
    cancel: &CancellationToken,
) -> Result<OwnedSemaphorePermit, FixAllError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FixAllError::Cancelled),
        permit = limiter.acquire_owned() => {
            permit.map_err(|_| FixAllError::internal("fetch limiter closed"))
        }
    }
}

/// Concatenate successful fetches in workspace order, or pick the error.
fn merge_outcomes(
    candidates: &[Arc<Group>],
    outcomes: Vec<FetchOutcome>,
    cancel: &CancellationToken,
) -> Result<Vec<Diagnostic>, FixAllError> {
    let mut diagnostics = Vec::new();
    let mut cancelled = cancel.is_cancelled();
    let mut first_failure: Option<FixAllError> = None;

    for (group, outcome) in candidates.iter().zip(outcomes) {
        let failure = match outcome {
            Ok(Ok(found)) => {
                diagnostics.extend(found);
                continue;
            }
            Ok(Err(FixAllError::Cancelled)) => {
                cancelled = true;
                continue;
            }
            Err(join_err) if join_err.is_cancelled() => {
                cancelled = true;
                continue;
            }
            Ok(Err(err)) => err,
            Err(join_err) => FixAllError::TaskPanicked {
                group: group.id.clone(),
                message: join_err.to_string(),
            },
        };

        tracing::warn!(group = %group.id, error = %failure, "group fetch failed");
        if first_failure.is_none() {
            first_failure = Some(failure);
        }
    }

    if cancelled {
        return Err(FixAllError::Cancelled);
    }
    match first_failure {
        Some(err) => Err(err),
        None => Ok(diagnostics),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use fixall_core::progress::{NoProgress, ProgressTracker};

    use crate::test_helpers::MockAnalysis;

    struct Harness {
        analysis: Arc<MockAnalysis>,
        source: Arc<dyn DiagnosticSource>,
    }

    impl Harness {
        fn new(analysis: MockAnalysis) -> Self {
            let analysis = Arc::new(analysis);
            Harness {
                source: analysis.clone(),
                analysis,
            }
        }

        async fn collect(
            &self,
            scope: Scope,
            options: AggregationOptions,
            progress: Arc<dyn ProgressReporter>,
            cancel: &CancellationToken,
        ) -> Result<Collected, FixAllError> {
            let filter = GeneratedUnitFilter::new(self.analysis.clone(), cancel.clone());
            ScopeCollector::new(self.analysis.snapshot(), &self.source, options)
                .collect(&scope, &filter, &progress, cancel)
                .await
        }
    }

    fn ids(collected: &Collected) -> Vec<String> {
        collected
            .groups_in_play
            .iter()
            .map(|g| g.id.to_string())
            .collect()
    }

    mod unit_scope {
        use super::*;

        #[tokio::test]
        async fn fetches_one_unit_with_its_group_in_play() {
            let harness = Harness::new(MockAnalysis::standard());
            let cancel = CancellationToken::new();
            let collected = harness
                .collect(
                    Scope::Unit("a1".into()),
                    AggregationOptions::default(),
                    Arc::new(NoProgress),
                    &cancel,
                )
                .await
                .unwrap();

            assert_eq!(collected.diagnostics.len(), 1);
            assert_eq!(ids(&collected), vec!["A"]);
            assert_eq!(harness.analysis.fetched_units(), vec![UnitId::new("a1")]);
            assert!(harness.analysis.fetched_groups().is_empty());
        }

        #[tokio::test]
        async fn generated_unit_is_never_fetched() {
            let harness = Harness::new(MockAnalysis::standard().generated("a1"));
            let tracker = Arc::new(ProgressTracker::new());
            let cancel = CancellationToken::new();
            let collected = harness
                .collect(
                    Scope::Unit("a1".into()),
                    AggregationOptions::default(),
                    tracker.clone(),
                    &cancel,
                )
                .await
                .unwrap();

            assert!(collected.diagnostics.is_empty());
            assert!(collected.groups_in_play.is_empty());
            assert!(harness.analysis.fetched_units().is_empty());
            assert_eq!(tracker.snapshot().expected, None);
            assert_eq!(tracker.snapshot().completed, 0);
        }

        #[tokio::test]
        async fn unknown_unit_is_a_resolution_error() {
            let harness = Harness::new(MockAnalysis::standard());
            let err = harness
                .collect(
                    Scope::Unit("nope".into()),
                    AggregationOptions::default(),
                    Arc::new(NoProgress),
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();
            assert_eq!(err, FixAllError::UnknownUnit { unit: "nope".into() });
        }
    }

    mod group_scope {
        use super::*;

        #[tokio::test]
        async fn fetches_one_group() {
            let harness = Harness::new(MockAnalysis::standard());
            let collected = harness
                .collect(
                    Scope::Group("B".into()),
                    AggregationOptions::default(),
                    Arc::new(NoProgress),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            assert_eq!(ids(&collected), vec!["B"]);
            assert_eq!(harness.analysis.fetched_groups(), vec![GroupId::new("B")]);
        }

        #[tokio::test]
        async fn failure_surfaces_immediately() {
            let harness = Harness::new(MockAnalysis::standard().fail_group("B", "analyzer crashed"));
            let err = harness
                .collect(
                    Scope::Group("B".into()),
                    AggregationOptions::default(),
                    Arc::new(NoProgress),
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "fetch_for_group failed for B: analyzer crashed");
        }
    }

    mod workspace_scope {
        use super::*;

        #[tokio::test]
        async fn fans_out_over_same_dialect_groups_only() {
            let harness = Harness::new(MockAnalysis::standard());
            let tracker = Arc::new(ProgressTracker::new());
            let collected = harness
                .collect(
                    Scope::Workspace {
                        trigger: "A".into(),
                    },
                    AggregationOptions::default(),
                    tracker.clone(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            assert_eq!(ids(&collected), vec!["A", "B"]);
            assert_eq!(
                harness.analysis.fetched_groups(),
                vec![GroupId::new("A"), GroupId::new("B")]
            );
            assert_eq!(collected.diagnostics.len(), 2);
            assert_eq!(tracker.snapshot().expected, Some(2));
            assert!(tracker.is_complete());
        }

        #[tokio::test]
        async fn concatenates_in_workspace_order_regardless_of_completion() {
            let harness = Harness::new(MockAnalysis::standard().delay_group("A", 50));
            let collected = harness
                .collect(
                    Scope::Workspace {
                        trigger: "B".into(),
                    },
                    AggregationOptions::default(),
                    Arc::new(NoProgress),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            let messages: Vec<&str> = collected
                .diagnostics
                .iter()
                .map(|d| d.message.as_str())
                .collect();
            assert_eq!(messages, vec!["d1", "d2"]);
        }

        #[tokio::test]
        async fn failure_waits_for_siblings_and_keeps_progress_whole() {
            let harness = Harness::new(
                MockAnalysis::standard()
                    .fail_group("A", "analyzer crashed")
                    .delay_group("B", 30),
            );
            let tracker = Arc::new(ProgressTracker::new());
            let err = harness
                .collect(
                    Scope::Workspace {
                        trigger: "A".into(),
                    },
                    AggregationOptions::default(),
                    tracker.clone(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();

            assert_eq!(err.to_string(), "fetch_for_group failed for A: analyzer crashed");
            assert!(tracker.is_complete());
            assert_eq!(
                harness.analysis.fetched_groups(),
                vec![GroupId::new("A"), GroupId::new("B")]
            );
        }

        #[tokio::test]
        async fn first_failure_in_workspace_order_wins() {
            let harness = Harness::new(
                MockAnalysis::standard()
                    .fail_group("A", "first")
                    .fail_group("B", "second")
                    .delay_group("A", 40),
            );
            let err = harness
                .collect(
                    Scope::Workspace {
                        trigger: "A".into(),
                    },
                    AggregationOptions::default(),
                    Arc::new(NoProgress),
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "fetch_for_group failed for A: first");
        }

        #[tokio::test]
        async fn panicking_fetch_is_reported_and_counted() {
            let harness = Harness::new(MockAnalysis::standard().panic_group("B"));
            let tracker = Arc::new(ProgressTracker::new());
            let err = harness
                .collect(
                    Scope::Workspace {
                        trigger: "A".into(),
                    },
                    AggregationOptions::default(),
                    tracker.clone(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();

            assert!(matches!(err, FixAllError::TaskPanicked { ref group, .. } if group.as_str() == "B"));
            assert!(tracker.is_complete());
        }

        #[tokio::test]
        async fn cancellation_mid_fan_out_returns_cancelled() {
            let harness = Harness::new(
                MockAnalysis::standard()
                    .delay_group("A", 5_000)
                    .delay_group("B", 5_000),
            );
            let tracker = Arc::new(ProgressTracker::new());
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                trigger.cancel();
            });

            let err = harness
                .collect(
                    Scope::Workspace {
                        trigger: "A".into(),
                    },
                    AggregationOptions::default(),
                    tracker.clone(),
                    &cancel,
                )
                .await
                .unwrap_err();

            assert!(err.is_cancelled());
            assert!(tracker.is_complete());
        }

        #[tokio::test]
        async fn limited_parallelism_still_fetches_everything() {
            let harness = Harness::new(
                MockAnalysis::standard()
                    .delay_group("A", 10)
                    .delay_group("B", 10),
            );
            let tracker = Arc::new(ProgressTracker::new());
            let collected = harness
                .collect(
                    Scope::Workspace {
                        trigger: "A".into(),
                    },
                    AggregationOptions::default().with_max_parallel_fetches(1),
                    tracker.clone(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            assert_eq!(collected.diagnostics.len(), 2);
            assert!(tracker.is_complete());
            assert!(harness.analysis.max_concurrent_fetches() <= 1);
        }

        #[tokio::test]
        async fn dropped_collect_stops_pending_fetches() {
            let harness = Harness::new(
                MockAnalysis::standard()
                    .delay_group("A", 100)
                    .delay_group("B", 100),
            );
            let tracker = Arc::new(ProgressTracker::new());
            let cancel = CancellationToken::new();

            let outcome = tokio::time::timeout(
                Duration::from_millis(20),
                harness.collect(
                    Scope::Workspace {
                        trigger: "A".into(),
                    },
                    AggregationOptions::default().with_max_parallel_fetches(1),
                    tracker.clone(),
                    &cancel,
                ),
            )
            .await;
            assert!(outcome.is_err(), "collect should still be running");
            assert_eq!(harness.analysis.fetched_groups(), vec![GroupId::new("A")]);

            tokio::time::sleep(Duration::from_millis(300)).await;

            // B was waiting for the only fetch slot and never starts.
            assert_eq!(harness.analysis.fetched_groups(), vec![GroupId::new("A")]);
            assert_eq!(harness.analysis.max_concurrent_fetches(), 1);
            assert!(tracker.is_complete());
        }

        #[tokio::test]
        async fn unknown_trigger_is_a_resolution_error() {
            let harness = Harness::new(MockAnalysis::standard());
            let tracker = Arc::new(ProgressTracker::new());
            let err = harness
                .collect(
                    Scope::Workspace {
                        trigger: "Z".into(),
                    },
                    AggregationOptions::default(),
                    tracker.clone(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();
            assert_eq!(err, FixAllError::UnknownGroup { group: "Z".into() });
            assert_eq!(tracker.snapshot().expected, None);
        }
    }
}
