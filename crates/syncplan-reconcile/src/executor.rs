//! Plan execution against a pluggable transport.

use std::collections::BTreeMap;

use serde::Serialize;

use syncplan_core::{Entry, EntryPath};

use crate::error::TransportError;
use crate::plan::{PlanAction, ReconciliationPlan};

/// Carries out individual plan actions on the target.
///
/// An `Ok` return means the action is durable at the target; the executor
/// reports it as settled only then.
pub trait Transport {
    /// Apply one action.
    fn apply(&mut self, action: &PlanAction) -> Result<(), TransportError>;
}

/// A failed action and the transport's message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAction {
    pub path: EntryPath,
    pub message: String,
}

/// A confirmed change to the last synchronized state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorUpdate {
    pub path: EntryPath,
    /// The new prior entry, or `None` when the path no longer exists.
    pub entry: Option<Entry>,
}

/// Outcome of executing a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    /// Paths applied successfully, in order.
    pub applied: Vec<EntryPath>,
    /// Actions the transport rejected.
    pub failed: Vec<FailedAction>,
    /// Actions not attempted because a prerequisite failed.
    pub halted: Vec<EntryPath>,
    /// Skipped or conflicted actions.
    pub not_applicable: Vec<EntryPath>,
    settled: Vec<PriorUpdate>,
}

impl ExecutionReport {
    /// Prior-state updates for every applied action.
    pub fn settled(&self) -> &[PriorUpdate] {
        &self.settled
    }

    /// Whether every applicable action succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.halted.is_empty()
    }

    /// Fold the settled updates into a prior-state map.
    pub fn settle_into(&self, prior: &mut BTreeMap<EntryPath, Entry>) {
        for update in &self.settled {
            match &update.entry {
                Some(entry) => {
                    prior.insert(update.path.clone(), entry.clone());
                }
                None => {
                    prior.remove(&update.path);
                }
            }
        }
    }
}

/// Runs the applicable actions of a plan in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanExecutor;

impl PlanExecutor {
    /// Create a new executor.
    pub fn new() -> Self {
        Self
    }

    /// Execute `plan` through `transport`.
    ///
    /// A failure halts every action that transitively depends on the failed
    /// one; independent actions still run.
    pub fn execute<T>(&self, plan: &ReconciliationPlan, transport: &mut T) -> ExecutionReport
    where
        T: Transport + ?Sized,
    {
        let mut report = ExecutionReport::default();
        let mut halted = vec![false; plan.len()];

        for (position, action) in plan.actions().iter().enumerate() {
            let path = action.path().clone();

            if !action.is_apply() {
                report.not_applicable.push(path);
                continue;
            }
            if halted[position] {
                tracing::debug!(%path, "halted by failed prerequisite");
                report.halted.push(path);
                continue;
            }

            match transport.apply(action) {
                Ok(()) => {
                    report.settled.push(PriorUpdate {
                        path: path.clone(),
                        entry: action.record().source().cloned(),
                    });
                    report.applied.push(path);
                }
                Err(err) => {
                    tracing::warn!(%path, error = %err.message, "action failed");
                    for dependent in plan.dependents_of(position) {
                        halted[dependent] = true;
                    }
                    report.failed.push(FailedAction {
                        path,
                        message: err.message,
                    });
                }
            }
        }

        tracing::info!(
            applied = report.applied.len(),
            failed = report.failed.len(),
            halted = report.halted.len(),
            "plan executed"
        );

        report
    }
}
