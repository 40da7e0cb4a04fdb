//! Ordered reconciliation plans.
//!
//! A plan is the resolved change set arranged so it can be applied one
//! action at a time: a directory is created before anything inside it and
//! deleted only after everything inside it is gone. Ordering is a
//! topological sort over ancestor/descendant dependencies, with ties broken
//! by diff order so the same input always yields the same plan.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

use serde::Serialize;

use syncplan_core::{EntryKind, EntryPath};

use crate::config::ReconcileConfig;
use crate::conflict::{Conflict, Override, OverrideDecision};
use crate::error::ReconcileError;
use crate::record::{ChangeAction, ChangeRecord};
use crate::resolver::{Resolution, ResolvedChange, SkipReason};

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanAction {
    record: ChangeRecord,
    resolution: Resolution,
    prerequisites: Vec<usize>,
    overridden: bool,
}

impl PlanAction {
    /// The underlying change.
    pub fn record(&self) -> &ChangeRecord {
        &self.record
    }

    /// What will happen to it.
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Plan positions that must be applied before this one.
    pub fn prerequisites(&self) -> &[usize] {
        &self.prerequisites
    }

    /// Whether an operator override decided this action.
    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    /// Path of the change.
    pub fn path(&self) -> &EntryPath {
        self.record.path()
    }

    /// Whether the action will be applied.
    pub fn is_apply(&self) -> bool {
        self.resolution.is_apply()
    }
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.record, self.resolution)
    }
}

/// Totals over a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub applied: usize,
    pub conflicts: usize,
    pub skipped: usize,
    pub low_confidence: usize,
    pub overridden: usize,
    /// Applied actions by kind.
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub type_changes: usize,
    /// Bytes the applied actions move.
    pub bytes_to_transfer: u64,
}

impl PlanSummary {
    fn from_actions(actions: &[PlanAction]) -> Self {
        let mut summary = Self::default();
        for action in actions {
            if action.record.is_low_confidence() {
                summary.low_confidence += 1;
            }
            if action.overridden {
                summary.overridden += 1;
            }
            match &action.resolution {
                Resolution::Apply => {
                    summary.applied += 1;
                    summary.bytes_to_transfer += action.record.transfer_size();
                    match action.record.action() {
                        ChangeAction::Create => summary.creates += 1,
                        ChangeAction::Update => summary.updates += 1,
                        ChangeAction::Delete => summary.deletes += 1,
                        ChangeAction::TypeChange => summary.type_changes += 1,
                    }
                }
                Resolution::Skip { .. } => summary.skipped += 1,
                Resolution::Conflict(_) => summary.conflicts += 1,
            }
        }
        summary
    }

    /// Total number of actions.
    pub fn total(&self) -> usize {
        self.applied + self.conflicts + self.skipped
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} applied, {} conflicts, {} skipped",
            self.applied, self.conflicts, self.skipped
        )
    }
}

/// A dependency-ordered list of actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    actions: Vec<PlanAction>,
    summary: PlanSummary,
    #[serde(skip)]
    dependents: Vec<Vec<usize>>,
}

impl ReconciliationPlan {
    /// Actions in application order.
    pub fn actions(&self) -> &[PlanAction] {
        &self.actions
    }

    /// Totals over all actions.
    pub fn summary(&self) -> PlanSummary {
        self.summary
    }

    /// Unresolved conflicts, in plan order.
    pub fn conflicts(&self) -> impl Iterator<Item = &Conflict> {
        self.actions.iter().filter_map(|a| a.resolution.as_conflict())
    }

    /// Actions that will be applied, in plan order.
    pub fn applicable(&self) -> impl Iterator<Item = &PlanAction> {
        self.actions.iter().filter(|a| a.is_apply())
    }

    /// Every position that directly or transitively depends on `position`, ascending.
    pub fn dependents_of(&self, position: usize) -> Vec<usize> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<usize> = self
            .dependents
            .get(position)
            .into_iter()
            .flatten()
            .copied()
            .collect();

        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.dependents[next].iter().copied());
            }
        }

        seen.into_iter().collect()
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the plan has no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Builds a [`ReconciliationPlan`] from resolved changes.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    config: ReconcileConfig,
    overrides: BTreeMap<EntryPath, OverrideDecision>,
}

impl PlanBuilder {
    /// Create a builder.
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            config,
            overrides: BTreeMap::new(),
        }
    }

    /// Operator decisions for conflicted paths. Later entries for a path win.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = Override>) -> Self {
        self.overrides
            .extend(overrides.into_iter().map(|o| (o.path, o.decision)));
        self
    }

    /// The configuration the plan is built under.
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Order the changes and settle overrides and dependencies.
    ///
    /// Fails with [`ReconcileError::CyclicPath`] when the changes contradict
    /// each other structurally, e.g. a file created inside a directory that
    /// is being deleted.
    pub fn build(&self, resolved: Vec<ResolvedChange>) -> Result<ReconciliationPlan, ReconcileError> {
        let mut overridden = vec![false; resolved.len()];
        let mut changes = resolved;

        for (index, change) in changes.iter_mut().enumerate() {
            let Some(decision) = self.overrides.get(change.record.path()) else {
                continue;
            };
            if !matches!(change.resolution, Resolution::Conflict(_)) {
                tracing::debug!(path = %change.record.path(), "override ignored, path is not in conflict");
                continue;
            }
            change.resolution = match decision {
                OverrideDecision::Apply => Resolution::Apply,
                OverrideDecision::Skip => Resolution::skip(SkipReason::Overridden),
            };
            overridden[index] = true;
        }

        let predecessors = dependency_edges(&changes);
        let order = topological_order(&changes, &predecessors)?;

        let mut position = vec![0; changes.len()];
        for (pos, &index) in order.iter().enumerate() {
            position[index] = pos;
        }

        let mut ordered: Vec<(usize, ResolvedChange)> = changes.into_iter().enumerate().collect();
        ordered.sort_by_key(|(index, _)| position[*index]);

        let mut actions: Vec<PlanAction> = Vec::with_capacity(ordered.len());
        let mut dependents = vec![Vec::new(); ordered.len()];

        for (pos, (index, change)) in ordered.into_iter().enumerate() {
            let mut prerequisites: Vec<usize> = predecessors[index].iter().map(|&p| position[p]).collect();
            prerequisites.sort_unstable();
            for &prerequisite in &prerequisites {
                dependents[prerequisite].push(pos);
            }

            // Prerequisites precede this action, so their resolution is final.
            let mut resolution = change.resolution;
            let blocker = prerequisites
                .iter()
                .filter_map(|&p| actions.get(p))
                .find(|prerequisite| !prerequisite.is_apply());
            if let (true, Some(blocker)) = (resolution.is_apply(), blocker) {
                tracing::debug!(path = %change.record.path(), blocked_by = %blocker.path(), "action demoted");
                resolution = Resolution::skip(SkipReason::DependencyNotApplied {
                    path: blocker.path().clone(),
                });
            }

            actions.push(PlanAction {
                record: change.record,
                resolution,
                prerequisites,
                overridden: overridden[index],
            });
        }

        let summary = PlanSummary::from_actions(&actions);
        tracing::info!(%summary, low_confidence = summary.low_confidence, "plan built");

        Ok(ReconciliationPlan {
            actions,
            summary,
            dependents,
        })
    }
}

/// How a record affects the paths beneath it.
struct Footprint {
    /// A directory exists here afterwards and did not before.
    provides_dir: bool,
    /// A non-directory exists here afterwards.
    provides_non_dir: bool,
    /// Whatever was here is removed.
    removes: bool,
    /// Something exists at the path afterwards.
    occupies: bool,
}

impl Footprint {
    fn of(record: &ChangeRecord) -> Self {
        let resulting = record.resulting_kind();
        let previous = record.previous_kind();
        let replaces = matches!(record.action(), ChangeAction::Create | ChangeAction::TypeChange);

        Self {
            provides_dir: replaces && resulting == Some(EntryKind::Directory),
            provides_non_dir: resulting.is_some_and(|k| k != EntryKind::Directory),
            removes: match record.action() {
                ChangeAction::Delete => true,
                ChangeAction::TypeChange => previous == Some(EntryKind::Directory),
                _ => false,
            },
            occupies: resulting.is_some(),
        }
    }
}

/// Predecessor sets (by input index) for every change.
fn dependency_edges(changes: &[ResolvedChange]) -> Vec<BTreeSet<usize>> {
    let index: HashMap<&EntryPath, usize> = changes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.record.path(), i))
        .collect();
    let footprints: Vec<Footprint> = changes.iter().map(|c| Footprint::of(&c.record)).collect();

    let mut predecessors = vec![BTreeSet::new(); changes.len()];

    for (child, change) in changes.iter().enumerate() {
        let occupies = footprints[child].occupies;

        for ancestor_path in change.record.path().ancestors() {
            let Some(&ancestor) = index.get(&ancestor_path) else {
                continue;
            };
            let ancestor_print = &footprints[ancestor];
            let deleted = change_is_delete(&changes[ancestor].record);

            if ancestor_print.provides_dir {
                predecessors[child].insert(ancestor);
            }
            if ancestor_print.removes {
                predecessors[ancestor].insert(child);
            }
            if occupies && (deleted || ancestor_print.provides_non_dir) {
                // Nothing can live under a removed path or a non-directory.
                predecessors[child].insert(ancestor);
                predecessors[ancestor].insert(child);
            }
        }
    }

    predecessors
}

fn change_is_delete(record: &ChangeRecord) -> bool {
    record.action() == ChangeAction::Delete
}

/// Kahn's algorithm with the ready set ordered by input index.
fn topological_order(
    changes: &[ResolvedChange],
    predecessors: &[BTreeSet<usize>],
) -> Result<Vec<usize>, ReconcileError> {
    let mut indegree: Vec<usize> = predecessors.iter().map(BTreeSet::len).collect();
    let mut successors = vec![Vec::new(); changes.len()];
    for (node, preds) in predecessors.iter().enumerate() {
        for &pred in preds {
            successors[pred].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..changes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(changes.len());

    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &next in &successors[node] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() < changes.len() {
        let paths: Vec<EntryPath> = (0..changes.len())
            .filter(|&i| indegree[i] > 0)
            .map(|i| changes[i].record.path().clone())
            .collect();
        tracing::warn!(stuck = paths.len(), "plan ordering found a cycle");
        return Err(ReconcileError::CyclicPath { paths });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncplan_core::Entry;

    fn apply(record: ChangeRecord) -> ResolvedChange {
        ResolvedChange {
            record,
            resolution: Resolution::Apply,
        }
    }

    fn paths(plan: &ReconciliationPlan) -> Vec<&str> {
        plan.actions().iter().map(|a| a.path().as_str()).collect()
    }

    #[test]
    fn test_creates_parent_first() {
        let resolved = vec![
            apply(ChangeRecord::create(Entry::directory("d", None).unwrap())),
            apply(ChangeRecord::create(Entry::file("d/a", 3, None, None).unwrap())),
        ];
        let plan = PlanBuilder::default().build(resolved).unwrap();
        assert_eq!(paths(&plan), vec!["d", "d/a"]);
        assert_eq!(plan.actions()[1].prerequisites(), &[0]);
        assert_eq!(plan.summary().bytes_to_transfer, 3);
    }

    #[test]
    fn test_deletes_children_first() {
        let resolved = vec![
            apply(ChangeRecord::delete(Entry::directory("d", None).unwrap())),
            apply(ChangeRecord::delete(Entry::file("d/a", 1, None, None).unwrap())),
            apply(ChangeRecord::delete(Entry::file("d/b", 1, None, None).unwrap())),
        ];
        let plan = PlanBuilder::default().build(resolved).unwrap();
        assert_eq!(paths(&plan), vec!["d/a", "d/b", "d"]);
        assert_eq!(plan.dependents_of(0), vec![2]);
    }

    #[test]
    fn test_create_under_deleted_directory_is_cyclic() {
        let resolved = vec![
            apply(ChangeRecord::delete(Entry::directory("d", None).unwrap())),
            apply(ChangeRecord::create(Entry::file("d/a", 1, None, None).unwrap())),
        ];
        match PlanBuilder::default().build(resolved) {
            Err(ReconcileError::CyclicPath { paths }) => assert_eq!(paths.len(), 2),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_summary_display() {
        let summary = PlanSummary {
            applied: 2,
            conflicts: 1,
            skipped: 3,
            ..Default::default()
        };
        assert_eq!(summary.to_string(), "2 applied, 1 conflicts, 3 skipped");
        assert_eq!(summary.total(), 6);
    }
}
