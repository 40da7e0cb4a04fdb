//! Diffing, conflict resolution and plan construction for syncplan.
//!
//! The pipeline has three stages:
//!
//! 1. [`Differ`] merge-walks two [`Inventory`] snapshots and emits
//!    [`ChangeRecord`]s in path order.
//! 2. [`Resolver`] classifies each record against the last synchronized
//!    state ([`PriorState`]) as apply, skip or [`Conflict`].
//! 3. [`PlanBuilder`] applies operator overrides and orders everything into
//!    a [`ReconciliationPlan`] that respects parent/child dependencies.
//!
//! [`PlanExecutor`] then drives a plan through any [`Transport`].
//!
//! # Example
//!
//! ```rust
//! use syncplan_core::{Entry, Inventory};
//! use syncplan_reconcile::{reconcile, NoPriorState, ReconcileConfig};
//!
//! let before = Inventory::new();
//! let after = Inventory::from_entries([Entry::file("a.txt", 10, None, None).unwrap()]).unwrap();
//!
//! let plan = reconcile(&before, &after, &NoPriorState, &ReconcileConfig::default(), []).unwrap();
//! assert_eq!(plan.summary().to_string(), "1 applied, 0 conflicts, 0 skipped");
//! ```

mod config;
mod conflict;
mod differ;
mod error;
mod executor;
mod plan;
mod record;
mod resolver;

pub use config::{ConflictMode, ReconcileConfig, ReconcileConfigBuilder};
pub use conflict::{
    AlwaysAsk, Conflict, ConflictDecision, ConflictKind, ConflictPolicy, LastWriterWins, Override,
    OverrideDecision,
};
pub use differ::{DiffStats, Differ, diff};
pub use error::{ReconcileError, TransportError};
pub use executor::{ExecutionReport, FailedAction, PlanExecutor, PriorUpdate, Transport};
pub use plan::{PlanAction, PlanBuilder, PlanSummary, ReconciliationPlan};
pub use record::{ChangeAction, ChangeRecord};
pub use resolver::{NoPriorState, PriorState, Resolution, ResolvedChange, Resolver, SkipReason};

use syncplan_core::Inventory;

/// Diff, resolve and plan in one call.
///
/// With `require_complete` set, both inventories must pass
/// [`Inventory::check_structure`] first.
pub fn reconcile<P>(
    before: &Inventory,
    after: &Inventory,
    prior: &P,
    config: &ReconcileConfig,
    overrides: impl IntoIterator<Item = Override>,
) -> Result<ReconciliationPlan, ReconcileError>
where
    P: PriorState + Sync + ?Sized,
{
    if config.require_complete {
        before.check_structure()?;
        after.check_structure()?;
    }

    let records = Differ::new()
        .with_timestamp_heuristic(config.timestamp_heuristic)
        .diff(before, after);
    let resolved = Resolver::new(config.clone()).resolve_all(records, prior);
    PlanBuilder::new(config.clone())
        .with_overrides(overrides)
        .build(resolved)
}
