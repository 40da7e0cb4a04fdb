//! Per-record conflict resolution against the last synchronized state.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use syncplan_core::{Entry, EntryPath, Inventory};

use crate::config::{ConflictMode, ReconcileConfig};
use crate::conflict::{Conflict, ConflictDecision, ConflictKind, ConflictPolicy, LastWriterWins};
use crate::record::{ChangeAction, ChangeRecord};

/// Lookup of the state both sides last agreed on.
pub trait PriorState {
    /// The prior entry at `path`, if one was recorded.
    fn prior(&self, path: &EntryPath) -> Option<&Entry>;
}

impl PriorState for Inventory {
    fn prior(&self, path: &EntryPath) -> Option<&Entry> {
        self.get(path)
    }
}

impl PriorState for BTreeMap<EntryPath, Entry> {
    fn prior(&self, path: &EntryPath) -> Option<&Entry> {
        self.get(path)
    }
}

impl<S: BuildHasher> PriorState for HashMap<EntryPath, Entry, S> {
    fn prior(&self, path: &EntryPath) -> Option<&Entry> {
        self.get(path)
    }
}

/// No synchronization has happened yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPriorState;

impl PriorState for NoPriorState {
    fn prior(&self, _path: &EntryPath) -> Option<&Entry> {
        None
    }
}

/// Why a change will not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The target already moved past the prior state; propagating would undo it.
    TargetAhead,
    /// The conflict policy picked the target side.
    TargetWins,
    /// The change was observed in an incomplete region.
    LowConfidence,
    /// A prerequisite action will not be applied.
    DependencyNotApplied { path: EntryPath },
    /// An operator chose to keep the target.
    Overridden,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetAhead => write!(f, "target is ahead"),
            Self::TargetWins => write!(f, "target wins"),
            Self::LowConfidence => write!(f, "low confidence"),
            Self::DependencyNotApplied { path } => write!(f, "depends on {path}"),
            Self::Overridden => write!(f, "overridden"),
        }
    }
}

/// What to do with a change record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// Propagate the change.
    Apply,
    /// Leave the target untouched.
    Skip { reason: SkipReason },
    /// Both sides diverged; needs a decision.
    Conflict(Conflict),
}

impl Resolution {
    /// Shorthand for a skip.
    pub fn skip(reason: SkipReason) -> Self {
        Self::Skip { reason }
    }

    /// Whether the change will be propagated.
    pub fn is_apply(&self) -> bool {
        matches!(self, Self::Apply)
    }

    /// Whether the change is skipped.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }

    /// The conflict, if this is one.
    pub fn as_conflict(&self) -> Option<&Conflict> {
        match self {
            Self::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Skip { reason } => write!(f, "skip ({reason})"),
            Self::Conflict(conflict) => write!(f, "conflict ({})", conflict.kind),
        }
    }
}

/// A change record paired with its resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedChange {
    pub record: ChangeRecord,
    pub resolution: Resolution,
}

/// Intermediate verdict before a conflict is materialized.
enum Verdict {
    Apply,
    Skip(SkipReason),
    Conflict(ConflictKind),
}

/// Classifies change records as apply, skip or conflict.
///
/// Resolution is a pure function of the record, its prior entry and the
/// configuration, so resolving the same input twice yields the same answer.
#[derive(Clone)]
pub struct Resolver {
    config: ReconcileConfig,
    policy: Arc<dyn ConflictPolicy>,
}

impl Resolver {
    /// Create a resolver using last-writer-wins suggestions.
    pub fn new(config: ReconcileConfig) -> Self {
        let policy = Arc::new(LastWriterWins::new(config.clock_skew_tolerance));
        Self { config, policy }
    }

    /// Replace the conflict policy.
    pub fn with_policy(mut self, policy: Arc<dyn ConflictPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Resolve one record given the prior entry at its path.
    pub fn resolve(&self, record: &ChangeRecord, prior: Option<&Entry>) -> Resolution {
        let verdict = self.classify(record, prior);

        let verdict = match verdict {
            Verdict::Apply
                if record.action() == ChangeAction::Delete
                    && record.is_low_confidence()
                    && self.config.skip_low_confidence_deletes =>
            {
                tracing::warn!(path = %record.path(), "delete observed in incomplete region, skipping");
                Verdict::Skip(SkipReason::LowConfidence)
            }
            other => other,
        };

        match verdict {
            Verdict::Apply => Resolution::Apply,
            Verdict::Skip(reason) => Resolution::skip(reason),
            Verdict::Conflict(kind) => self.conflict(record, prior, kind),
        }
    }

    /// Resolve every record in parallel, preserving input order.
    pub fn resolve_all<P>(&self, records: Vec<ChangeRecord>, prior: &P) -> Vec<ResolvedChange>
    where
        P: PriorState + Sync + ?Sized,
    {
        let resolved: Vec<ResolvedChange> = records
            .into_par_iter()
            .map(|record| {
                let resolution = self.resolve(&record, prior.prior(record.path()));
                ResolvedChange { record, resolution }
            })
            .collect();

        let conflicts = resolved
            .iter()
            .filter(|r| matches!(r.resolution, Resolution::Conflict(_)))
            .count();
        let applied = resolved.iter().filter(|r| r.resolution.is_apply()).count();
        tracing::info!(
            records = resolved.len(),
            applied,
            conflicts,
            skipped = resolved.len() - applied - conflicts,
            "resolution complete"
        );

        resolved
    }

    /// Apply the decision table.
    fn classify(&self, record: &ChangeRecord, prior: Option<&Entry>) -> Verdict {
        let Some(prior) = prior else {
            return match record.action() {
                ChangeAction::Create | ChangeAction::Delete => Verdict::Apply,
                ChangeAction::Update => Verdict::Conflict(ConflictKind::BothModified),
                ChangeAction::TypeChange => Verdict::Conflict(ConflictKind::TypeChange),
            };
        };

        let matches_source = record.source().is_some_and(|s| prior.content_eq(s));
        let matches_target = record.target().is_some_and(|t| prior.content_eq(t));

        match record.action() {
            ChangeAction::TypeChange => Verdict::Conflict(ConflictKind::TypeChange),
            ChangeAction::Create if matches_source => Verdict::Skip(SkipReason::TargetAhead),
            ChangeAction::Create => Verdict::Conflict(ConflictKind::ModifyDelete),
            ChangeAction::Delete if matches_target => Verdict::Apply,
            ChangeAction::Delete => Verdict::Conflict(ConflictKind::DeleteModify),
            ChangeAction::Update if matches_target => Verdict::Apply,
            ChangeAction::Update if matches_source => Verdict::Skip(SkipReason::TargetAhead),
            ChangeAction::Update => Verdict::Conflict(ConflictKind::BothModified),
        }
    }

    /// Materialize a conflict, attaching the policy's suggestion.
    fn conflict(&self, record: &ChangeRecord, prior: Option<&Entry>, kind: ConflictKind) -> Resolution {
        let mut conflict = Conflict {
            path: record.path().clone(),
            kind,
            source: record.source().cloned(),
            target: record.target().cloned(),
            prior: prior.cloned(),
            suggestion: ConflictDecision::Undecided,
        };

        if kind != ConflictKind::TypeChange {
            conflict.suggestion = self.policy.decide(&conflict);
        }

        tracing::debug!(path = %conflict.path, kind = ?kind, suggestion = ?conflict.suggestion, "conflict");

        match (self.config.conflict_mode, kind, conflict.suggestion) {
            (ConflictMode::AutoResolve, ConflictKind::TypeChange, _) => Resolution::Conflict(conflict),
            (ConflictMode::AutoResolve, _, ConflictDecision::KeepSource) => Resolution::Apply,
            (ConflictMode::AutoResolve, _, ConflictDecision::KeepTarget) => {
                Resolution::skip(SkipReason::TargetWins)
            }
            _ => Resolution::Conflict(conflict),
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ReconcileConfig::default())
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::AlwaysAsk;
    use chrono::{TimeZone, Utc};
    use syncplan_core::Checksum;

    fn file(path: &str, content: &[u8], secs: i64) -> Entry {
        Entry::file(
            path,
            content.len() as u64,
            Utc.timestamp_opt(secs, 0).single(),
            Some(Checksum::of(content)),
        )
        .unwrap()
    }

    fn auto_resolve() -> Resolver {
        Resolver::new(
            ReconcileConfig::builder()
                .conflict_mode(ConflictMode::AutoResolve)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_create_without_prior_applies() {
        let record = ChangeRecord::create(file("a", b"a", 1));
        assert_eq!(Resolver::default().resolve(&record, None), Resolution::Apply);
    }

    #[test]
    fn test_create_matching_prior_is_target_ahead() {
        let record = ChangeRecord::create(file("a", b"a", 1));
        let prior = file("a", b"a", 1);
        assert_eq!(
            Resolver::default().resolve(&record, Some(&prior)),
            Resolution::skip(SkipReason::TargetAhead)
        );
    }

    #[test]
    fn test_create_differing_prior_conflicts() {
        let record = ChangeRecord::create(file("a", b"new", 1));
        let prior = file("a", b"old", 1);
        let resolution = Resolver::default().resolve(&record, Some(&prior));
        assert_eq!(resolution.as_conflict().unwrap().kind, ConflictKind::ModifyDelete);
    }

    #[test]
    fn test_delete_of_modified_target_conflicts() {
        let record = ChangeRecord::delete(file("a", b"edited", 1));
        let prior = file("a", b"original", 1);
        let resolution = Resolver::default().resolve(&record, Some(&prior));
        assert_eq!(resolution.as_conflict().unwrap().kind, ConflictKind::DeleteModify);

        let prior = file("a", b"edited", 1);
        assert_eq!(Resolver::default().resolve(&record, Some(&prior)), Resolution::Apply);
    }

    #[test]
    fn test_low_confidence_delete_is_skipped() {
        let record = ChangeRecord::delete(file("a", b"a", 1)).with_low_confidence(true);
        assert_eq!(
            Resolver::default().resolve(&record, None),
            Resolution::skip(SkipReason::LowConfidence)
        );

        let lenient = Resolver::new(
            ReconcileConfig::builder()
                .skip_low_confidence_deletes(false)
                .build()
                .unwrap(),
        );
        assert_eq!(lenient.resolve(&record, None), Resolution::Apply);
    }

    #[test]
    fn test_update_against_prior() {
        let record = ChangeRecord::update(file("a", b"v1", 10), file("a", b"v2", 20));
        let resolver = Resolver::default();

        assert_eq!(resolver.resolve(&record, Some(&file("a", b"v1", 10))), Resolution::Apply);
        assert_eq!(
            resolver.resolve(&record, Some(&file("a", b"v2", 20))),
            Resolution::skip(SkipReason::TargetAhead)
        );

        let resolution = resolver.resolve(&record, Some(&file("a", b"v0", 5)));
        let conflict = resolution.as_conflict().unwrap();
        assert_eq!(conflict.kind, ConflictKind::BothModified);
        assert_eq!(conflict.suggestion, ConflictDecision::KeepSource);
    }

    #[test]
    fn test_update_without_prior_conflicts() {
        let record = ChangeRecord::update(file("a", b"v1", 10), file("a", b"v2", 20));
        let resolution = Resolver::default().resolve(&record, None);
        assert_eq!(resolution.as_conflict().unwrap().kind, ConflictKind::BothModified);
    }

    #[test]
    fn test_type_change_never_auto_resolves() {
        let record = ChangeRecord::type_change(file("b", b"b", 1), Entry::directory("b", None).unwrap());
        let resolution = auto_resolve().resolve(&record, Some(&file("b", b"b", 1)));
        let conflict = resolution.as_conflict().unwrap();
        assert_eq!(conflict.kind, ConflictKind::TypeChange);
        assert_eq!(conflict.suggestion, ConflictDecision::Undecided);
    }

    #[test]
    fn test_auto_resolve_follows_suggestion() {
        let newer_source = ChangeRecord::update(file("a", b"t", 10), file("a", b"s", 20));
        assert_eq!(auto_resolve().resolve(&newer_source, None), Resolution::Apply);

        let newer_target = ChangeRecord::update(file("a", b"t", 20), file("a", b"s", 10));
        assert_eq!(
            auto_resolve().resolve(&newer_target, None),
            Resolution::skip(SkipReason::TargetWins)
        );

        let tied = ChangeRecord::update(file("a", b"t", 10), file("a", b"s", 10));
        assert!(auto_resolve().resolve(&tied, None).as_conflict().is_some());
    }

    #[test]
    fn test_custom_policy() {
        let record = ChangeRecord::update(file("a", b"t", 10), file("a", b"s", 20));
        let resolver = auto_resolve().with_policy(Arc::new(AlwaysAsk));
        let resolution = resolver.resolve(&record, None);
        assert_eq!(resolution.as_conflict().unwrap().suggestion, ConflictDecision::Undecided);
    }

    #[test]
    fn test_resolve_all_preserves_order() {
        let records: Vec<_> = (0..50)
            .map(|i| ChangeRecord::create(file(&format!("f{i:02}"), b"x", 1)))
            .collect();
        let expected: Vec<_> = records.iter().map(|r| r.path().clone()).collect();

        let resolved = Resolver::default().resolve_all(records, &NoPriorState);
        let paths: Vec<_> = resolved.iter().map(|r| r.record.path().clone()).collect();
        assert_eq!(paths, expected);
        assert!(resolved.iter().all(|r| r.resolution.is_apply()));
    }
}
