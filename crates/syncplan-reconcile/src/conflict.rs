//! Conflict descriptions, policies and operator overrides.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use syncplan_core::{Entry, EntryPath};

/// The kind of divergence behind a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Both sides changed the content since the last sync (or no sync is known).
    BothModified,
    /// The source changed a file the target deleted.
    ModifyDelete,
    /// The source deleted a file the target changed.
    DeleteModify,
    /// The path changed kind; never resolved automatically.
    TypeChange,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BothModified => write!(f, "Modified on both sides"),
            Self::ModifyDelete => write!(f, "Modified at source, deleted at target"),
            Self::DeleteModify => write!(f, "Deleted at source, modified at target"),
            Self::TypeChange => write!(f, "Object type changed"),
        }
    }
}

/// A policy's verdict on a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConflictDecision {
    /// Propagate the source (after) state.
    KeepSource,
    /// Leave the target (before) state in place.
    KeepTarget,
    /// No safe choice; a person has to decide.
    #[default]
    Undecided,
}

/// Everything an operator needs to settle a conflict by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// Path in conflict.
    pub path: EntryPath,
    /// The kind of divergence.
    pub kind: ConflictKind,
    /// Entry from the after inventory, if it exists there.
    pub source: Option<Entry>,
    /// Entry from the before inventory, if it exists there.
    pub target: Option<Entry>,
    /// Last state both sides agreed on, if known.
    pub prior: Option<Entry>,
    /// What the conflict policy would do.
    pub suggestion: ConflictDecision,
}

impl Conflict {
    /// Modification time on the source side.
    pub fn source_modified(&self) -> Option<DateTime<Utc>> {
        self.source.as_ref().and_then(Entry::modified)
    }

    /// Modification time on the target side.
    pub fn target_modified(&self) -> Option<DateTime<Utc>> {
        self.target.as_ref().and_then(Entry::modified)
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// Decides which side of a conflict should win.
///
/// Implementations must be pure: the same conflict always yields the same
/// decision.
pub trait ConflictPolicy: Send + Sync {
    /// Suggest a winner for `conflict`. `suggestion` on the input is not yet set.
    fn decide(&self, conflict: &Conflict) -> ConflictDecision;
}

/// Newer modification time wins; missing or tied timestamps stay undecided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastWriterWins {
    /// Seconds within which two timestamps count as a tie.
    pub tolerance_secs: u64,
}

impl LastWriterWins {
    /// Create the policy with a tie tolerance.
    pub fn new(tolerance_secs: u64) -> Self {
        Self { tolerance_secs }
    }
}

impl ConflictPolicy for LastWriterWins {
    fn decide(&self, conflict: &Conflict) -> ConflictDecision {
        let (Some(source), Some(target)) = (conflict.source_modified(), conflict.target_modified())
        else {
            return ConflictDecision::Undecided;
        };

        let delta = source.signed_duration_since(target).num_seconds();
        if delta.unsigned_abs() <= self.tolerance_secs {
            ConflictDecision::Undecided
        } else if delta > 0 {
            ConflictDecision::KeepSource
        } else {
            ConflictDecision::KeepTarget
        }
    }
}

/// Never picks a side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysAsk;

impl ConflictPolicy for AlwaysAsk {
    fn decide(&self, _conflict: &Conflict) -> ConflictDecision {
        ConflictDecision::Undecided
    }
}

/// An operator's decision for a conflicted path, applied on the next plan build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    /// Path the decision applies to.
    pub path: EntryPath,
    /// What to do with it.
    pub decision: OverrideDecision,
}

impl Override {
    /// Propagate the source state for `path`.
    pub fn apply(path: EntryPath) -> Self {
        Self {
            path,
            decision: OverrideDecision::Apply,
        }
    }

    /// Leave `path` untouched.
    pub fn skip(path: EntryPath) -> Self {
        Self {
            path,
            decision: OverrideDecision::Skip,
        }
    }
}

/// How an operator settled a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideDecision {
    /// Propagate the source state.
    Apply,
    /// Keep the target state.
    Skip,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn conflict(source_secs: Option<i64>, target_secs: Option<i64>) -> Conflict {
        let at = |s: Option<i64>| s.and_then(|s| Utc.timestamp_opt(s, 0).single());
        Conflict {
            path: EntryPath::new("a.txt").unwrap(),
            kind: ConflictKind::BothModified,
            source: Some(Entry::file("a.txt", 1, at(source_secs), None).unwrap()),
            target: Some(Entry::file("a.txt", 2, at(target_secs), None).unwrap()),
            prior: None,
            suggestion: ConflictDecision::Undecided,
        }
    }

    #[test]
    fn test_newer_side_wins() {
        let policy = LastWriterWins::default();
        assert_eq!(policy.decide(&conflict(Some(200), Some(100))), ConflictDecision::KeepSource);
        assert_eq!(policy.decide(&conflict(Some(100), Some(200))), ConflictDecision::KeepTarget);
    }

    #[test]
    fn test_missing_or_tied_is_undecided() {
        let policy = LastWriterWins::default();
        assert_eq!(policy.decide(&conflict(None, Some(100))), ConflictDecision::Undecided);
        assert_eq!(policy.decide(&conflict(Some(100), Some(100))), ConflictDecision::Undecided);
    }

    #[test]
    fn test_tolerance_widens_ties() {
        let policy = LastWriterWins::new(5);
        assert_eq!(policy.decide(&conflict(Some(104), Some(100))), ConflictDecision::Undecided);
        assert_eq!(policy.decide(&conflict(Some(106), Some(100))), ConflictDecision::KeepSource);
    }
}
