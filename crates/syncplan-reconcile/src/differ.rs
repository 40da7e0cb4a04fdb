//! Structural diff between two inventories.
//!
//! Both inventories keep their entries in a path-sorted map, so the diff is a
//! single merge walk over the two sorted sequences: linear in the combined
//! entry count, with output order fixed by path order alone.

use itertools::{EitherOrBoth, Itertools};
use serde::Serialize;

use syncplan_core::{ContentMatch, Inventory};

use crate::record::{ChangeAction, ChangeRecord};

/// Counts of each change kind in a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub type_changes: usize,
    pub low_confidence: usize,
}

impl DiffStats {
    /// Tally a sequence of records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ChangeRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            match record.action() {
                ChangeAction::Create => stats.creates += 1,
                ChangeAction::Update => stats.updates += 1,
                ChangeAction::Delete => stats.deletes += 1,
                ChangeAction::TypeChange => stats.type_changes += 1,
            }
            if record.is_low_confidence() {
                stats.low_confidence += 1;
            }
        }
        stats
    }

    /// Total number of records.
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes + self.type_changes
    }
}

/// Computes change records between two inventories.
#[derive(Debug, Clone, Copy, Default)]
pub struct Differ {
    timestamp_heuristic: bool,
}

impl Differ {
    /// Create a new differ.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report same-size entries lacking a checksum as low-confidence updates
    /// when their modification times differ.
    pub fn with_timestamp_heuristic(mut self, enabled: bool) -> Self {
        self.timestamp_heuristic = enabled;
        self
    }

    /// Compare `before` with `after`, in sorted path order.
    ///
    /// Paths equal in content produce nothing. Records touching a partial
    /// region of either inventory, or relying on the timestamp heuristic, are
    /// tagged low confidence.
    pub fn diff(&self, before: &Inventory, after: &Inventory) -> Vec<ChangeRecord> {
        let mut records = Vec::new();
        let mut unchanged = 0usize;

        for pair in before
            .iter()
            .merge_join_by(after.iter(), |target, source| target.path().cmp(source.path()))
        {
            let record = match pair {
                EitherOrBoth::Right(source) => ChangeRecord::create(source.clone()),
                EitherOrBoth::Left(target) => ChangeRecord::delete(target.clone()),
                EitherOrBoth::Both(target, source) if target.kind() != source.kind() => {
                    ChangeRecord::type_change(target.clone(), source.clone())
                }
                EitherOrBoth::Both(target, source) => {
                    match target.compare_content_with_timestamps(source, self.timestamp_heuristic) {
                        ContentMatch::Equal => {
                            unchanged += 1;
                            continue;
                        }
                        ContentMatch::Differs => ChangeRecord::update(target.clone(), source.clone()),
                        ContentMatch::Uncertain => ChangeRecord::update(target.clone(), source.clone())
                            .with_low_confidence(true),
                    }
                }
            };

            let partial = before.is_partial_at(record.path()) || after.is_partial_at(record.path());
            let low_confidence = record.is_low_confidence() || partial;
            let record = record.with_low_confidence(low_confidence);

            tracing::debug!(path = %record.path(), action = %record.action(), low_confidence, "change detected");
            records.push(record);
        }

        let stats = DiffStats::from_records(&records);
        tracing::info!(
            creates = stats.creates,
            updates = stats.updates,
            deletes = stats.deletes,
            type_changes = stats.type_changes,
            low_confidence = stats.low_confidence,
            unchanged,
            "diff complete"
        );

        records
    }
}

/// Compare two inventories with a default [`Differ`].
pub fn diff(before: &Inventory, after: &Inventory) -> Vec<ChangeRecord> {
    Differ::new().diff(before, after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use syncplan_core::{Checksum, Entry, EntryPath};

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(secs, 0).single()
    }

    fn file(path: &str, size: u64, content: &[u8]) -> Entry {
        Entry::file(path, size, None, Some(Checksum::of(content))).unwrap()
    }

    #[test]
    fn test_identical_inventories_produce_nothing() {
        let inventory = Inventory::from_entries([
            Entry::directory("d", None).unwrap(),
            file("d/a", 1, b"a"),
        ])
        .unwrap();
        assert!(diff(&inventory, &inventory.clone()).is_empty());
    }

    #[test]
    fn test_each_action() {
        let before = Inventory::from_entries([
            file("gone", 1, b"g"),
            file("kept", 1, b"k"),
            file("node", 1, b"n"),
        ])
        .unwrap();
        let after = Inventory::from_entries([
            file("kept", 2, b"kk"),
            Entry::directory("node", None).unwrap(),
            file("zz-new", 1, b"z"),
        ])
        .unwrap();

        let actions: Vec<_> = diff(&before, &after)
            .iter()
            .map(|r| (r.path().to_string(), r.action()))
            .collect();

        assert_eq!(
            actions,
            vec![
                ("gone".to_string(), ChangeAction::Delete),
                ("kept".to_string(), ChangeAction::Update),
                ("node".to_string(), ChangeAction::TypeChange),
                ("zz-new".to_string(), ChangeAction::Create),
            ]
        );
    }

    #[test]
    fn test_checksumless_touch_is_unchanged() {
        let before =
            Inventory::from_entries([Entry::file("a.txt", 10, at(100), None).unwrap()]).unwrap();
        let after =
            Inventory::from_entries([Entry::file("a.txt", 10, at(200), None).unwrap()]).unwrap();

        assert!(diff(&before, &after).is_empty());

        let records = Differ::new()
            .with_timestamp_heuristic(true)
            .diff(&before, &after);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action(), ChangeAction::Update);
        assert!(records[0].is_low_confidence());
    }

    #[test]
    fn test_partial_region_tags_low_confidence() {
        let before = Inventory::from_entries([file("locked/a", 1, b"a"), file("open", 1, b"o")]).unwrap();
        let mut after = Inventory::new();
        after.mark_partial_region(EntryPath::new("locked").unwrap());

        let records = diff(&before, &after);
        assert_eq!(records.len(), 2);
        assert!(records[0].is_low_confidence());
        assert!(!records[1].is_low_confidence());
    }
}
