//! Inventory container and statistics.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::entry::{Entry, EntryKind};
use crate::error::{InventoryError, InventoryWarning};
use crate::path::EntryPath;

/// Summary statistics for an inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    /// Total size of all files in bytes.
    pub total_size: u64,
    /// Number of regular files.
    pub total_files: u64,
    /// Number of directories.
    pub total_dirs: u64,
    /// Number of symbolic links.
    pub total_symlinks: u64,
    /// Number of other objects.
    pub total_other: u64,
    /// Deepest path depth.
    pub max_depth: u32,
}

impl InventoryStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with an entry.
    pub fn record(&mut self, entry: &Entry) {
        match entry.kind() {
            EntryKind::File => {
                self.total_files += 1;
                self.total_size += entry.size();
            }
            EntryKind::Directory => self.total_dirs += 1,
            EntryKind::Symlink => self.total_symlinks += 1,
            EntryKind::Other => self.total_other += 1,
        }
        self.max_depth = self.max_depth.max(entry.path().depth());
    }

    /// Total number of entries counted.
    pub fn total_entries(&self) -> u64 {
        self.total_files + self.total_dirs + self.total_symlinks + self.total_other
    }
}

/// Snapshot of every entry at one location, keyed by path.
///
/// An inventory is either complete or flagged partial. A partial flag on the
/// whole inventory means absence of a path proves nothing anywhere; partial
/// regions narrow that to specific subtrees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(with = "entry_list")]
    entries: BTreeMap<EntryPath, Entry>,

    #[serde(default)]
    partial: bool,

    #[serde(default)]
    partial_regions: BTreeSet<EntryPath>,

    /// Warnings collected while the inventory was built.
    #[serde(default)]
    pub warnings: Vec<InventoryWarning>,
}

impl Inventory {
    /// Create an empty, complete inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an inventory from valid entries, failing on duplicate paths.
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Result<Self, InventoryError> {
        let mut inventory = Self::new();
        for entry in entries {
            inventory.insert(entry)?;
        }
        Ok(inventory)
    }

    /// Build an inventory from construction results.
    ///
    /// In strict mode the first invalid entry aborts. Otherwise the rejected
    /// entry is recorded as a warning and the inventory is flagged partial,
    /// since the missing object could have been anywhere. Duplicate paths are
    /// always fatal.
    pub fn collect(
        results: impl IntoIterator<Item = Result<Entry, InventoryError>>,
        strict: bool,
    ) -> Result<Self, InventoryError> {
        let mut inventory = Self::new();
        for result in results {
            match result {
                Ok(entry) => inventory.insert(entry)?,
                Err(err) if strict => return Err(err),
                Err(err) => {
                    inventory.warnings.push(InventoryWarning::rejected(&err));
                    inventory.partial = true;
                }
            }
        }
        Ok(inventory)
    }

    /// Add an entry. Fails if the path is already present.
    pub fn insert(&mut self, entry: Entry) -> Result<(), InventoryError> {
        match self.entries.entry(entry.path().clone()) {
            btree_map::Entry::Occupied(occupied) => Err(InventoryError::DuplicatePath {
                path: occupied.key().to_string(),
            }),
            btree_map::Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Flag the whole inventory as partial.
    pub fn mark_partial(&mut self) {
        self.partial = true;
    }

    /// Flag one subtree as incompletely captured.
    pub fn mark_partial_region(&mut self, root: EntryPath) {
        self.partial_regions.insert(root);
    }

    /// Whether any part of the inventory is partial.
    pub fn is_partial(&self) -> bool {
        self.partial || !self.partial_regions.is_empty()
    }

    /// Whether `path` lies in a region that was not fully captured.
    pub fn is_partial_at(&self, path: &EntryPath) -> bool {
        self.partial
            || (!self.partial_regions.is_empty()
                && (self.partial_regions.contains(path)
                    || path.ancestors().any(|a| self.partial_regions.contains(&a))))
    }

    /// Subtree roots flagged partial.
    pub fn partial_regions(&self) -> impl Iterator<Item = &EntryPath> {
        self.partial_regions.iter()
    }

    /// Look up an entry by path.
    pub fn get(&self, path: &EntryPath) -> Option<&Entry> {
        self.entries.get(path)
    }

    /// Check whether a path is present.
    pub fn contains(&self, path: &EntryPath) -> bool {
        self.entries.contains_key(path)
    }

    /// Entries in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the inventory has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if there were any warnings while building.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Compute summary statistics.
    pub fn stats(&self) -> InventoryStats {
        let mut stats = InventoryStats::new();
        for entry in self.entries.values() {
            stats.record(entry);
        }
        stats
    }

    /// Verify structural completeness.
    ///
    /// Every entry below the root must have its parent present as a directory.
    /// Paths inside partial regions are exempt; a fully partial inventory
    /// always passes.
    pub fn check_structure(&self) -> Result<(), InventoryError> {
        if self.partial {
            return Ok(());
        }

        for path in self.entries.keys() {
            let Some(parent) = path.parent() else {
                continue;
            };
            let parent_is_dir = self.entries.get(&parent).is_some_and(Entry::is_dir);
            if !parent_is_dir && !self.is_partial_at(path) {
                return Err(InventoryError::MissingParent {
                    path: path.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a Entry;
    type IntoIter = btree_map::Values<'a, EntryPath, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

/// Serializes the entry map as a flat list, re-checking paths on the way in.
mod entry_list {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::entry::Entry;
    use crate::error::InventoryError;
    use crate::path::EntryPath;

    pub fn serialize<S: Serializer>(
        entries: &BTreeMap<EntryPath, Entry>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(entries.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<EntryPath, Entry>, D::Error> {
        let mut entries = BTreeMap::new();
        for entry in Vec::<Entry>::deserialize(deserializer)? {
            let path = entry.path().clone();
            if entries.insert(path.clone(), entry).is_some() {
                return Err(D::Error::custom(InventoryError::DuplicatePath {
                    path: path.to_string(),
                }));
            }
        }
        Ok(entries)
    }
}
