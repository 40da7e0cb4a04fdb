//! Logical entry paths.

use std::fmt;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::{InvalidEntryReason, InventoryError};

/// Separator used between path segments.
pub const SEPARATOR: char = '/';

/// A normalized, `/`-separated path relative to the synchronized root.
///
/// This is the identity key of an [`Entry`](crate::Entry) inside an
/// [`Inventory`](crate::Inventory). Leading separators, empty segments and `.`
/// segments are dropped during construction; `..` is rejected.
///
/// Ordering is byte-wise on the normalized string, so a directory always sorts
/// before everything beneath it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryPath(CompactString);

impl EntryPath {
    /// Parse and normalize a logical path.
    pub fn new(raw: &str) -> Result<Self, InventoryError> {
        let mut normalized = CompactString::with_capacity(raw.len());

        for segment in raw.split(SEPARATOR) {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(InventoryError::invalid(raw, InvalidEntryReason::PathTraversal));
                }
                s if s.contains(['\0', '\\']) => {
                    return Err(InventoryError::invalid(raw, InvalidEntryReason::InvalidSegment));
                }
                s => {
                    if !normalized.is_empty() {
                        normalized.push(SEPARATOR);
                    }
                    normalized.push_str(s);
                }
            }
        }

        if normalized.is_empty() {
            return Err(InventoryError::invalid(raw, InvalidEntryReason::EmptyPath));
        }

        Ok(Self(normalized))
    }

    /// Compose a path from a directory and a file name.
    ///
    /// An empty directory means the name sits directly under the root.
    pub fn from_parts(directory: &str, name: &str) -> Result<Self, InventoryError> {
        if name.is_empty() || name.contains(SEPARATOR) {
            let raw = format!("{directory}{SEPARATOR}{name}");
            return Err(InventoryError::invalid(raw, InvalidEntryReason::InvalidSegment));
        }
        Self::new(&format!("{directory}{SEPARATOR}{name}"))
    }

    /// Get the normalized path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final segment of the path.
    pub fn name(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Parent path, or `None` for entries directly under the root.
    pub fn parent(&self) -> Option<EntryPath> {
        self.0
            .rfind(SEPARATOR)
            .map(|idx| Self(CompactString::from(&self.0[..idx])))
    }

    /// All proper ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = EntryPath> + '_ {
        self.0
            .char_indices()
            .rev()
            .filter(|&(_, c)| c == SEPARATOR)
            .map(|(idx, _)| Self(CompactString::from(&self.0[..idx])))
    }

    /// Number of segments below the root (1 for top-level entries).
    pub fn depth(&self) -> u32 {
        self.0.matches(SEPARATOR).count() as u32 + 1
    }

    /// Append a single segment.
    pub fn join(&self, name: &str) -> Result<EntryPath, InventoryError> {
        Self::from_parts(&self.0, name)
    }

    /// Check whether `self` is a proper ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &EntryPath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(self.0.as_str())
            && other.0.as_bytes()[self.0.len()] == SEPARATOR as u8
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntryPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntryPath {
    type Error = InventoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl TryFrom<&str> for EntryPath {
    type Error = InventoryError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntryPath> for String {
    fn from(path: EntryPath) -> Self {
        path.0.into_string()
    }
}
