//! Error and warning types for entries and inventories.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::EntryKind;

/// Errors raised while constructing entries or assembling an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// An entry was rejected at construction.
    #[error("Invalid entry {path:?}: {reason}")]
    InvalidEntry {
        path: String,
        reason: InvalidEntryReason,
    },

    /// Two entries share the same path.
    #[error("Duplicate path in inventory: {path}")]
    DuplicatePath { path: String },

    /// An entry's parent is missing or is not a directory.
    #[error("Entry {path} has no parent directory {parent}")]
    MissingParent { path: String, parent: String },
}

impl InventoryError {
    /// Create an invalid entry error.
    pub fn invalid(path: impl Into<String>, reason: InvalidEntryReason) -> Self {
        Self::InvalidEntry {
            path: path.into(),
            reason,
        }
    }

    /// Path the error refers to.
    pub fn path(&self) -> &str {
        match self {
            Self::InvalidEntry { path, .. }
            | Self::DuplicatePath { path }
            | Self::MissingParent { path, .. } => path,
        }
    }
}

/// A checksum string that is not 64 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid checksum {0:?}: expected 64 hex digits")]
pub struct InvalidChecksum(pub String);

/// Why an entry was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidEntryReason {
    /// Path is empty after normalization.
    EmptyPath,
    /// Path contains a `..` segment.
    PathTraversal,
    /// A segment contains a forbidden character.
    InvalidSegment,
    /// A file entry has no size.
    MissingSize,
    /// A checksum was supplied for a kind that never carries one.
    UnexpectedChecksum(EntryKind),
    /// Name is not valid UTF-8.
    NonUtf8,
}

impl fmt::Display for InvalidEntryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPath => write!(f, "path is empty"),
            Self::PathTraversal => write!(f, "path contains '..'"),
            Self::InvalidSegment => write!(f, "path segment contains a forbidden character"),
            Self::MissingSize => write!(f, "file entry has no size"),
            Self::UnexpectedChecksum(kind) => write!(f, "{kind} entries cannot carry a checksum"),
            Self::NonUtf8 => write!(f, "name is not valid UTF-8"),
        }
    }
}

/// Kind of inventory warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Symbolic link target does not exist.
    BrokenSymlink,
    /// Error reading file/directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Entry rejected by validation and left out.
    InvalidEntry,
}

/// Non-fatal problem recorded while building an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryWarning {
    /// Path where the warning occurred.
    pub path: String,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl InventoryWarning {
    /// Create a new warning.
    pub fn new(path: impl Into<String>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning for an entry that failed validation.
    pub fn rejected(error: &InventoryError) -> Self {
        Self {
            path: error.path().to_string(),
            message: error.to_string(),
            kind: WarningKind::InvalidEntry,
        }
    }

    /// Create a broken symlink warning.
    pub fn broken_symlink(path: impl Into<String>, target: &str) -> Self {
        let path = path.into();
        Self {
            message: format!("Broken symlink: {path} -> {target}"),
            path,
            kind: WarningKind::BrokenSymlink,
        }
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<String>, error: &std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => WarningKind::PermissionDenied,
            _ => WarningKind::ReadError,
        };
        Self {
            path: path.into(),
            message: format!("Read error: {error}"),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_entry_message() {
        let err = InventoryError::invalid("a/../b", InvalidEntryReason::PathTraversal);
        assert_eq!(err.path(), "a/../b");
        assert!(err.to_string().contains("'..'"));
    }

    #[test]
    fn test_read_error_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let warning = InventoryWarning::read_error("secret", &io);
        assert_eq!(warning.kind, WarningKind::PermissionDenied);
    }
}
