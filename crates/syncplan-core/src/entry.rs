//! Entry values: one filesystem object's identity and fingerprint.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InvalidChecksum, InvalidEntryReason, InventoryError};
use crate::path::EntryPath;

/// Type of filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Other file types (sockets, devices, etc.).
    Other,
}

impl EntryKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File)
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }

    /// Whether entries of this kind may carry a checksum.
    pub fn allows_checksum(&self) -> bool {
        matches!(self, Self::File | Self::Symlink)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Directory => write!(f, "directory"),
            Self::Symlink => write!(f, "symlink"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// BLAKE3 content digest.
///
/// Serialized as a 64-character lowercase hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    /// Create a new checksum from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute the checksum of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Get the checksum as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        let mut bytes = [0u8; 32];
        for (byte, pair) in bytes.iter_mut().zip(hex.as_bytes().chunks_exact(2)) {
            let pair = std::str::from_utf8(pair).ok()?;
            *byte = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl TryFrom<String> for Checksum {
    type Error = InvalidChecksum;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or(InvalidChecksum(value))
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.to_hex()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Result of comparing two entries' content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentMatch {
    /// Same content.
    Equal,
    /// Content definitely differs.
    Differs,
    /// No checksum to decide with and the timestamps disagree. Only produced
    /// by [`Entry::compare_content_with_timestamps`].
    Uncertain,
}

/// Immutable fingerprint of one filesystem object.
///
/// Built through the validating constructors; an `Entry` that exists is always
/// well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEntry")]
pub struct Entry {
    kind: EntryKind,
    path: EntryPath,
    size: u64,
    modified: Option<DateTime<Utc>>,
    checksum: Option<Checksum>,
}

impl Entry {
    /// Create an entry of any kind, validating its metadata.
    ///
    /// `size` is required for files and ignored for every other kind.
    /// Timestamps are truncated to whole seconds.
    pub fn new(
        kind: EntryKind,
        path: EntryPath,
        size: Option<u64>,
        modified: Option<DateTime<Utc>>,
        checksum: Option<Checksum>,
    ) -> Result<Self, InventoryError> {
        let size = match (kind, size) {
            (EntryKind::File, Some(size)) => size,
            (EntryKind::File, None) => {
                return Err(InventoryError::invalid(
                    path.as_str(),
                    InvalidEntryReason::MissingSize,
                ));
            }
            _ => 0,
        };

        if checksum.is_some() && !kind.allows_checksum() {
            return Err(InventoryError::invalid(
                path.as_str(),
                InvalidEntryReason::UnexpectedChecksum(kind),
            ));
        }

        Ok(Self {
            kind,
            path,
            size,
            modified: modified.map(|t| t.trunc_subsecs(0)),
            checksum,
        })
    }

    /// Create a file entry.
    pub fn file(
        path: &str,
        size: u64,
        modified: Option<DateTime<Utc>>,
        checksum: Option<Checksum>,
    ) -> Result<Self, InventoryError> {
        Self::new(EntryKind::File, EntryPath::new(path)?, Some(size), modified, checksum)
    }

    /// Create a directory entry.
    pub fn directory(path: &str, modified: Option<DateTime<Utc>>) -> Result<Self, InventoryError> {
        Self::new(EntryKind::Directory, EntryPath::new(path)?, None, modified, None)
    }

    /// Create a symlink entry. The checksum, if any, covers the link target text.
    pub fn symlink(
        path: &str,
        modified: Option<DateTime<Utc>>,
        target_checksum: Option<Checksum>,
    ) -> Result<Self, InventoryError> {
        Self::new(EntryKind::Symlink, EntryPath::new(path)?, None, modified, target_checksum)
    }

    /// Create an entry for a socket, device or similar object.
    pub fn other(path: &str, modified: Option<DateTime<Utc>>) -> Result<Self, InventoryError> {
        Self::new(EntryKind::Other, EntryPath::new(path)?, None, modified, None)
    }

    /// Object type.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Identity key.
    pub fn path(&self) -> &EntryPath {
        &self.path
    }

    /// Size in bytes (0 for anything but files).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Last modification time, if known.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    /// Content checksum, if computed.
    pub fn checksum(&self) -> Option<Checksum> {
        self.checksum
    }

    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Check if this entry is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Compare content for sync purposes.
    ///
    /// Same kind, same size for files, and the same checksum where both sides
    /// have one. A missing checksum leaves size as the only signal, so
    /// timestamps never decide equality here.
    pub fn compare_content(&self, other: &Entry) -> ContentMatch {
        self.compare_content_with_timestamps(other, false)
    }

    /// Like [`compare_content`](Self::compare_content), but when a checksum is
    /// missing and `timestamp_heuristic` is set, differing modification times
    /// yield [`ContentMatch::Uncertain`].
    pub fn compare_content_with_timestamps(
        &self,
        other: &Entry,
        timestamp_heuristic: bool,
    ) -> ContentMatch {
        if self.kind != other.kind {
            return ContentMatch::Differs;
        }

        match self.kind {
            EntryKind::Directory | EntryKind::Other => ContentMatch::Equal,
            EntryKind::File if self.size != other.size => ContentMatch::Differs,
            EntryKind::File | EntryKind::Symlink => match (self.checksum, other.checksum) {
                (Some(a), Some(b)) if a == b => ContentMatch::Equal,
                (Some(_), Some(_)) => ContentMatch::Differs,
                _ if !timestamp_heuristic => ContentMatch::Equal,
                _ => match (self.modified, other.modified) {
                    (Some(a), Some(b)) if a != b => ContentMatch::Uncertain,
                    _ => ContentMatch::Equal,
                },
            },
        }
    }

    /// Check whether two entries are content-equal.
    pub fn content_eq(&self, other: &Entry) -> bool {
        self.compare_content(other) == ContentMatch::Equal
    }
}

/// Unvalidated wire form of an [`Entry`].
#[derive(Deserialize)]
struct RawEntry {
    kind: EntryKind,
    path: EntryPath,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified: Option<DateTime<Utc>>,
    #[serde(default)]
    checksum: Option<Checksum>,
}

impl TryFrom<RawEntry> for Entry {
    type Error = InventoryError;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        Self::new(raw.kind, raw.path, raw.size, raw.modified, raw.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(secs, 0).single()
    }

    #[test]
    fn test_checksum_hex() {
        let sum = Checksum::new([0xab; 32]);
        assert_eq!(sum.to_hex().len(), 64);
        assert!(sum.to_hex().starts_with("abab"));
        assert_eq!(Checksum::from_hex(&sum.to_hex()), Some(sum));
    }

    #[test]
    fn test_checksum_from_hex_rejects_malformed() {
        assert!(Checksum::from_hex("abc").is_none());
        assert!(Checksum::from_hex(&"zz".repeat(32)).is_none());
        assert!(Checksum::from_hex(&"é".repeat(32)).is_none());
        assert!(Checksum::from_hex(&"+a".repeat(32)).is_none());
    }

    #[test]
    fn test_checksum_serializes_as_hex() {
        let entry = Entry::file("a", 3, None, Some(Checksum::of(b"abc"))).unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["checksum"], serde_json::json!(Checksum::of(b"abc").to_hex()));

        let back: Entry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);

        let bad = r#"{"kind":"File","path":"a","size":3,"checksum":[1,2,3]}"#;
        assert!(serde_json::from_str::<Entry>(bad).is_err());
    }

    #[test]
    fn test_file_requires_size() {
        let err = Entry::new(
            EntryKind::File,
            EntryPath::new("a.txt").unwrap(),
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InvalidEntry {
                reason: InvalidEntryReason::MissingSize,
                ..
            }
        ));
    }

    #[test]
    fn test_directory_rejects_checksum() {
        let err = Entry::new(
            EntryKind::Directory,
            EntryPath::new("dir").unwrap(),
            None,
            None,
            Some(Checksum::of(b"x")),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InvalidEntry {
                reason: InvalidEntryReason::UnexpectedChecksum(EntryKind::Directory),
                ..
            }
        ));
    }

    #[test]
    fn test_timestamp_truncated_to_seconds() {
        let precise = Utc.timestamp_opt(100, 750_000_000).single();
        let entry = Entry::file("a", 1, precise, None).unwrap();
        assert_eq!(entry.modified(), at(100));
    }

    #[test]
    fn test_content_equality_ignores_timestamp_when_checksums_match() {
        let a = Entry::file("a", 10, at(1), Some(Checksum::of(b"one"))).unwrap();
        let b = Entry::file("a", 10, at(5000), Some(Checksum::of(b"one"))).unwrap();
        assert!(a.content_eq(&b));
    }

    #[test]
    fn test_content_without_checksum_ignores_timestamp() {
        let a = Entry::file("a", 10, at(1), None).unwrap();
        let b = Entry::file("a", 10, at(2), None).unwrap();
        assert_eq!(a.compare_content(&b), ContentMatch::Equal);

        let c = Entry::file("a", 10, at(2), Some(Checksum::of(b"x"))).unwrap();
        assert_eq!(a.compare_content(&c), ContentMatch::Equal);

        let d = Entry::file("a", 11, at(1), None).unwrap();
        assert_eq!(a.compare_content(&d), ContentMatch::Differs);
    }

    #[test]
    fn test_timestamp_heuristic_marks_uncertain() {
        let a = Entry::file("a", 10, at(1), None).unwrap();
        let b = Entry::file("a", 10, at(2), Some(Checksum::of(b"x"))).unwrap();
        assert_eq!(a.compare_content_with_timestamps(&b, true), ContentMatch::Uncertain);

        let c = Entry::file("a", 10, None, None).unwrap();
        assert_eq!(a.compare_content_with_timestamps(&c, true), ContentMatch::Equal);

        let d = Entry::file("a", 10, at(5), Some(Checksum::of(b"x"))).unwrap();
        assert_eq!(b.compare_content_with_timestamps(&d, true), ContentMatch::Equal);
    }

    #[test]
    fn test_kind_mismatch_differs() {
        let file = Entry::file("b", 0, None, None).unwrap();
        let dir = Entry::directory("b", None).unwrap();
        assert_eq!(file.compare_content(&dir), ContentMatch::Differs);
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"{"kind":"File","path":"x/y","size":null}"#;
        assert!(serde_json::from_str::<Entry>(json).is_err());

        let json = r#"{"kind":"Directory","path":"/x/"}"#;
        let entry: Entry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.path().as_str(), "x");
    }
}
