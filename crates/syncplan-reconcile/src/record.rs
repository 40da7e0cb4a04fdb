//! Change records produced by the differ.

use std::fmt;

use serde::Serialize;

use syncplan_core::{Entry, EntryKind, EntryPath};

/// What happened to a path between two inventories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeAction {
    /// Present only in the after inventory.
    Create,
    /// Present in both, same kind, content differs.
    Update,
    /// Present only in the before inventory.
    Delete,
    /// Present in both with a different kind.
    TypeChange,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::TypeChange => write!(f, "type-change"),
        }
    }
}

/// One detected difference between two inventories.
///
/// `source` is the entry from the after inventory (the state being
/// propagated) and `target` the entry from the before inventory (the state
/// being replaced). The constructors guarantee which of the two are present
/// for each action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    path: EntryPath,
    action: ChangeAction,
    source: Option<Entry>,
    target: Option<Entry>,
    low_confidence: bool,
}

impl ChangeRecord {
    /// A path that appeared.
    pub fn create(source: Entry) -> Self {
        Self {
            path: source.path().clone(),
            action: ChangeAction::Create,
            source: Some(source),
            target: None,
            low_confidence: false,
        }
    }

    /// A path that disappeared.
    pub fn delete(target: Entry) -> Self {
        Self {
            path: target.path().clone(),
            action: ChangeAction::Delete,
            source: None,
            target: Some(target),
            low_confidence: false,
        }
    }

    /// Content changed under the same kind.
    pub fn update(target: Entry, source: Entry) -> Self {
        Self {
            path: source.path().clone(),
            action: ChangeAction::Update,
            source: Some(source),
            target: Some(target),
            low_confidence: false,
        }
    }

    /// The object at the path changed kind.
    pub fn type_change(target: Entry, source: Entry) -> Self {
        Self {
            path: source.path().clone(),
            action: ChangeAction::TypeChange,
            source: Some(source),
            target: Some(target),
            low_confidence: false,
        }
    }

    /// Tag the record as derived from incomplete information.
    pub fn with_low_confidence(mut self, low_confidence: bool) -> Self {
        self.low_confidence = low_confidence;
        self
    }

    /// Path the change applies to.
    pub fn path(&self) -> &EntryPath {
        &self.path
    }

    /// Kind of change.
    pub fn action(&self) -> ChangeAction {
        self.action
    }

    /// Entry from the after inventory.
    pub fn source(&self) -> Option<&Entry> {
        self.source.as_ref()
    }

    /// Entry from the before inventory.
    pub fn target(&self) -> Option<&Entry> {
        self.target.as_ref()
    }

    /// Whether the record came from a partial region or a checksum-less comparison.
    pub fn is_low_confidence(&self) -> bool {
        self.low_confidence
    }

    /// Kind the path ends up as, if it still exists.
    pub fn resulting_kind(&self) -> Option<EntryKind> {
        self.source.as_ref().map(Entry::kind)
    }

    /// Kind the path had before, if it existed.
    pub fn previous_kind(&self) -> Option<EntryKind> {
        self.target.as_ref().map(Entry::kind)
    }

    /// Bytes the transport has to move to apply this record.
    pub fn transfer_size(&self) -> u64 {
        match self.action {
            ChangeAction::Delete => 0,
            _ => self.source.as_ref().map_or(0, Entry::size),
        }
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.path)?;
        if self.low_confidence {
            write!(f, " (low confidence)")?;
        }
        Ok(())
    }
}
