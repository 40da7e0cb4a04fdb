//! Error types for reconciliation.

use syncplan_core::{EntryPath, InventoryError};
use thiserror::Error;

/// Errors that abort diffing or plan construction.
///
/// Data-level disagreements are never errors; they surface as conflicts.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// An inventory broke its structural contract.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Plan ordering found contradictory path dependencies.
    #[error("Contradictory path dependencies between: {}", format_paths(.paths))]
    CyclicPath { paths: Vec<EntryPath> },
}

fn format_paths(paths: &[EntryPath]) -> String {
    paths
        .iter()
        .map(EntryPath::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure reported by a transport for a single action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct TransportError {
    /// Path of the failed action.
    pub path: EntryPath,
    /// A human-readable error message.
    pub message: String,
}

impl TransportError {
    /// Create a new transport error.
    pub fn new(path: EntryPath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}
