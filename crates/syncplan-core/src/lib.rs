//! Core types for syncplan.
//!
//! This crate provides the value types shared by the rest of the workspace:
//! entry paths, entries with their content fingerprints, inventories of one
//! location, and scan configuration.

mod config;
mod entry;
mod error;
mod inventory;
mod path;

pub use config::{IgnoreMatcher, ScanConfig, ScanConfigBuilder};
pub use entry::{Checksum, ContentMatch, Entry, EntryKind};
pub use error::{
    InvalidChecksum, InvalidEntryReason, InventoryError, InventoryWarning, WarningKind,
};
pub use inventory::{Inventory, InventoryStats};
pub use path::{EntryPath, SEPARATOR};
