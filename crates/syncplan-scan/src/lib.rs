//! File system inventory builder for syncplan.
//!
//! This crate walks a directory in parallel (jwalk/rayon) and produces an
//! [`Inventory`]: one [`Entry`] per file, directory, symlink or other object,
//! fingerprinted with size, modification time and a BLAKE3 checksum.
//!
//! Anything that cannot be read is reported as a warning and its subtree is
//! flagged as a partial region instead of silently disappearing, so a diff
//! against this inventory never mistakes "unreadable" for "deleted".
//!
//! # Example
//!
//! ```rust,no_run
//! use syncplan_scan::{InventoryScanner, ScanConfig};
//!
//! let config = ScanConfig::new("/path/to/share");
//! let inventory = InventoryScanner::new().scan(&config).unwrap();
//!
//! println!("{} entries", inventory.len());
//! println!("partial: {}", inventory.is_partial());
//! ```

mod error;
mod progress;
mod scanner;

pub use error::ScanError;
pub use progress::ScanProgress;
pub use scanner::{InventoryScanner, hash_file};

// Re-export core types for convenience
pub use syncplan_core::{
    Checksum, Entry, EntryKind, EntryPath, Inventory, InventoryWarning, ScanConfig, WarningKind,
};
