//! JWalk-based parallel inventory builder.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use tokio::sync::broadcast;

use syncplan_core::{
    Checksum, Entry, EntryKind, EntryPath, InvalidEntryReason, Inventory, InventoryError,
    InventoryWarning, ScanConfig, WarningKind,
};

use crate::error::ScanError;
use crate::progress::ScanProgress;

/// How often (in walked entries) a progress update is broadcast.
const PROGRESS_INTERVAL: u64 = 1000;

/// Builds an [`Inventory`] of a directory using jwalk for parallel traversal.
pub struct InventoryScanner {
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl InventoryScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self { progress_tx }
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Build an inventory of `config.root`.
    ///
    /// Unreadable directories and files become warnings plus partial regions,
    /// so a later diff treats absence there as unknown rather than deleted.
    pub fn scan(&self, config: &ScanConfig) -> Result<Inventory, ScanError> {
        let start = Instant::now();
        let root_path = config
            .root
            .canonicalize()
            .map_err(|e| ScanError::io(&config.root, e))?;

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory { path: root_path });
        }
        // The walk starts below the root, so a root listing failure would go unseen.
        std::fs::read_dir(&root_path).map_err(|e| ScanError::io(&root_path, e))?;

        let mut inventory = Inventory::new();
        let mut progress = ScanProgress::new();

        let pending = self.collect_entries(config, &root_path, &mut inventory, &mut progress, start)?;

        let compute = config.compute_checksums;
        let finished: Vec<(Entry, Option<InventoryWarning>)> = pending
            .into_par_iter()
            .map(|p| p.finish(compute))
            .collect::<Result<_, _>>()?;

        for (entry, warning) in finished {
            if let Some(warning) = warning {
                // Content could not be fingerprinted, so the entry is low confidence.
                inventory.mark_partial_region(entry.path().clone());
                inventory.warnings.push(warning);
            }
            if entry.is_file() && entry.checksum().is_some() {
                progress.files_hashed += 1;
            }
            inventory.insert(entry)?;
        }

        progress.elapsed = start.elapsed();
        progress.warnings_count = inventory.warnings.len() as u64;
        let _ = self.progress_tx.send(progress.clone());

        tracing::info!(
            root = %root_path.display(),
            entries = inventory.len(),
            warnings = inventory.warnings.len(),
            partial = inventory.is_partial(),
            elapsed_ms = progress.elapsed.as_millis() as u64,
            "inventory scan complete"
        );

        Ok(inventory)
    }

    /// Walk the tree and gather entry metadata.
    fn collect_entries(
        &self,
        config: &ScanConfig,
        root_path: &Path,
        inventory: &mut Inventory,
        progress: &mut ScanProgress,
        start: Instant,
    ) -> Result<Vec<PendingEntry>, ScanError> {
        let parallelism = match config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let matcher = config.ignore_matcher();
        let walk_root = root_path.to_path_buf();

        let walker = WalkDir::new(root_path)
            .parallelism(parallelism)
            .skip_hidden(!config.include_hidden)
            .follow_links(config.follow_symlinks)
            .sort(true)
            .min_depth(1)
            .max_depth(config.max_depth.map(|d| d as usize).unwrap_or(usize::MAX))
            .process_read_dir(move |_depth, _dir, _state, children| {
                // Pruning here keeps ignored directories from being descended into.
                children.retain(|child| match child {
                    Ok(entry) => {
                        let path = entry.parent_path.join(&entry.file_name);
                        let name = entry.file_name.to_string_lossy();
                        let relative = relative_lossy(&walk_root, &path);
                        !matcher.is_ignored(&name, &relative)
                    }
                    Err(_) => true,
                });
            });

        let mut pending = Vec::new();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    tracing::warn!(path = %path.display(), error = %err, "unreadable path during scan");
                    inventory.warnings.push(InventoryWarning::new(
                        path.display().to_string(),
                        err.to_string(),
                        WarningKind::ReadError,
                    ));
                    self.mark_unreadable(inventory, root_path, &path);
                    continue;
                }
            };

            let path = entry.path();
            progress.entries_scanned += 1;

            let relative = match to_entry_path(root_path, &path) {
                Ok(relative) => relative,
                Err(err) if config.strict => return Err(err.into()),
                Err(err) => {
                    inventory.warnings.push(InventoryWarning::rejected(&err));
                    self.mark_unreadable(inventory, root_path, path.parent().unwrap_or(root_path));
                    continue;
                }
            };

            // jwalk yields the directory itself and keeps the listing failure on it.
            if let Some(err) = &entry.read_children_error {
                tracing::warn!(path = %path.display(), error = %err, "unreadable directory during scan");
                let kind = match err.io_error().map(std::io::Error::kind) {
                    Some(std::io::ErrorKind::PermissionDenied) => WarningKind::PermissionDenied,
                    _ => WarningKind::ReadError,
                };
                inventory
                    .warnings
                    .push(InventoryWarning::new(relative.as_str(), err.to_string(), kind));
                inventory.mark_partial_region(relative.clone());
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    inventory.warnings.push(InventoryWarning::new(
                        relative.as_str(),
                        err.to_string(),
                        WarningKind::MetadataError,
                    ));
                    inventory.mark_partial_region(relative);
                    continue;
                }
            };

            let file_type = entry.file_type();
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else if file_type.is_symlink() {
                EntryKind::Symlink
            } else {
                EntryKind::Other
            };

            if kind.is_dir() && config.max_depth.is_some_and(|d| entry.depth as u32 >= d) {
                // Children below the depth limit were never listed.
                inventory.mark_partial_region(relative.clone());
            }

            if kind.is_symlink() && !path.exists() {
                let target = std::fs::read_link(&path)
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default();
                inventory
                    .warnings
                    .push(InventoryWarning::broken_symlink(relative.as_str(), &target));
            }

            let size = if kind.is_file() { metadata.len() } else { 0 };
            if kind.is_file() {
                progress.files_scanned += 1;
                progress.bytes_scanned += size;
            }

            pending.push(PendingEntry {
                path: relative,
                fs_path: path.clone(),
                kind,
                size,
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });

            if progress.entries_scanned % PROGRESS_INTERVAL == 0 {
                progress.current_path = path;
                progress.elapsed = start.elapsed();
                progress.warnings_count = inventory.warnings.len() as u64;
                let _ = self.progress_tx.send(progress.clone());
            }
        }

        Ok(pending)
    }

    /// Flag the region containing an unreadable path.
    fn mark_unreadable(&self, inventory: &mut Inventory, root_path: &Path, path: &Path) {
        match to_entry_path(root_path, path) {
            Ok(relative) => inventory.mark_partial_region(relative),
            Err(_) => inventory.mark_partial(),
        }
    }
}

impl Default for InventoryScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata gathered during the walk, awaiting its checksum.
struct PendingEntry {
    path: EntryPath,
    fs_path: PathBuf,
    kind: EntryKind,
    size: u64,
    modified: Option<DateTime<Utc>>,
}

impl PendingEntry {
    /// Compute the checksum (if requested) and validate into an entry.
    fn finish(self, compute: bool) -> Result<(Entry, Option<InventoryWarning>), InventoryError> {
        let (checksum, warning) = match self.kind {
            EntryKind::File if compute => match hash_file(&self.fs_path) {
                Ok(sum) => (Some(sum), None),
                Err(err) => (None, Some(InventoryWarning::read_error(self.path.as_str(), &err))),
            },
            EntryKind::Symlink if compute => match std::fs::read_link(&self.fs_path) {
                Ok(target) => (Some(Checksum::of(target.as_os_str().as_encoded_bytes())), None),
                Err(err) => (None, Some(InventoryWarning::read_error(self.path.as_str(), &err))),
            },
            _ => (None, None),
        };

        let size = self.kind.is_file().then_some(self.size);
        let entry = Entry::new(self.kind, self.path, size, self.modified, checksum)?;
        Ok((entry, warning))
    }
}

/// Compute the BLAKE3 checksum of a file, memory-mapping large files.
pub fn hash_file(path: &Path) -> std::io::Result<Checksum> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap_rayon(path)?;
    Ok(Checksum::new(*hasher.finalize().as_bytes()))
}

/// Convert a filesystem path under `root` to a logical entry path.
fn to_entry_path(root: &Path, path: &Path) -> Result<EntryPath, InventoryError> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let display = relative.display().to_string();

    let mut segments = Vec::new();
    for component in relative.components() {
        if let Component::Normal(segment) = component {
            let segment = segment
                .to_str()
                .ok_or_else(|| InventoryError::invalid(&display, InvalidEntryReason::NonUtf8))?;
            segments.push(segment);
        }
    }
    EntryPath::new(&segments.join("/"))
}

/// Best-effort relative path for ignore matching.
fn relative_lossy(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
