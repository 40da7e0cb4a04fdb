//! Scan progress reporting.

use std::path::PathBuf;
use std::time::Duration;

/// Progress information during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Number of entries walked so far.
    pub entries_scanned: u64,
    /// Number of files among them.
    pub files_scanned: u64,
    /// Number of files checksummed so far.
    pub files_hashed: u64,
    /// Total bytes of the files seen.
    pub bytes_scanned: u64,
    /// Current path being scanned.
    pub current_path: PathBuf,
    /// Number of warnings encountered.
    pub warnings_count: u64,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            entries_scanned: 0,
            files_scanned: 0,
            files_hashed: 0,
            bytes_scanned: 0,
            current_path: PathBuf::new(),
            warnings_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate scan rate in entries per second.
    pub fn entries_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.entries_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_with_zero_elapsed() {
        let progress = ScanProgress::new();
        assert_eq!(progress.entries_per_second(), 0.0);
    }

    #[test]
    fn test_rate() {
        let progress = ScanProgress {
            entries_scanned: 200,
            elapsed: Duration::from_secs(2),
            ..ScanProgress::new()
        };
        assert_eq!(progress.entries_per_second(), 100.0);
    }
}
