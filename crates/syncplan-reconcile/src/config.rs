//! Reconciliation configuration.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// What the resolver does with divergent changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConflictMode {
    /// Report every divergence as a conflict, with the policy's suggestion attached.
    #[default]
    Flag,
    /// Act on decisive policy suggestions; only undecided cases stay conflicts.
    AutoResolve,
}

/// Configuration for a reconciliation pass.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct ReconcileConfig {
    /// How divergent changes are surfaced.
    #[builder(default)]
    #[serde(default)]
    pub conflict_mode: ConflictMode,

    /// Seconds within which two modification times count as a tie.
    #[builder(default = "0")]
    #[serde(default)]
    pub clock_skew_tolerance: u64,

    /// Reject inventories that are structurally incomplete without being flagged partial.
    #[builder(default = "false")]
    #[serde(default)]
    pub require_complete: bool,

    /// Turn deletes observed in partial regions into skips.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub skip_low_confidence_deletes: bool,

    /// Treat differing modification times as a low-confidence update when a
    /// checksum is missing. Off by default: size alone decides then.
    #[builder(default = "false")]
    #[serde(default)]
    pub timestamp_heuristic: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            conflict_mode: ConflictMode::Flag,
            clock_skew_tolerance: 0,
            require_complete: false,
            skip_low_confidence_deletes: true,
            timestamp_heuristic: false,
        }
    }
}

impl ReconcileConfig {
    /// Create a new config builder.
    pub fn builder() -> ReconcileConfigBuilder {
        ReconcileConfigBuilder::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_match_default() {
        let built = ReconcileConfig::builder().build().unwrap();
        let default = ReconcileConfig::default();
        assert_eq!(built.conflict_mode, default.conflict_mode);
        assert_eq!(built.clock_skew_tolerance, default.clock_skew_tolerance);
        assert_eq!(built.require_complete, default.require_complete);
        assert_eq!(built.skip_low_confidence_deletes, default.skip_low_confidence_deletes);
        assert_eq!(built.timestamp_heuristic, default.timestamp_heuristic);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ReconcileConfig = serde_json::from_str(r#"{"conflict_mode":"AutoResolve"}"#).unwrap();
        assert_eq!(config.conflict_mode, ConflictMode::AutoResolve);
        assert!(config.skip_low_confidence_deletes);
        assert!(!config.timestamp_heuristic);
    }
}
