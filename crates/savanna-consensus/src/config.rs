use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a library embedder supplies to a [`crate::controller::FinalityController`]
/// (SPEC_FULL §4.9). There is no network or CLI surface here — spec §6 keeps
/// those explicitly out of scope, the way `merklith-node::config::Config`
/// carries fields this crate simply doesn't have a use for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Where the fork-db snapshot is written on stop and read on start.
    /// `None` disables persistence entirely — the controller starts empty
    /// every time.
    pub snapshot_path: Option<PathBuf>,

    /// Whether `add` runs the feature-compatibility predicate (spec §4.6,
    /// `incompatible_features`). Disabling it is only useful for tests that
    /// don't care about feature gating.
    pub validate_features: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { snapshot_path: None, validate_features: true }
    }
}
