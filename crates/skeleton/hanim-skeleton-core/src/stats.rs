//! Work counters accumulated across update passes.

use serde::{Deserialize, Serialize};

/// Monotonic counters; compare snapshots to observe how much an update did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UpdateStats {
    /// Update calls that found something dirty.
    pub passes: u64,
    /// Humanoid root matrix compositions.
    pub root_recomposes: u64,
    /// Joint or Site local matrix compositions.
    pub local_recomposes: u64,
    /// Joint world matrix compositions.
    pub world_recomposes: u64,
    /// Site world matrix compositions.
    pub site_updates: u64,
    /// Weighted vertex contributions written by the skinner.
    pub skinned_vertices: u64,
}

impl UpdateStats {
    /// Sum of every recompute counter, for cheap "did anything happen" checks.
    pub fn total_work(&self) -> u64 {
        self.root_recomposes
            + self.local_recomposes
            + self.world_recomposes
            + self.site_updates
            + self.skinned_vertices
    }
}
