//! Figure configuration.

use serde::{Deserialize, Serialize};

/// Capacity hints and skinning policy for one figure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial capacity for the skeleton and auxiliary node lists.
    pub skeleton_capacity: usize,
    /// Initial capacity (in vertices) for skin arrays and skinning scratch.
    pub vertex_capacity: usize,
    /// Renormalise blended normals after skinning.
    pub normalize_normals: bool,
    /// Copy vertices no joint influences straight from the source; when
    /// false they are written as zero.
    pub pass_through_unweighted: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skeleton_capacity: 16,
            vertex_capacity: 1024,
            normalize_normals: true,
            pass_through_unweighted: true,
        }
    }
}
