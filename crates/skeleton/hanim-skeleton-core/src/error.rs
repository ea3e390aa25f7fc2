//! Error types for the skeleton engine

use serde::{Deserialize, Serialize};

/// Errors raised synchronously by figure mutators and the update pass.
///
/// A rejected call never applies part of its mutation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SkeletonError {
    /// A vector or array argument is shorter than the documented minimum
    #[error("Invalid argument for {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// A node kind that is not allowed in the target list
    #[error("Invalid child type for {parent}: {found} is not allowed")]
    InvalidChildType { parent: String, found: String },

    /// A structural operation found a node wired to an unexpected owner
    #[error("Inconsistent index for {node}: {reason}")]
    InconsistentIndex { node: String, reason: String },

    /// Handle does not resolve to a node of this figure
    #[error("Unknown node: {node}")]
    UnknownNode { node: String },

    /// A skin or displacement index points past the valid vertex count
    #[error("Vertex index {index} used by {joint} is out of range (available: {available})")]
    SkinIndexOutOfRange {
        joint: String,
        index: usize,
        available: usize,
    },

    /// A figure description could not be turned into a figure
    #[error("Invalid figure description: {reason}")]
    Description { reason: String },
}

impl SkeletonError {
    pub(crate) fn too_short(field: &str, needed: usize, got: usize) -> Self {
        Self::InvalidArgument {
            field: field.to_string(),
            reason: format!("expected at least {needed} values, got {got}"),
        }
    }

    /// Whether the caller can fix the input and try again.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InconsistentIndex { .. })
    }

    /// Get error category for logging
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "argument",
            Self::InvalidChildType { .. } | Self::UnknownNode { .. } => "topology",
            Self::InconsistentIndex { .. } | Self::SkinIndexOutOfRange { .. } => "index",
            Self::Description { .. } => "description",
        }
    }
}

impl From<serde_json::Error> for SkeletonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Description {
            reason: err.to_string(),
        }
    }
}
