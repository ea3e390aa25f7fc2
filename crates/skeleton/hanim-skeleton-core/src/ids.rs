//! Node handles and the object index allocator.
//!
//! Nodes live in arenas owned by a [`crate::Humanoid`]. Handles are small
//! copyable keys carrying the owning figure id next to the arena slot, so a
//! handle presented to the wrong figure is caught instead of silently
//! resolving to an unrelated node.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Identity of one Humanoid instance; unique for the process lifetime.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FigureId(pub u32);

static NEXT_FIGURE: AtomicU32 = AtomicU32::new(0);

impl FigureId {
    pub(crate) fn next() -> Self {
        FigureId(NEXT_FIGURE.fetch_add(1, Ordering::Relaxed))
    }
}

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
        pub struct $name {
            figure: FigureId,
            slot: u32,
        }

        impl $name {
            #[inline]
            pub(crate) fn new(figure: FigureId, slot: usize) -> Self {
                Self {
                    figure,
                    slot: slot as u32,
                }
            }

            /// Figure that created this handle.
            #[inline]
            pub fn figure(&self) -> FigureId {
                self.figure
            }

            #[inline]
            pub(crate) fn slot(&self) -> usize {
                self.slot as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}/{}", $label, self.figure.0, self.slot)
            }
        }
    };
}

node_id!(
    /// Handle to a transform-bearing skeleton node.
    JointId,
    "joint"
);
node_id!(
    /// Handle to a non-deforming attachment leaf.
    SiteId,
    "site"
);
node_id!(
    /// Handle to a rigid mesh grouping.
    SegmentId,
    "segment"
);
node_id!(
    /// Handle to a weighted per-vertex offset table.
    DisplacerId,
    "displacer"
);

/// Stable palette slot handed to a joint when it is attached to a figure.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ObjectIndex(pub u32);

/// Monotonic counter owned by the figure root.
///
/// This is the only piece of the engine that may be touched from several
/// threads at once, so allocation is a single atomic increment. Indices are
/// never reused.
#[derive(Debug, Default)]
pub struct ObjectIndexAllocator {
    next: AtomicU32,
}

impl ObjectIndexAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current counter value, then advance it.
    #[inline]
    pub fn next_index(&self) -> ObjectIndex {
        ObjectIndex(self.next.fetch_add(1, Ordering::AcqRel))
    }

    /// Value the next call to [`Self::next_index`] will return.
    #[inline]
    pub fn peek(&self) -> ObjectIndex {
        ObjectIndex(self.next.load(Ordering::Acquire))
    }
}
