//! H-Anim skeleton core (engine-agnostic)
//!
//! A Humanoid owns a tree of Joints, Sites, Segments and Displacers, keeps
//! their transforms consistent under incremental edits, and once per frame
//! deforms a shared pool of skin coordinates and normals into caller-owned
//! output sinks. Joints also expose a stable object index and world matrix
//! for building a GPU skinning palette.

pub mod config;
pub mod description;
pub mod displacer;
pub mod editor;
pub mod error;
mod fields;
pub mod humanoid;
pub mod ids;
pub mod joint;
pub mod protocol;
pub mod segment;
pub mod sink;
pub mod site;
pub mod skinning;
pub mod stats;
pub mod transform;

// Re-exports for consumers (loaders and render bridges)
pub use config::Config;
pub use description::{
    DisplacerDescription, FigureDescription, JointDescription, NodeDescription,
    SegmentDescription, SiteDescription,
};
pub use displacer::Displacer;
pub use editor::{DisplacerMut, JointMut, SegmentMut, SiteMut};
pub use error::SkeletonError;
pub use humanoid::{Humanoid, PaletteEntry};
pub use ids::{
    DisplacerId, FigureId, JointId, ObjectIndex, ObjectIndexAllocator, SegmentId, SiteId,
};
pub use joint::{Joint, SourceView};
pub use protocol::{JointChild, NodeRef, ObjectParent, ParentLink, SkeletalNodeRef};
pub use segment::{DisplacementOrder, Segment};
pub use sink::VertexSink;
pub use site::Site;
pub use skinning::VertexSkinner;
pub use stats::UpdateStats;
pub use transform::{matrix_position, matrix_to_array, Trs, IDENTITY};

pub type Result<T> = std::result::Result<T, SkeletonError>;
