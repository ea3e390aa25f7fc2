//! Node references and the child-to-parent notification contract.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SkeletonError;
use crate::ids::{DisplacerId, JointId, ObjectIndex, SegmentId, SiteId};

/// Any node handle of a figure.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Joint(JointId),
    Site(SiteId),
    Segment(SegmentId),
    Displacer(DisplacerId),
}

impl NodeRef {
    pub fn kind(&self) -> &'static str {
        match self {
            NodeRef::Joint(_) => "Joint",
            NodeRef::Site(_) => "Site",
            NodeRef::Segment(_) => "Segment",
            NodeRef::Displacer(_) => "Displacer",
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Joint(id) => id.fmt(f),
            NodeRef::Site(id) => id.fmt(f),
            NodeRef::Segment(id) => id.fmt(f),
            NodeRef::Displacer(id) => id.fmt(f),
        }
    }
}

impl From<JointId> for NodeRef {
    fn from(id: JointId) -> Self {
        NodeRef::Joint(id)
    }
}

impl From<SiteId> for NodeRef {
    fn from(id: SiteId) -> Self {
        NodeRef::Site(id)
    }
}

impl From<SegmentId> for NodeRef {
    fn from(id: SegmentId) -> Self {
        NodeRef::Segment(id)
    }
}

impl From<DisplacerId> for NodeRef {
    fn from(id: DisplacerId) -> Self {
        NodeRef::Displacer(id)
    }
}

/// Entry of a Humanoid skeleton list: only Joints and Sites qualify.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SkeletalNodeRef {
    Joint(JointId),
    Site(SiteId),
}

impl TryFrom<NodeRef> for SkeletalNodeRef {
    type Error = SkeletonError;

    fn try_from(node: NodeRef) -> Result<Self, Self::Error> {
        match node {
            NodeRef::Joint(id) => Ok(SkeletalNodeRef::Joint(id)),
            NodeRef::Site(id) => Ok(SkeletalNodeRef::Site(id)),
            other => Err(SkeletonError::InvalidChildType {
                parent: "Humanoid.skeleton".into(),
                found: other.kind().into(),
            }),
        }
    }
}

impl From<SkeletalNodeRef> for NodeRef {
    fn from(node: SkeletalNodeRef) -> Self {
        match node {
            SkeletalNodeRef::Joint(id) => NodeRef::Joint(id),
            SkeletalNodeRef::Site(id) => NodeRef::Site(id),
        }
    }
}

/// Child of a Joint: Joints, Sites and Segments.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum JointChild {
    Joint(JointId),
    Site(SiteId),
    Segment(SegmentId),
}

impl TryFrom<NodeRef> for JointChild {
    type Error = SkeletonError;

    fn try_from(node: NodeRef) -> Result<Self, Self::Error> {
        match node {
            NodeRef::Joint(id) => Ok(JointChild::Joint(id)),
            NodeRef::Site(id) => Ok(JointChild::Site(id)),
            NodeRef::Segment(id) => Ok(JointChild::Segment(id)),
            NodeRef::Displacer(_) => Err(SkeletonError::InvalidChildType {
                parent: "Joint.children".into(),
                found: node.kind().into(),
            }),
        }
    }
}

impl From<JointChild> for NodeRef {
    fn from(node: JointChild) -> Self {
        match node {
            JointChild::Joint(id) => NodeRef::Joint(id),
            JointChild::Site(id) => NodeRef::Site(id),
            JointChild::Segment(id) => NodeRef::Segment(id),
        }
    }
}

/// Where a node is wired into its figure.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ParentLink {
    #[default]
    Detached,
    Humanoid,
    Joint(JointId),
}

/// Contract a child uses to reach the figure root.
pub trait ObjectParent {
    /// A direct child changed and needs to be visited by the next update.
    fn child_update_required(&mut self, child: NodeRef);

    /// Hand out the next stable palette slot. Safe to call concurrently.
    fn request_next_object_index(&self) -> ObjectIndex;
}
