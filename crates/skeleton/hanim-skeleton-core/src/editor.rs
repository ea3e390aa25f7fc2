//! Borrow-scoped node editors.
//!
//! An editor pairs a node handle with exclusive access to its figure so a
//! field change can report itself up the parent chain. Joint and Site edits
//! report; Segment and Displacer edits do not (see
//! [`crate::Humanoid::force_update`]).

use crate::displacer::Displacer;
use crate::error::SkeletonError;
use crate::fields::replace_valid;
use crate::humanoid::Humanoid;
use crate::ids::{DisplacerId, JointId, SegmentId, SiteId};
use crate::joint::Joint;
use crate::protocol::{JointChild, NodeRef, ParentLink};
use crate::segment::{DisplacementOrder, Segment};
use crate::site::Site;
use crate::sink::VertexSink;
use crate::transform::{Trs, TrsField};
use crate::Result;

impl<S: VertexSink> Humanoid<S> {
    pub fn joint_mut(&mut self, id: JointId) -> Result<JointMut<'_, S>> {
        self.check_node(id.into())?;
        Ok(JointMut { fig: self, id })
    }

    pub fn site_mut(&mut self, id: SiteId) -> Result<SiteMut<'_, S>> {
        self.check_node(id.into())?;
        Ok(SiteMut { fig: self, id })
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> Result<SegmentMut<'_, S>> {
        self.check_node(id.into())?;
        Ok(SegmentMut { fig: self, id })
    }

    pub fn displacer_mut(&mut self, id: DisplacerId) -> Result<DisplacerMut<'_, S>> {
        self.check_node(id.into())?;
        Ok(DisplacerMut { fig: self, id })
    }
}

macro_rules! trs_setters {
    () => {
        pub fn set_center(&mut self, val: &[f32]) -> Result<()> {
            self.set_trs_field(TrsField::Center, val)
        }

        pub fn set_rotation(&mut self, val: &[f32]) -> Result<()> {
            self.set_trs_field(TrsField::Rotation, val)
        }

        pub fn set_scale(&mut self, val: &[f32]) -> Result<()> {
            self.set_trs_field(TrsField::Scale, val)
        }

        pub fn set_scale_orientation(&mut self, val: &[f32]) -> Result<()> {
            self.set_trs_field(TrsField::ScaleOrientation, val)
        }

        pub fn set_translation(&mut self, val: &[f32]) -> Result<()> {
            self.set_trs_field(TrsField::Translation, val)
        }
    };
}

pub struct JointMut<'a, S: VertexSink> {
    fig: &'a mut Humanoid<S>,
    id: JointId,
}

impl<'a, S: VertexSink> JointMut<'a, S> {
    pub fn id(&self) -> JointId {
        self.id
    }

    pub fn get(&self) -> &Joint {
        &self.fig.joints[self.id.slot()]
    }

    fn node(&mut self) -> &mut Joint {
        &mut self.fig.joints[self.id.slot()]
    }

    fn report(&mut self) {
        self.fig.report(self.id.into());
    }

    trs_setters!();

    fn set_trs_field(&mut self, field: TrsField, val: &[f32]) -> Result<()> {
        self.node().set_trs(field, val)?;
        self.report();
        Ok(())
    }

    /// Replace every transform field at once.
    pub fn set_transform(&mut self, trs: &Trs) {
        let joint = self.node();
        joint.trs = *trs;
        joint.matrix_changed = true;
        self.report();
    }

    pub fn set_bbox_center(&mut self, val: &[f32]) -> Result<()> {
        self.node().set_bbox_center(val)
    }

    pub fn set_bbox_size(&mut self, val: &[f32]) -> Result<()> {
        self.node().set_bbox_size(val)
    }

    pub fn set_limit_orientation(&mut self, val: &[f32]) -> Result<()> {
        self.node().set_limit_orientation(val)
    }

    pub fn set_lower_limit(&mut self, val: &[f32], num_elements: usize) -> Result<()> {
        self.node().set_lower_limit(val, num_elements)
    }

    pub fn set_upper_limit(&mut self, val: &[f32], num_elements: usize) -> Result<()> {
        self.node().set_upper_limit(val, num_elements)
    }

    pub fn set_stiffness(&mut self, val: &[f32], num_elements: usize) -> Result<()> {
        self.node().set_stiffness(val, num_elements)
    }

    pub fn set_skin_coord_index(&mut self, val: &[u32], num_valid: usize) -> Result<()> {
        self.node().set_skin_coord_index(val, num_valid)?;
        self.report();
        Ok(())
    }

    /// Weights for the current index list; must cover every valid index.
    pub fn set_skin_coord_weight(&mut self, val: &[f32]) -> Result<()> {
        self.node().set_skin_coord_weight(val)?;
        self.report();
        Ok(())
    }

    /// Replace the children with the first `count` entries of `nodes`.
    ///
    /// Joints, Sites and Segments are accepted. A node owned elsewhere, the
    /// joint itself, or one of its ancestors is rejected before anything
    /// is rewired.
    pub fn set_children(&mut self, nodes: &[NodeRef], count: usize) -> Result<()> {
        if nodes.len() < count {
            return Err(SkeletonError::too_short("children", count, nodes.len()));
        }

        let mut kids = Vec::with_capacity(count);
        for &node in &nodes[..count] {
            let child = self.adoptable(node)?;
            if kids.contains(&child) {
                return Err(SkeletonError::InconsistentIndex {
                    node: node.to_string(),
                    reason: "listed twice in children".into(),
                });
            }
            kids.push(child);
        }

        let mut children = std::mem::take(&mut self.node().children);
        for old in &children {
            if !kids.contains(old) {
                detach(self.fig, *old);
            }
        }
        children.clear();
        children.extend_from_slice(&kids);
        self.node().children = children;

        for child in kids {
            self.wire(child);
        }
        self.report();
        Ok(())
    }

    /// Append one child. Adding a node that is already a child is a no-op.
    pub fn add_child(&mut self, node: NodeRef) -> Result<()> {
        let child = self.adoptable(node)?;
        if self.get().children.contains(&child) {
            return Ok(());
        }
        self.node().children.push(child);
        self.wire(child);
        self.report();
        Ok(())
    }

    /// Detach one child. Returns whether it was present.
    pub fn remove_child(&mut self, node: NodeRef) -> Result<bool> {
        let child = JointChild::try_from(node)?;
        let Some(pos) = self.get().children.iter().position(|c| *c == child) else {
            return Ok(false);
        };
        self.node().children.remove(pos);
        detach(self.fig, child);
        self.report();
        Ok(true)
    }

    pub fn set_displacers(&mut self, ids: &[DisplacerId], num_valid: usize) -> Result<()> {
        for id in ids.iter().take(num_valid) {
            self.fig.check_node((*id).into())?;
        }
        replace_valid("displacers", &mut self.node().displacers, ids, num_valid)?;
        self.report();
        Ok(())
    }

    pub fn add_displacer(&mut self, id: DisplacerId) -> Result<()> {
        self.fig.check_node(id.into())?;
        self.node().displacers.push(id);
        self.report();
        Ok(())
    }

    pub fn remove_displacer(&mut self, id: DisplacerId) -> bool {
        let joint = self.node();
        match joint.displacers.iter().position(|d| *d == id) {
            Some(pos) => {
                joint.displacers.remove(pos);
                self.report();
                true
            }
            None => false,
        }
    }

    /// Validate a prospective child of this joint.
    fn adoptable(&self, node: NodeRef) -> Result<JointChild> {
        let child = JointChild::try_from(node)?;
        self.fig.check_node(node)?;

        let owner = match child {
            JointChild::Joint(c) => {
                if self.fig.is_ancestor(c, self.id) {
                    return Err(SkeletonError::InconsistentIndex {
                        node: node.to_string(),
                        reason: format!("would create a cycle under {}", self.id),
                    });
                }
                self.fig.joints[c.slot()].parent
            }
            JointChild::Site(s) => self.fig.sites[s.slot()].parent,
            JointChild::Segment(s) => match self.fig.segments[s.slot()].parent {
                Some(p) => ParentLink::Joint(p),
                None => ParentLink::Detached,
            },
        };

        match owner {
            ParentLink::Detached => Ok(child),
            ParentLink::Joint(p) if p == self.id => Ok(child),
            ParentLink::Joint(p) => Err(SkeletonError::InconsistentIndex {
                node: node.to_string(),
                reason: format!("already a child of {p}"),
            }),
            ParentLink::Humanoid => Err(SkeletonError::InconsistentIndex {
                node: node.to_string(),
                reason: "listed in the skeleton".into(),
            }),
        }
    }

    fn wire(&mut self, child: JointChild) {
        let fig = &mut *self.fig;
        match child {
            JointChild::Joint(c) => {
                if fig.is_attached(self.id) {
                    fig.attach_joint(c, ParentLink::Joint(self.id));
                } else {
                    fig.link_joint(c, self.id);
                }
            }
            JointChild::Site(s) => fig.attach_site(s, ParentLink::Joint(self.id)),
            JointChild::Segment(s) => fig.segments[s.slot()].parent = Some(self.id),
        }
    }
}

fn detach<S: VertexSink>(fig: &mut Humanoid<S>, child: JointChild) {
    match child {
        JointChild::Joint(c) => fig.joints[c.slot()].parent = ParentLink::Detached,
        JointChild::Site(s) => fig.sites[s.slot()].parent = ParentLink::Detached,
        JointChild::Segment(s) => fig.segments[s.slot()].parent = None,
    }
}

pub struct SiteMut<'a, S: VertexSink> {
    fig: &'a mut Humanoid<S>,
    id: SiteId,
}

impl<'a, S: VertexSink> SiteMut<'a, S> {
    pub fn id(&self) -> SiteId {
        self.id
    }

    pub fn get(&self) -> &Site {
        &self.fig.sites[self.id.slot()]
    }

    fn node(&mut self) -> &mut Site {
        &mut self.fig.sites[self.id.slot()]
    }

    trs_setters!();

    fn set_trs_field(&mut self, field: TrsField, val: &[f32]) -> Result<()> {
        self.node().set_trs(field, val)?;
        self.fig.report(self.id.into());
        Ok(())
    }

    pub fn set_transform(&mut self, trs: &Trs) {
        let site = self.node();
        site.trs = *trs;
        site.matrix_changed = true;
        self.fig.report(self.id.into());
    }

    pub fn set_children(&mut self, kids: &[String], num_valid: usize) -> Result<()> {
        self.node().set_children(kids, num_valid)
    }

    pub fn add_child(&mut self, kid: &str) {
        self.node().add_child(kid.to_string());
    }

    pub fn remove_child(&mut self, kid: &str) -> bool {
        self.node().remove_child(kid)
    }
}

pub struct SegmentMut<'a, S: VertexSink> {
    fig: &'a mut Humanoid<S>,
    id: SegmentId,
}

impl<'a, S: VertexSink> SegmentMut<'a, S> {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn get(&self) -> &Segment {
        &self.fig.segments[self.id.slot()]
    }

    fn node(&mut self) -> &mut Segment {
        &mut self.fig.segments[self.id.slot()]
    }

    pub fn set_mass(&mut self, mass: f32) {
        self.node().set_mass(mass);
    }

    pub fn set_bbox_center(&mut self, val: &[f32]) -> Result<()> {
        self.node().set_bbox_center(val)
    }

    pub fn set_bbox_size(&mut self, val: &[f32]) -> Result<()> {
        self.node().set_bbox_size(val)
    }

    pub fn set_center_of_mass(&mut self, val: &[f32]) -> Result<()> {
        self.node().set_center_of_mass(val)
    }

    pub fn set_moments_of_inertia(&mut self, val: &[f32], num_valid: usize) -> Result<()> {
        self.node().set_moments_of_inertia(val, num_valid)
    }

    /// Vertex range of the shared skin arrays, as start vertex and count.
    pub fn set_coord_range(&mut self, start: usize, count: usize) -> Result<()> {
        self.node().set_coord_range(start, count)
    }

    pub fn set_displacement_order(&mut self, order: DisplacementOrder) {
        self.node().displacement_order = order;
    }

    pub fn set_children(&mut self, kids: &[String], num_valid: usize) -> Result<()> {
        self.node().set_children(kids, num_valid)
    }

    pub fn add_child(&mut self, kid: &str) {
        self.node().add_child(kid.to_string());
    }

    pub fn remove_child(&mut self, kid: &str) -> bool {
        self.node().remove_child(kid)
    }

    pub fn set_displacers(&mut self, ids: &[DisplacerId], num_valid: usize) -> Result<()> {
        for id in ids.iter().take(num_valid) {
            self.fig.check_node((*id).into())?;
        }
        replace_valid("displacers", &mut self.node().displacers, ids, num_valid)
    }

    pub fn add_displacer(&mut self, id: DisplacerId) -> Result<()> {
        self.fig.check_node(id.into())?;
        self.node().displacers.push(id);
        Ok(())
    }

    pub fn remove_displacer(&mut self, id: DisplacerId) -> bool {
        let seg = self.node();
        match seg.displacers.iter().position(|d| *d == id) {
            Some(pos) => {
                seg.displacers.remove(pos);
                true
            }
            None => false,
        }
    }
}

pub struct DisplacerMut<'a, S: VertexSink> {
    fig: &'a mut Humanoid<S>,
    id: DisplacerId,
}

impl<'a, S: VertexSink> DisplacerMut<'a, S> {
    pub fn id(&self) -> DisplacerId {
        self.id
    }

    pub fn get(&self) -> &Displacer {
        &self.fig.displacers[self.id.slot()]
    }

    fn node(&mut self) -> &mut Displacer {
        &mut self.fig.displacers[self.id.slot()]
    }

    /// Takes effect on the next pass that skins; this does not mark the
    /// figure dirty.
    pub fn set_weight(&mut self, weight: f32) {
        self.node().set_weight(weight);
    }

    pub fn set_coord_index(&mut self, val: &[u32], num_valid: usize) -> Result<()> {
        self.node().set_coord_index(val, num_valid)
    }

    pub fn set_displacements(&mut self, val: &[f32], num_elements: usize) -> Result<()> {
        self.node().set_displacements(val, num_elements)
    }
}
