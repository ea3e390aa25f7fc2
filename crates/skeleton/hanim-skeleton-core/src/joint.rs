//! Joint: the transform-bearing skeleton node.
//!
//! A joint composes its local matrix from its own TRS fields and its world
//! matrix as `parent_world * local`. It owns no vertex data; it only records
//! which shared skin vertices it deforms and with which weights, plus a
//! [`SourceView`] describing the shared buffers it was last pointed at.

use nalgebra::Matrix4;

use crate::fields::{replace_triples, replace_valid, vec3_arg, vec4_arg};
use crate::ids::{DisplacerId, ObjectIndex};
use crate::protocol::{JointChild, ParentLink};
use crate::stats::UpdateStats;
use crate::transform::{Trs, TrsField};
use crate::Result;
use crate::SkeletonError;

/// Non-owning description of the figure's shared skin buffers as seen by a
/// joint: valid vertex counts plus the buffer generation they were taken
/// from. Re-acquired on every attach and source update.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceView {
    pub num_coords: usize,
    pub num_normals: usize,
    pub generation: u64,
}

#[derive(Clone, Debug)]
pub struct Joint {
    pub(crate) name: Option<String>,
    pub(crate) trs: Trs,
    pub(crate) bbox_center: [f32; 3],
    pub(crate) bbox_size: [f32; 3],
    pub(crate) limit_orientation: [f32; 4],
    pub(crate) lower_limit: Vec<f32>,
    pub(crate) upper_limit: Vec<f32>,
    pub(crate) stiffness: Vec<f32>,
    pub(crate) skin_coord_index: Vec<u32>,
    pub(crate) skin_coord_weight: Vec<f32>,
    pub(crate) children: Vec<JointChild>,
    pub(crate) displacers: Vec<DisplacerId>,
    pub(crate) local_matrix: Matrix4<f32>,
    pub(crate) world_matrix: Matrix4<f32>,
    pub(crate) parent: ParentLink,
    pub(crate) sources: SourceView,
    pub(crate) object_index: Option<ObjectIndex>,
    pub(crate) matrix_changed: bool,
    pub(crate) update_sent: bool,
}

impl Joint {
    pub(crate) fn new(name: Option<String>) -> Self {
        Self {
            name,
            trs: Trs::default(),
            bbox_center: [0.0; 3],
            bbox_size: [0.0; 3],
            limit_orientation: [0.0, 0.0, 1.0, 0.0],
            lower_limit: Vec::new(),
            upper_limit: Vec::new(),
            stiffness: Vec::new(),
            skin_coord_index: Vec::new(),
            skin_coord_weight: Vec::new(),
            children: Vec::new(),
            displacers: Vec::new(),
            local_matrix: Matrix4::identity(),
            world_matrix: Matrix4::identity(),
            parent: ParentLink::Detached,
            sources: SourceView::default(),
            object_index: None,
            matrix_changed: true,
            update_sent: false,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn trs(&self) -> &Trs {
        &self.trs
    }

    pub fn center(&self) -> [f32; 3] {
        self.trs.center
    }

    pub fn rotation(&self) -> [f32; 4] {
        self.trs.rotation
    }

    pub fn scale(&self) -> [f32; 3] {
        self.trs.scale
    }

    pub fn scale_orientation(&self) -> [f32; 4] {
        self.trs.scale_orientation
    }

    pub fn translation(&self) -> [f32; 3] {
        self.trs.translation
    }

    pub fn bbox_center(&self) -> [f32; 3] {
        self.bbox_center
    }

    pub fn bbox_size(&self) -> [f32; 3] {
        self.bbox_size
    }

    pub fn limit_orientation(&self) -> [f32; 4] {
        self.limit_orientation
    }

    /// Lower joint limits, three floats per limit.
    pub fn lower_limit(&self) -> &[f32] {
        &self.lower_limit
    }

    pub fn num_lower_limit(&self) -> usize {
        self.lower_limit.len() / 3
    }

    pub fn upper_limit(&self) -> &[f32] {
        &self.upper_limit
    }

    pub fn num_upper_limit(&self) -> usize {
        self.upper_limit.len() / 3
    }

    pub fn stiffness(&self) -> &[f32] {
        &self.stiffness
    }

    /// Indices of the shared skin vertices this joint deforms.
    pub fn skin_coord_index(&self) -> &[u32] {
        &self.skin_coord_index
    }

    /// Weights paired with [`Self::skin_coord_index`].
    pub fn skin_coord_weight(&self) -> &[f32] {
        &self.skin_coord_weight[..self.skin_coord_index.len()]
    }

    pub fn num_skin_coord(&self) -> usize {
        self.skin_coord_index.len()
    }

    pub fn children(&self) -> &[JointChild] {
        &self.children
    }

    pub fn displacers(&self) -> &[DisplacerId] {
        &self.displacers
    }

    pub fn local_matrix(&self) -> &Matrix4<f32> {
        &self.local_matrix
    }

    pub fn world_matrix(&self) -> &Matrix4<f32> {
        &self.world_matrix
    }

    /// Palette slot assigned when the joint was last attached, if ever.
    pub fn object_index(&self) -> Option<ObjectIndex> {
        self.object_index
    }

    pub fn parent(&self) -> ParentLink {
        self.parent
    }

    pub fn source_view(&self) -> SourceView {
        self.sources
    }

    /// Whether the TRS fields changed since the last update visited this joint.
    pub fn is_matrix_dirty(&self) -> bool {
        self.matrix_changed
    }

    pub(crate) fn set_trs(&mut self, field: TrsField, val: &[f32]) -> Result<()> {
        self.trs.set_field(field, val)?;
        self.matrix_changed = true;
        Ok(())
    }

    pub(crate) fn set_bbox_center(&mut self, val: &[f32]) -> Result<()> {
        self.bbox_center = vec3_arg("bboxCenter", val)?;
        Ok(())
    }

    pub(crate) fn set_bbox_size(&mut self, val: &[f32]) -> Result<()> {
        self.bbox_size = vec3_arg("bboxSize", val)?;
        Ok(())
    }

    pub(crate) fn set_limit_orientation(&mut self, val: &[f32]) -> Result<()> {
        self.limit_orientation = vec4_arg("limitOrientation", val)?;
        Ok(())
    }

    pub(crate) fn set_lower_limit(&mut self, val: &[f32], num_elements: usize) -> Result<()> {
        replace_triples("lowerLimit", &mut self.lower_limit, val, num_elements)
    }

    pub(crate) fn set_upper_limit(&mut self, val: &[f32], num_elements: usize) -> Result<()> {
        replace_triples("upperLimit", &mut self.upper_limit, val, num_elements)
    }

    pub(crate) fn set_stiffness(&mut self, val: &[f32], num_elements: usize) -> Result<()> {
        replace_valid("stiffness", &mut self.stiffness, val, num_elements)
    }

    /// Replace the deformed vertex subset. The weight list is kept the same
    /// length as the index list; slots beyond the previous count weigh zero.
    pub(crate) fn set_skin_coord_index(&mut self, val: &[u32], num_valid: usize) -> Result<()> {
        let previous = self.skin_coord_index.len();
        replace_valid("skinCoordIndex", &mut self.skin_coord_index, val, num_valid)?;
        self.skin_coord_weight.truncate(previous.min(num_valid));
        self.skin_coord_weight.resize(num_valid, 0.0);
        Ok(())
    }

    pub(crate) fn set_skin_coord_weight(&mut self, val: &[f32]) -> Result<()> {
        let count = self.skin_coord_index.len();
        if val.len() < count {
            return Err(SkeletonError::too_short("skinCoordWeight", count, val.len()));
        }
        self.skin_coord_weight.clear();
        self.skin_coord_weight.extend_from_slice(&val[..count]);
        Ok(())
    }

    /// Bring local and world matrices up to date for one update pass.
    /// Returns whether the world matrix was recomposed.
    pub(crate) fn refresh(
        &mut self,
        parent_world: &Matrix4<f32>,
        parent_changed: bool,
        stats: &mut UpdateStats,
    ) -> bool {
        let changed = parent_changed || self.matrix_changed;

        if self.matrix_changed {
            self.local_matrix = self.trs.compose();
            self.matrix_changed = false;
            stats.local_recomposes += 1;
        }

        if changed {
            self.world_matrix = parent_world * self.local_matrix;
            stats.world_recomposes += 1;
        }

        self.update_sent = false;
        changed
    }
}
