//! Segment: a rigid mesh grouping under a joint.
//!
//! A segment is not a transform node. It names a contiguous vertex range of
//! the shared skin arrays, carries physical properties, and owns displacers
//! applied either before or after the owning joint's rigid transform.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::fields::{replace_valid, vec3_arg};
use crate::error::SkeletonError;
use crate::ids::{DisplacerId, JointId};
use crate::Result;

/// When a segment's displacers are applied relative to skinning.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplacementOrder {
    /// Offsets are added to the rest pose, then skinned.
    #[default]
    BeforeTransform,
    /// Offsets are added to the skinned output.
    AfterTransform,
}

#[derive(Clone, Debug)]
pub struct Segment {
    pub(crate) name: Option<String>,
    pub(crate) bbox_center: [f32; 3],
    pub(crate) bbox_size: [f32; 3],
    pub(crate) center_of_mass: [f32; 3],
    pub(crate) moments_of_inertia: Vec<f32>,
    pub(crate) mass: f32,
    pub(crate) coord_start: usize,
    pub(crate) coord_count: usize,
    pub(crate) children: Vec<String>,
    pub(crate) displacers: Vec<DisplacerId>,
    pub(crate) displacement_order: DisplacementOrder,
    pub(crate) parent: Option<JointId>,
}

impl Segment {
    pub(crate) fn new(name: Option<String>) -> Self {
        Self {
            name,
            bbox_center: [0.0; 3],
            bbox_size: [0.0; 3],
            center_of_mass: [0.0; 3],
            moments_of_inertia: Vec::with_capacity(9),
            mass: -1.0,
            coord_start: 0,
            coord_count: 0,
            children: Vec::new(),
            displacers: Vec::new(),
            displacement_order: DisplacementOrder::default(),
            parent: None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Mass, or a negative value when unset.
    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn bbox_center(&self) -> [f32; 3] {
        self.bbox_center
    }

    pub fn bbox_size(&self) -> [f32; 3] {
        self.bbox_size
    }

    pub fn center_of_mass(&self) -> [f32; 3] {
        self.center_of_mass
    }

    pub fn moments_of_inertia(&self) -> &[f32] {
        &self.moments_of_inertia
    }

    /// Vertex range of the shared skin arrays this segment covers.
    pub fn coord_range(&self) -> Range<usize> {
        self.coord_start..self.coord_start + self.coord_count
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn displacers(&self) -> &[DisplacerId] {
        &self.displacers
    }

    pub fn displacement_order(&self) -> DisplacementOrder {
        self.displacement_order
    }

    /// Owning joint, if attached.
    pub fn parent(&self) -> Option<JointId> {
        self.parent
    }

    pub(crate) fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
    }

    pub(crate) fn set_bbox_center(&mut self, val: &[f32]) -> Result<()> {
        self.bbox_center = vec3_arg("bboxCenter", val)?;
        Ok(())
    }

    pub(crate) fn set_bbox_size(&mut self, val: &[f32]) -> Result<()> {
        self.bbox_size = vec3_arg("bboxSize", val)?;
        Ok(())
    }

    pub(crate) fn set_center_of_mass(&mut self, val: &[f32]) -> Result<()> {
        self.center_of_mass = vec3_arg("centerOfMass", val)?;
        Ok(())
    }

    pub(crate) fn set_moments_of_inertia(&mut self, val: &[f32], num_valid: usize) -> Result<()> {
        replace_valid("momentsOfInertia", &mut self.moments_of_inertia, val, num_valid)
    }

    pub(crate) fn set_coord_range(&mut self, start: usize, count: usize) -> Result<()> {
        if start.checked_add(count).is_none() {
            return Err(SkeletonError::InvalidArgument {
                field: "coordRange".into(),
                reason: format!("start {start} plus count {count} overflows"),
            });
        }
        self.coord_start = start;
        self.coord_count = count;
        Ok(())
    }

    pub(crate) fn set_children(&mut self, kids: &[String], num_valid: usize) -> Result<()> {
        replace_valid("children", &mut self.children, kids, num_valid)
    }

    pub(crate) fn add_child(&mut self, kid: String) {
        self.children.push(kid);
    }

    pub(crate) fn remove_child(&mut self, kid: &str) -> bool {
        match self.children.iter().position(|c| c == kid) {
            Some(pos) => {
                self.children.remove(pos);
                true
            }
            None => false,
        }
    }
}
