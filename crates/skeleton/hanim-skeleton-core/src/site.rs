//! Site: a non-deforming attachment leaf.

use nalgebra::Matrix4;

use crate::fields::replace_valid;
use crate::protocol::ParentLink;
use crate::stats::UpdateStats;
use crate::transform::{matrix_position, Trs, TrsField};
use crate::Result;

#[derive(Clone, Debug)]
pub struct Site {
    pub(crate) name: Option<String>,
    pub(crate) trs: Trs,
    pub(crate) children: Vec<String>,
    pub(crate) local_matrix: Matrix4<f32>,
    pub(crate) world_matrix: Matrix4<f32>,
    pub(crate) parent: ParentLink,
    pub(crate) matrix_changed: bool,
    pub(crate) update_sent: bool,
}

impl Site {
    pub(crate) fn new(name: Option<String>) -> Self {
        Self {
            name,
            trs: Trs::default(),
            children: Vec::new(),
            local_matrix: Matrix4::identity(),
            world_matrix: Matrix4::identity(),
            parent: ParentLink::Detached,
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

    /// Names of scene objects the host attaches at this site.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn local_matrix(&self) -> &Matrix4<f32> {
        &self.local_matrix
    }

    pub fn world_matrix(&self) -> &Matrix4<f32> {
        &self.world_matrix
    }

    pub fn world_position(&self) -> [f32; 3] {
        matrix_position(&self.world_matrix)
    }

    pub fn parent(&self) -> ParentLink {
        self.parent
    }

    pub fn is_matrix_dirty(&self) -> bool {
        self.matrix_changed
    }

    pub(crate) fn set_trs(&mut self, field: TrsField, val: &[f32]) -> Result<()> {
        self.trs.set_field(field, val)?;
        self.matrix_changed = true;
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

    /// Refresh the world matrix when forced or when the site's own fields
    /// changed. Returns whether the world matrix was recomposed.
    pub(crate) fn update_location(
        &mut self,
        parent_world: &Matrix4<f32>,
        force: bool,
        stats: &mut UpdateStats,
    ) -> bool {
        if self.matrix_changed {
            self.local_matrix = self.trs.compose();
            stats.local_recomposes += 1;
        }

        let changed = force || self.matrix_changed;
        if changed {
            self.world_matrix = parent_world * self.local_matrix;
            stats.site_updates += 1;
        }

        self.update_sent = false;
        self.matrix_changed = false;
        changed
    }
}
