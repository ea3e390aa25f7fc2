//! TRS fields and the pivot-convention transform composer.
//!
//! The composed matrix is
//! `T(translation) * T(center) * R(rotation) * SR * S(scale) * SR⁻¹ * T(-center)`
//! where `SR` is the scale orientation. Rotations are axis-angle quads
//! `[x, y, z, angle]`.

use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, Unit, Vector3};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::fields::{vec3_arg, vec4_arg};
use crate::Result;

/// Shared read-only identity, used as the incoming parent matrix for the root joint.
pub static IDENTITY: Lazy<Matrix4<f32>> = Lazy::new(Matrix4::identity);

const ZERO_EPS: f32 = 0.0001;

/// Transform fields owned by Humanoids, Joints and Sites.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trs {
    pub center: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    #[serde(rename = "scaleOrientation")]
    pub scale_orientation: [f32; 4],
    pub translation: [f32; 3],
}

impl Default for Trs {
    fn default() -> Self {
        Self {
            center: [0.0; 3],
            rotation: [0.0, 0.0, 1.0, 0.0],
            scale: [1.0; 3],
            scale_orientation: [0.0, 0.0, 1.0, 0.0],
            translation: [0.0; 3],
        }
    }
}

/// One of the five transform fields, for setters shared across node kinds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum TrsField {
    Center,
    Rotation,
    Scale,
    ScaleOrientation,
    Translation,
}

impl TrsField {
    pub(crate) fn name(self) -> &'static str {
        match self {
            TrsField::Center => "center",
            TrsField::Rotation => "rotation",
            TrsField::Scale => "scale",
            TrsField::ScaleOrientation => "scaleOrientation",
            TrsField::Translation => "translation",
        }
    }
}

impl Trs {
    /// Validate and store one field. Vectors need 3 values, rotations 4.
    pub(crate) fn set_field(&mut self, field: TrsField, val: &[f32]) -> Result<()> {
        let name = field.name();
        match field {
            TrsField::Center => self.center = vec3_arg(name, val)?,
            TrsField::Rotation => self.rotation = vec4_arg(name, val)?,
            TrsField::Scale => self.scale = vec3_arg(name, val)?,
            TrsField::ScaleOrientation => self.scale_orientation = vec4_arg(name, val)?,
            TrsField::Translation => self.translation = vec3_arg(name, val)?,
        }
        Ok(())
    }

    /// Compose the local matrix for these fields.
    pub fn compose(&self) -> Matrix4<f32> {
        let center = Vector3::from(self.center);
        let to_pivot = Matrix4::new_translation(&-center);
        let from_pivot = Matrix4::new_translation(&center);
        let translate = Matrix4::new_translation(&Vector3::from(self.translation));

        let scale = if is_uniform(&self.scale) {
            Matrix4::new_scaling(self.scale[0])
        } else {
            let orient = axis_angle_matrix(&self.scale_orientation, true);
            let inv_orient = orient.transpose();
            orient * Matrix4::new_nonuniform_scaling(&Vector3::from(self.scale)) * inv_orient
        };
        let rotate = axis_angle_matrix(&self.rotation, false);

        translate * from_pivot * rotate * scale * to_pivot
    }
}

fn float_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < ZERO_EPS
}

fn is_uniform(scale: &[f32; 3]) -> bool {
    float_eq(scale[0], scale[1]) && float_eq(scale[0], scale[2])
}

/// Rotation for an axis-angle quad. A degenerate axis yields identity.
/// Axes close to unit length are used as given unless `always_normalize`.
fn axis_angle_matrix(quad: &[f32; 4], always_normalize: bool) -> Matrix4<f32> {
    let axis = Vector3::new(quad[0], quad[1], quad[2]);
    let mag_sq = axis.norm_squared();
    if mag_sq < ZERO_EPS {
        return Matrix4::identity();
    }
    let axis = if always_normalize || !(0.99..=1.01).contains(&mag_sq) {
        Unit::new_normalize(axis)
    } else {
        Unit::new_unchecked(axis)
    };
    Rotation3::from_axis_angle(&axis, quad[3]).to_homogeneous()
}

/// Matrix for transforming normals: inverse transpose of the upper 3x3,
/// or the plain upper 3x3 when it is singular.
pub(crate) fn normal_matrix(m: &Matrix4<f32>) -> Matrix3<f32> {
    let upper: Matrix3<f32> = m.fixed_view::<3, 3>(0, 0).into_owned();
    upper
        .try_inverse()
        .map(|inv| inv.transpose())
        .unwrap_or(upper)
}

#[inline]
pub(crate) fn transform_point(m: &Matrix4<f32>, p: [f32; 3]) -> [f32; 3] {
    let out = m.transform_point(&Point3::new(p[0], p[1], p[2]));
    [out.x, out.y, out.z]
}

/// Translation column of an affine matrix.
#[inline]
pub fn matrix_position(m: &Matrix4<f32>) -> [f32; 3] {
    [m[(0, 3)], m[(1, 3)], m[(2, 3)]]
}

/// Column-major copy of a matrix, the layout GPU palettes expect.
#[inline]
pub fn matrix_to_array(m: &Matrix4<f32>) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(m.as_slice());
    out
}
