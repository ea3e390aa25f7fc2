//! Vertex skinning over the shared skin arrays.
//!
//! One pass copies the valid source prefix into a rest buffer, lets
//! displacers offset it, accumulates `weight * (world * rest)` per joint,
//! resolves unweighted vertices and finally hands the result to the sinks.
//! Nothing reaches the sinks until the whole pass has been computed.

use nalgebra::{Matrix4, Vector3};

use crate::config::Config;
use crate::displacer::Displacer;
use crate::sink::VertexSink;
use crate::transform::{normal_matrix, transform_point};

#[derive(Debug, Default)]
pub struct VertexSkinner {
    rest_coords: Vec<f32>,
    rest_normals: Vec<f32>,
    coords: Vec<f32>,
    normals: Vec<f32>,
    coord_weight: Vec<f32>,
    normal_weight: Vec<f32>,
}

impl VertexSkinner {
    pub fn new(cfg: &Config) -> Self {
        let floats = cfg.vertex_capacity * 3;
        Self {
            rest_coords: Vec::with_capacity(floats),
            rest_normals: Vec::with_capacity(floats),
            coords: Vec::with_capacity(floats),
            normals: Vec::with_capacity(floats),
            coord_weight: Vec::with_capacity(cfg.vertex_capacity),
            normal_weight: Vec::with_capacity(cfg.vertex_capacity),
        }
    }

    /// Reset the scratch for a pass over the given valid source prefixes.
    pub fn begin_pass(&mut self, src_coords: &[f32], src_normals: &[f32]) {
        reset_copy(&mut self.rest_coords, src_coords);
        reset_copy(&mut self.rest_normals, src_normals);
        reset_zero(&mut self.coords, src_coords.len());
        reset_zero(&mut self.normals, src_normals.len());
        reset_zero(&mut self.coord_weight, src_coords.len() / 3);
        reset_zero(&mut self.normal_weight, src_normals.len() / 3);
    }

    pub fn num_coords(&self) -> usize {
        self.rest_coords.len() / 3
    }

    pub fn num_normals(&self) -> usize {
        self.rest_normals.len() / 3
    }

    /// Offset the rest pose before any joint transforms it.
    pub fn displace_rest(&mut self, displacer: &Displacer) {
        displacer.apply(&mut self.rest_coords);
    }

    /// Offset already skinned coordinates.
    pub fn displace_output(&mut self, displacer: &Displacer) {
        displacer.apply(&mut self.coords);
    }

    /// Accumulate one joint's influence. Indices must be below
    /// [`Self::num_coords`]; normals are skipped for vertices that have none.
    /// Returns the number of vertex contributions written.
    pub fn skin_joint(&mut self, world: &Matrix4<f32>, indices: &[u32], weights: &[f32]) -> usize {
        let normals = normal_matrix(world);
        let num_normals = self.num_normals();
        let mut written = 0;

        for (&idx, &w) in indices.iter().zip(weights) {
            if w == 0.0 {
                continue;
            }
            let v = idx as usize;
            let base = v * 3;

            let rest = [
                self.rest_coords[base],
                self.rest_coords[base + 1],
                self.rest_coords[base + 2],
            ];
            let p = transform_point(world, rest);
            self.coords[base] += p[0] * w;
            self.coords[base + 1] += p[1] * w;
            self.coords[base + 2] += p[2] * w;
            self.coord_weight[v] += w;

            if v < num_normals {
                let n = normals
                    * Vector3::new(
                        self.rest_normals[base],
                        self.rest_normals[base + 1],
                        self.rest_normals[base + 2],
                    );
                self.normals[base] += n.x * w;
                self.normals[base + 1] += n.y * w;
                self.normals[base + 2] += n.z * w;
                self.normal_weight[v] += w;
            }
            written += 1;
        }
        written
    }

    /// Resolve vertices no joint touched and renormalise normals.
    pub fn finish(&mut self, cfg: &Config) {
        if cfg.pass_through_unweighted {
            for (v, w) in self.coord_weight.iter().enumerate() {
                if *w == 0.0 {
                    let base = v * 3;
                    self.coords[base..base + 3].copy_from_slice(&self.rest_coords[base..base + 3]);
                }
            }
            for (v, w) in self.normal_weight.iter().enumerate() {
                if *w == 0.0 {
                    let base = v * 3;
                    self.normals[base..base + 3]
                        .copy_from_slice(&self.rest_normals[base..base + 3]);
                }
            }
        }

        if cfg.normalize_normals {
            for n in self.normals.chunks_exact_mut(3) {
                let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
                if len > f32::EPSILON {
                    n[0] /= len;
                    n[1] /= len;
                    n[2] /= len;
                }
            }
        }
    }

    pub fn coords(&self) -> &[f32] {
        &self.coords
    }

    pub fn normals(&self) -> &[f32] {
        &self.normals
    }

    /// Write the finished pass to the output sinks.
    pub fn flush<S: VertexSink>(&self, out_coords: &mut S, out_normals: &mut S) {
        out_coords.prepare(self.coords.len());
        out_coords.write(0, &self.coords);
        out_normals.prepare(self.normals.len());
        out_normals.write(0, &self.normals);
    }
}

fn reset_copy(dst: &mut Vec<f32>, src: &[f32]) {
    dst.clear();
    dst.extend_from_slice(src);
}

fn reset_zero(dst: &mut Vec<f32>, len: usize) {
    dst.clear();
    dst.resize(len, 0.0);
}
