//! Displacer: a named, weighted per-vertex offset table.

use crate::fields::{replace_triples, replace_valid};
use crate::Result;

#[derive(Clone, Debug)]
pub struct Displacer {
    pub(crate) name: Option<String>,
    pub(crate) coord_index: Vec<u32>,
    pub(crate) displacements: Vec<f32>,
    pub(crate) weight: f32,
}

impl Displacer {
    pub(crate) fn new(name: Option<String>) -> Self {
        Self {
            name,
            coord_index: Vec::new(),
            displacements: Vec::new(),
            weight: 1.0,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn coord_index(&self) -> &[u32] {
        &self.coord_index
    }

    pub fn num_coord_index(&self) -> usize {
        self.coord_index.len()
    }

    /// Offsets, three floats per entry of [`Self::coord_index`].
    pub fn displacements(&self) -> &[f32] {
        &self.displacements
    }

    pub fn num_displacements(&self) -> usize {
        self.displacements.len() / 3
    }

    pub(crate) fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    /// Replace the target vertices. The offset table is grown alongside so
    /// each index has a (zero) delta until displacements are supplied.
    pub(crate) fn set_coord_index(&mut self, val: &[u32], num_valid: usize) -> Result<()> {
        replace_valid("coordIndex", &mut self.coord_index, val, num_valid)?;
        if self.displacements.len() < num_valid * 3 {
            self.displacements.resize(num_valid * 3, 0.0);
        }
        Ok(())
    }

    pub(crate) fn set_displacements(&mut self, val: &[f32], num_elements: usize) -> Result<()> {
        replace_triples("displacements", &mut self.displacements, val, num_elements)
    }

    /// `(vertex, delta)` pairs for every index that has an offset.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (usize, [f32; 3])> + '_ {
        self.coord_index
            .iter()
            .zip(self.displacements.chunks_exact(3))
            .map(|(&idx, d)| (idx as usize, [d[0], d[1], d[2]]))
    }

    /// Add `delta * weight` for each listed vertex into a flat xyz buffer.
    /// Callers validate indices beforehand.
    pub(crate) fn apply(&self, target: &mut [f32]) {
        if self.weight == 0.0 {
            return;
        }
        for (idx, delta) in self.entries() {
            let base = idx * 3;
            target[base] += delta[0] * self.weight;
            target[base + 1] += delta[1] * self.weight;
            target[base + 2] += delta[2] * self.weight;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_scales_by_weight() {
        let mut d = Displacer::new(Some("smile".into()));
        d.set_coord_index(&[1], 1).unwrap();
        d.set_displacements(&[0.0, 2.0, 0.0], 1).unwrap();
        d.set_weight(0.5);

        let mut coords = vec![0.0; 6];
        d.apply(&mut coords);
        assert_eq!(coords, vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn zero_weight_is_a_no_op() {
        let mut d = Displacer::new(None);
        d.set_coord_index(&[0], 1).unwrap();
        d.set_displacements(&[1.0, 1.0, 1.0], 1).unwrap();
        d.set_weight(0.0);
        let mut coords = vec![5.0; 3];
        d.apply(&mut coords);
        assert_eq!(coords, vec![5.0; 3]);
    }

    #[test]
    fn growing_indices_pads_displacements() {
        let mut d = Displacer::new(None);
        d.set_coord_index(&[0, 1, 2], 3).unwrap();
        assert_eq!(d.num_displacements(), 3);
        assert_eq!(d.weight(), 1.0);
        assert!(d.set_displacements(&[1.0; 5], 2).is_err());
    }
}
