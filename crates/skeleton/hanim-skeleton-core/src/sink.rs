//! Output targets for skinned coordinates and normals.
//!
//! The engine only ever writes to a sink. A sink may be a flat `Vec<f32>` or
//! a wrapper around host-managed memory such as a mapped GPU buffer.

/// Write-only destination for flat xyz data.
pub trait VertexSink {
    /// Called once per skinning pass before any write, with the number of
    /// floats the pass will produce.
    fn prepare(&mut self, len: usize);

    /// Copy `values` into the sink starting at float `offset`.
    fn write(&mut self, offset: usize, values: &[f32]);
}

impl VertexSink for Vec<f32> {
    fn prepare(&mut self, len: usize) {
        self.resize(len, 0.0);
    }

    fn write(&mut self, offset: usize, values: &[f32]) {
        let end = offset + values.len();
        if self.len() < end {
            self.resize(end, 0.0);
        }
        self[offset..end].copy_from_slice(values);
    }
}
