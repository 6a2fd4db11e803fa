mod skin_uniform;
mod uniform_stream;
mod wgpu_target;

pub use skin_uniform::{
    mat4_from_rows, mat4x3, Mat4x3, PackedSkinUniform, SkinUniform, MAT4X3_IDENTITY, MAX_MESH_ROOTS,
    MAX_SKIN_JOINTS,
};
pub use uniform_stream::{
    MemoryUniformTarget, StreamStats, UniformRange, UniformSlice, UniformStream, UniformTarget,
    UNIFORM_OFFSET_ALIGNMENT,
};
pub use wgpu_target::WgpuUniformTarget;

use crate::scene_graph::PrimitiveDesc;

/// One indexed draw of a skeletal mesh primitive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall<'a> {
    pub uniforms: UniformRange,
    pub node: usize,
    /// Slot of `node` in the record's root matrix array.
    pub root_index: usize,
    pub mesh: usize,
    pub primitive: &'a PrimitiveDesc,
}

/// Render boundary: binds the vertex array, program, texture and uniform range, then issues
/// the indexed draw.
pub trait PrimitiveRenderer {
    fn draw_primitive(&mut self, call: DrawCall<'_>);
}

impl<F> PrimitiveRenderer for F
where
    F: FnMut(DrawCall<'_>),
{
    fn draw_primitive(&mut self, call: DrawCall<'_>) {
        self(call)
    }
}
