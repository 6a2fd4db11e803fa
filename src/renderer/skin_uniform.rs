use crate::skin::SkinMatrices;
use glam::{Mat4, Vec4};

pub const MAX_SKIN_JOINTS: usize = 64;
pub const MAX_MESH_ROOTS: usize = 16;

/// Top three rows of an affine matrix; the shader rebuilds the implicit `(0, 0, 0, 1)` row.
pub type Mat4x3 = [[f32; 4]; 3];

pub const MAT4X3_IDENTITY: Mat4x3 = [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]];

#[inline]
pub fn mat4x3(matrix: &Mat4) -> Mat4x3 {
    [matrix.row(0).to_array(), matrix.row(1).to_array(), matrix.row(2).to_array()]
}

/// Inverse of [`mat4x3`] for affine matrices.
pub fn mat4_from_rows(rows: &Mat4x3) -> Mat4 {
    Mat4::from_cols_array_2d(&[rows[0], rows[1], rows[2], [0.0, 0.0, 0.0, 1.0]]).transpose()
}

/// Per-draw uniform record streamed through [`super::UniformStream`].
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinUniform {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    /// `[joint_count, root_count, 0, 0]`
    pub counts: [u32; 4],
    pub joints: [Mat4x3; MAX_SKIN_JOINTS],
    pub roots: [Mat4x3; MAX_MESH_ROOTS],
}

/// Result of packing; `truncated_joints`/`truncated_roots` report what did not fit.
pub struct PackedSkinUniform {
    pub uniform: SkinUniform,
    pub truncated_joints: usize,
    pub truncated_roots: usize,
}

impl SkinUniform {
    pub const SIZE: usize = std::mem::size_of::<SkinUniform>();

    pub fn pack(model: Mat4, color: Vec4, matrices: &SkinMatrices) -> PackedSkinUniform {
        let mut uniform: SkinUniform = bytemuck::Zeroable::zeroed();
        uniform.model = model.to_cols_array_2d();
        uniform.color = color.to_array();
        uniform.joints = [MAT4X3_IDENTITY; MAX_SKIN_JOINTS];
        uniform.roots = [MAT4X3_IDENTITY; MAX_MESH_ROOTS];

        let joint_count = matrices.joints.len().min(MAX_SKIN_JOINTS);
        for (dst, joint) in uniform.joints.iter_mut().zip(&matrices.joints) {
            *dst = mat4x3(joint);
        }
        let root_count = matrices.roots.len().min(MAX_MESH_ROOTS);
        for (dst, root) in uniform.roots.iter_mut().zip(&matrices.roots) {
            *dst = mat4x3(root);
        }
        uniform.counts = [joint_count as u32, root_count as u32, 0, 0];

        PackedSkinUniform {
            uniform,
            truncated_joints: matrices.joints.len() - joint_count,
            truncated_roots: matrices.roots.len() - root_count,
        }
    }

    pub fn joint_count(&self) -> usize {
        self.counts[0] as usize
    }

    pub fn root_count(&self) -> usize {
        self.counts[1] as usize
    }

    pub fn joint(&self, index: usize) -> Option<Mat4> {
        (index < self.joint_count()).then(|| mat4_from_rows(&self.joints[index]))
    }

    pub fn root(&self, index: usize) -> Option<Mat4> {
        (index < self.root_count()).then(|| mat4_from_rows(&self.roots[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn rows_round_trip_affine_matrices() {
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 2.0, 0.5),
            Quat::from_rotation_x(0.7),
            Vec3::new(3.0, -1.0, 4.0),
        );
        let rows = mat4x3(&matrix);
        assert_eq!(rows[0][3], 3.0);
        assert_eq!(rows[1][3], -1.0);
        assert_eq!(rows[2][3], 4.0);
        assert!(mat4_from_rows(&rows).abs_diff_eq(matrix, 1e-6));
        assert_eq!(mat4x3(&Mat4::IDENTITY), MAT4X3_IDENTITY);
    }

    #[test]
    fn pack_truncates_oversized_palettes() {
        let matrices = SkinMatrices {
            joints: vec![Mat4::from_translation(Vec3::X); MAX_SKIN_JOINTS + 3],
            roots: vec![Mat4::IDENTITY],
            mesh_nodes: vec![0],
        };
        let packed = SkinUniform::pack(Mat4::IDENTITY, Vec4::ONE, &matrices);
        assert_eq!(packed.truncated_joints, 3);
        assert_eq!(packed.truncated_roots, 0);
        assert_eq!(packed.uniform.joint_count(), MAX_SKIN_JOINTS);
        assert_eq!(packed.uniform.root_count(), 1);
        assert!(packed.uniform.joint(0).expect("joint").abs_diff_eq(Mat4::from_translation(Vec3::X), 1e-6));
        assert!(packed.uniform.joint(MAX_SKIN_JOINTS).is_none());
        assert_eq!(packed.uniform.color, [1.0; 4]);
    }

    #[test]
    fn record_is_sixteen_byte_granular() {
        assert_eq!(SkinUniform::SIZE % 16, 0);
    }
}
