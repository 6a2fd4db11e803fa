use crate::animation::Animation;
use crate::pose::{self, AnimatedNodeTree};
use crate::scene_graph::{ModelAsset, SkinBinding};
use glam::Mat4;

/// Matrices driving one mesh instance for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkinMatrices {
    /// One per skin joint, in skin order. Empty for unskinned meshes.
    pub joints: Vec<Mat4>,
    /// One per mesh-bearing node under the mesh node.
    pub roots: Vec<Mat4>,
    pub mesh_nodes: Vec<usize>,
}

impl SkinMatrices {
    pub fn is_skinned(&self) -> bool {
        !self.joints.is_empty()
    }
}

/// Resolves joint and root matrices for `mesh_node`, evaluating the pose when an animation is set.
pub fn resolve(
    asset: &ModelAsset,
    mesh_node: usize,
    animation: Option<&Animation>,
    time: f32,
) -> SkinMatrices {
    let mesh_nodes = asset.mesh_nodes_under(mesh_node);
    match animation {
        Some(animation) => {
            let tree = pose::evaluate(asset, Some(animation), time);
            resolve_with_pose(asset, mesh_node, &tree, mesh_nodes)
        }
        None => resolve_bind_pose(asset, mesh_node, mesh_nodes),
    }
}

/// Resolves against an already evaluated tree, e.g. when several meshes share one pose.
pub fn resolve_with_pose(
    asset: &ModelAsset,
    mesh_node: usize,
    tree: &AnimatedNodeTree,
    mesh_nodes: Vec<usize>,
) -> SkinMatrices {
    match asset.skin_binding(mesh_node) {
        SkinBinding::HasSkin { joints, .. } => SkinMatrices {
            joints: joints.iter().map(|&joint| tree.skinning(joint)).collect(),
            roots: vec![Mat4::IDENTITY; mesh_nodes.len()],
            mesh_nodes,
        },
        SkinBinding::NoSkin => SkinMatrices {
            joints: Vec::new(),
            roots: mesh_nodes.iter().map(|&node| tree.global(node)).collect(),
            mesh_nodes,
        },
    }
}

fn resolve_bind_pose(asset: &ModelAsset, mesh_node: usize, mesh_nodes: Vec<usize>) -> SkinMatrices {
    let nodes = asset.nodes();
    match asset.skin_binding(mesh_node) {
        SkinBinding::HasSkin { joints, .. } => SkinMatrices {
            joints: joints
                .iter()
                .map(|&joint| nodes[joint].global_bind * nodes[joint].inverse_bind)
                .collect(),
            roots: vec![Mat4::IDENTITY; mesh_nodes.len()],
            mesh_nodes,
        },
        SkinBinding::NoSkin => SkinMatrices {
            joints: Vec::new(),
            roots: mesh_nodes.iter().map(|&node| nodes[node].global_bind).collect(),
            mesh_nodes,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Timeline;
    use crate::scene_graph::{MeshDesc, ModelAssetBuilder};
    use glam::{Quat, Vec3};

    fn prop_asset() -> ModelAsset {
        let mut builder = ModelAssetBuilder::new("crate_stack");
        let mesh = builder.add_mesh(MeshDesc::default());
        let root = builder.add_node("root", None, Mat4::from_translation(Vec3::X));
        let lid = builder.add_node("lid", Some(root), Mat4::from_translation(Vec3::Y));
        builder.set_mesh(root, mesh).expect("root");
        builder.set_mesh(lid, mesh).expect("lid");
        let lift = Timeline::linear(lid, [(0.0, Vec3::Y), (1.0, Vec3::new(0.0, 3.0, 0.0))]).expect("lift");
        builder.add_animation(Animation::new("open", vec![lift], Vec::new(), Vec::new()));
        builder.build().expect("asset")
    }

    #[test]
    fn unskinned_meshes_get_one_root_per_mesh_node() {
        let asset = prop_asset();
        let bind = resolve(&asset, 0, None, 0.0);
        assert!(bind.joints.is_empty());
        assert!(!bind.is_skinned());
        assert_eq!(bind.mesh_nodes, vec![0, 1]);
        assert!(bind.roots[1].abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 1.0, 0.0)), 1e-6));

        let open = resolve(&asset, 0, asset.animation(0), 0.5);
        assert_eq!(open.roots.len(), 2);
        assert!(open.roots[1].abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 2.0, 0.0)), 1e-6));
    }

    #[test]
    fn bind_shortcut_matches_evaluated_bind_pose() {
        let mut builder = ModelAssetBuilder::new("skinned");
        let mesh = builder.add_mesh(MeshDesc::default());
        let root = builder.add_node("root", None, Mat4::from_rotation_y(0.3));
        let hip = builder.add_node("hip", Some(root), Mat4::from_translation(Vec3::Y));
        let knee = builder.add_node("knee", Some(hip), Mat4::from_translation(-Vec3::Y * 0.5));
        let skin = builder.add_skin("legs", vec![knee, hip], vec![Mat4::IDENTITY, Mat4::from_scale(Vec3::splat(2.0))]);
        builder.set_mesh(root, mesh).expect("root");
        builder.set_skin(root, skin).expect("root");
        let idle = Timeline::linear(hip, [(0.0, Quat::IDENTITY)]).expect("idle");
        builder.add_animation(Animation::new("idle", Vec::new(), vec![idle], Vec::new()));
        let asset = builder.build().expect("asset");

        let shortcut = resolve(&asset, root, None, 0.0);
        let tree = pose::bind_pose(&asset);
        let evaluated = resolve_with_pose(&asset, root, &tree, asset.mesh_nodes_under(root));
        assert_eq!(shortcut.joints.len(), 2);
        for (a, b) in shortcut.joints.iter().zip(&evaluated.joints) {
            assert!(a.abs_diff_eq(*b, 1e-5));
        }
        assert_eq!(shortcut.roots, vec![Mat4::IDENTITY]);

        // A rest-valued key reproduces the bind pose.
        let animated = resolve(&asset, root, asset.animation(0), 0.0);
        for (a, b) in shortcut.joints.iter().zip(&animated.joints) {
            assert!(a.abs_diff_eq(*b, 1e-5));
        }
    }
}
