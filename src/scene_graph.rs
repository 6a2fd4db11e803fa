use crate::animation::Animation;
use anyhow::{anyhow, bail, ensure, Result};
use glam::{Mat4, Quat, Vec3};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Node {
    pub name: Arc<str>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub local_bind: Mat4,
    pub global_bind: Mat4,
    /// Identity unless the node is a joint of some skin.
    pub inverse_bind: Mat4,
    pub bind_translation: Vec3,
    pub bind_rotation: Quat,
    pub bind_scale: Vec3,
}

#[derive(Clone, Debug)]
pub struct Skin {
    pub name: Arc<str>,
    pub joints: Arc<[usize]>,
}

/// Skinning mode of a node, resolved once when the asset is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkinBinding {
    HasSkin { skin: usize, joints: Arc<[usize]> },
    NoSkin,
}

impl SkinBinding {
    pub fn joint_count(&self) -> usize {
        match self {
            SkinBinding::HasSkin { joints, .. } => joints.len(),
            SkinBinding::NoSkin => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrimitiveDesc {
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub material: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct MeshDesc {
    pub name: Arc<str>,
    pub primitives: Vec<PrimitiveDesc>,
}

impl Default for MeshDesc {
    fn default() -> Self {
        Self { name: Arc::from("mesh"), primitives: Vec::new() }
    }
}

/// Immutable node hierarchy, skins, meshes and animations shared by every instance.
#[derive(Clone, Debug)]
pub struct ModelAsset {
    pub name: Arc<str>,
    nodes: Vec<Node>,
    roots: Vec<usize>,
    skins: Vec<Skin>,
    meshes: Vec<MeshDesc>,
    animations: Vec<Animation>,
    bindings: Vec<SkinBinding>,
}

impl ModelAsset {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn skins(&self) -> &[Skin] {
        &self.skins
    }

    pub fn meshes(&self) -> &[MeshDesc] {
        &self.meshes
    }

    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    pub fn animation(&self, index: usize) -> Option<&Animation> {
        self.animations.get(index)
    }

    pub fn find_animation(&self, name: &str) -> Option<usize> {
        self.animations.iter().position(|animation| animation.name.as_ref() == name)
    }

    pub fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.name.as_ref() == name)
    }

    pub fn skin_binding(&self, node: usize) -> &SkinBinding {
        self.bindings.get(node).unwrap_or(&SkinBinding::NoSkin)
    }

    /// Mesh-bearing nodes under `start` (inclusive), depth-first in child order.
    pub fn mesh_nodes_under(&self, start: usize) -> Vec<usize> {
        let mut found = Vec::new();
        if start >= self.nodes.len() {
            return found;
        }
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.mesh.is_some() {
                found.push(index);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        found
    }

    /// First node carrying a mesh, preferring skinned ones.
    pub fn default_mesh_node(&self) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| node.mesh.is_some() && node.skin.is_some())
            .or_else(|| self.nodes.iter().position(|node| node.mesh.is_some()))
    }
}

struct NodeDraft {
    name: Arc<str>,
    parent: Option<usize>,
    local: Mat4,
    mesh: Option<usize>,
    skin: Option<usize>,
    inverse_bind: Option<Mat4>,
}

/// Collects nodes, skins, meshes and animations and validates them into a [`ModelAsset`].
pub struct ModelAssetBuilder {
    name: Arc<str>,
    nodes: Vec<NodeDraft>,
    skins: Vec<(Arc<str>, Vec<usize>, Vec<Mat4>)>,
    meshes: Vec<MeshDesc>,
    animations: Vec<Animation>,
}

impl ModelAssetBuilder {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            skins: Vec::new(),
            meshes: Vec::new(),
            animations: Vec::new(),
        }
    }

    /// Parents may be declared after their children; links are checked in [`Self::build`].
    pub fn add_node(&mut self, name: impl Into<Arc<str>>, parent: Option<usize>, local: Mat4) -> usize {
        self.nodes.push(NodeDraft {
            name: name.into(),
            parent,
            local,
            mesh: None,
            skin: None,
            inverse_bind: None,
        });
        self.nodes.len() - 1
    }

    pub fn set_parent(&mut self, node: usize, parent: Option<usize>) -> Result<()> {
        let draft = self.nodes.get_mut(node).ok_or_else(|| anyhow!("Node {node} does not exist"))?;
        draft.parent = parent;
        Ok(())
    }

    pub fn set_mesh(&mut self, node: usize, mesh: usize) -> Result<()> {
        let draft = self.nodes.get_mut(node).ok_or_else(|| anyhow!("Node {node} does not exist"))?;
        draft.mesh = Some(mesh);
        Ok(())
    }

    pub fn set_skin(&mut self, node: usize, skin: usize) -> Result<()> {
        let draft = self.nodes.get_mut(node).ok_or_else(|| anyhow!("Node {node} does not exist"))?;
        draft.skin = Some(skin);
        Ok(())
    }

    pub fn add_mesh(&mut self, mesh: MeshDesc) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    /// `inverse_binds` may be empty (all identity) or match `joints` one to one.
    pub fn add_skin(&mut self, name: impl Into<Arc<str>>, joints: Vec<usize>, inverse_binds: Vec<Mat4>) -> usize {
        self.skins.push((name.into(), joints, inverse_binds));
        self.skins.len() - 1
    }

    pub fn add_animation(&mut self, animation: Animation) -> usize {
        self.animations.push(animation);
        self.animations.len() - 1
    }

    pub fn build(mut self) -> Result<ModelAsset> {
        let count = self.nodes.len();
        ensure!(count > 0, "Model '{}' has no nodes", self.name);

        for (index, draft) in self.nodes.iter().enumerate() {
            if let Some(parent) = draft.parent {
                ensure!(parent < count, "Node '{}' references missing parent {parent}", draft.name);
                ensure!(parent != index, "Node '{}' is its own parent", draft.name);
            }
            if let Some(mesh) = draft.mesh {
                ensure!(mesh < self.meshes.len(), "Node '{}' references missing mesh {mesh}", draft.name);
            }
            if let Some(skin) = draft.skin {
                ensure!(skin < self.skins.len(), "Node '{}' references missing skin {skin}", draft.name);
            }
        }
        // A parent chain longer than the node count must revisit a node.
        for (index, draft) in self.nodes.iter().enumerate() {
            let mut steps = 0usize;
            let mut cursor = draft.parent;
            while let Some(parent) = cursor {
                steps += 1;
                if steps > count {
                    bail!("Node '{}' ({index}) is part of a parent cycle", draft.name);
                }
                cursor = self.nodes[parent].parent;
            }
        }

        for (skin_index, (name, joints, inverse_binds)) in self.skins.iter().enumerate() {
            ensure!(
                inverse_binds.is_empty() || inverse_binds.len() == joints.len(),
                "Skin '{name}' has {} joints but {} inverse bind matrices",
                joints.len(),
                inverse_binds.len()
            );
            for (slot, &joint) in joints.iter().enumerate() {
                ensure!(joint < count, "Skin '{name}' ({skin_index}) references missing joint node {joint}");
                let inverse = inverse_binds.get(slot).copied().unwrap_or(Mat4::IDENTITY);
                let draft = &mut self.nodes[joint];
                if let Some(existing) = draft.inverse_bind {
                    if !existing.abs_diff_eq(inverse, 1e-5) {
                        log::warn!(
                            "[assets] joint '{}' has conflicting inverse bind matrices across skins; keeping the last",
                            draft.name
                        );
                    }
                }
                draft.inverse_bind = Some(inverse);
            }
        }

        for animation in &self.animations {
            if let Some(target) = animation.targets().find(|&target| target >= count) {
                bail!("Animation '{}' targets missing node {target}", animation.name);
            }
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut roots = Vec::new();
        for (index, draft) in self.nodes.iter().enumerate() {
            match draft.parent {
                Some(parent) => children[parent].push(index),
                None => roots.push(index),
            }
        }

        let globals = compute_global_binds(&self.nodes);
        let skins: Vec<Skin> = self
            .skins
            .into_iter()
            .map(|(name, joints, _)| Skin { name, joints: Arc::from(joints.into_boxed_slice()) })
            .collect();

        let mut nodes = Vec::with_capacity(count);
        let mut bindings = Vec::with_capacity(count);
        for ((draft, node_children), global_bind) in self.nodes.into_iter().zip(children).zip(globals) {
            let (bind_scale, bind_rotation, bind_translation) = draft.local.to_scale_rotation_translation();
            bindings.push(match draft.skin {
                Some(skin) => SkinBinding::HasSkin { skin, joints: Arc::clone(&skins[skin].joints) },
                None => SkinBinding::NoSkin,
            });
            nodes.push(Node {
                name: draft.name,
                parent: draft.parent,
                children: node_children,
                mesh: draft.mesh,
                skin: draft.skin,
                local_bind: draft.local,
                global_bind,
                inverse_bind: draft.inverse_bind.unwrap_or(Mat4::IDENTITY),
                bind_translation,
                bind_rotation: bind_rotation.normalize(),
                bind_scale,
            });
        }

        Ok(ModelAsset {
            name: self.name,
            nodes,
            roots,
            skins,
            meshes: self.meshes,
            animations: self.animations,
            bindings,
        })
    }
}

fn compute_global_binds(nodes: &[NodeDraft]) -> Vec<Mat4> {
    let mut globals: Vec<Option<Mat4>> = vec![None; nodes.len()];
    let mut chain = Vec::new();
    for start in 0..nodes.len() {
        let mut cursor = Some(start);
        while let Some(index) = cursor {
            if globals[index].is_some() {
                break;
            }
            chain.push(index);
            cursor = nodes[index].parent;
        }
        while let Some(index) = chain.pop() {
            let parent_global =
                nodes[index].parent.and_then(|parent| globals[parent]).unwrap_or(Mat4::IDENTITY);
            globals[index] = Some(parent_global * nodes[index].local);
        }
    }
    globals.into_iter().map(|global| global.unwrap_or(Mat4::IDENTITY)).collect()
}
