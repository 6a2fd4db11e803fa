use crate::animation::Animation;
use crate::scene_graph::{ModelAsset, Node};
use glam::{Mat4, Quat, Vec3};
use smallvec::SmallVec;

/// Evaluated state of one node for a single pose evaluation.
#[derive(Clone, Copy, Debug)]
pub struct Transformation {
    pub overridden: bool,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub local: Mat4,
    /// Accumulated hierarchy transform, propagated to children.
    pub global: Mat4,
    /// `global * inverse_bind`, the matrix a skin consumes.
    pub skinning: Mat4,
}

impl Transformation {
    fn bind(node: &Node) -> Self {
        Self {
            overridden: false,
            translation: node.bind_translation,
            rotation: node.bind_rotation,
            scale: node.bind_scale,
            local: node.local_bind,
            global: Mat4::IDENTITY,
            skinning: Mat4::IDENTITY,
        }
    }
}

/// Per-node transforms for one animation at one time. Never reused across evaluations.
#[derive(Clone, Debug)]
pub struct AnimatedNodeTree {
    transforms: Vec<Transformation>,
    computed: usize,
}

impl AnimatedNodeTree {
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn transformation(&self, node: usize) -> Option<&Transformation> {
        self.transforms.get(node)
    }

    pub fn transformations(&self) -> &[Transformation] {
        &self.transforms
    }

    pub fn global(&self, node: usize) -> Mat4 {
        self.transforms[node].global
    }

    pub fn skinning(&self, node: usize) -> Mat4 {
        self.transforms[node].skinning
    }

    pub fn is_overridden(&self, node: usize) -> bool {
        self.transforms.get(node).map_or(false, |slot| slot.overridden)
    }

    /// Number of global transforms computed; equals the node count for every evaluation.
    pub fn computed_count(&self) -> usize {
        self.computed
    }
}

/// Evaluates every node of `asset` for `animation` at `time`. `None` yields the bind pose.
///
/// `time` is used as-is; wrapping or clamping belongs to the caller.
pub fn evaluate(asset: &ModelAsset, animation: Option<&Animation>, time: f32) -> AnimatedNodeTree {
    evaluate_ordered(asset, animation, time, 0..asset.node_count())
}

pub fn bind_pose(asset: &ModelAsset) -> AnimatedNodeTree {
    evaluate(asset, None, 0.0)
}

/// Same as [`evaluate`], visiting `order` first. Nodes missing from `order` are still computed,
/// and each node is computed exactly once whatever the visiting order.
pub fn evaluate_ordered<I>(
    asset: &ModelAsset,
    animation: Option<&Animation>,
    time: f32,
    order: I,
) -> AnimatedNodeTree
where
    I: IntoIterator<Item = usize>,
{
    let nodes = asset.nodes();
    let mut transforms: Vec<Transformation> = nodes.iter().map(Transformation::bind).collect();
    if let Some(animation) = animation {
        apply_overrides(&mut transforms, animation, time);
    }

    let mut calculated = vec![false; nodes.len()];
    let mut computed = 0usize;
    let mut chain: SmallVec<[usize; 16]> = SmallVec::new();
    let visits = order.into_iter().filter(|&index| index < nodes.len()).chain(0..nodes.len());
    for start in visits {
        // Collect the uncalculated ancestry, then resolve it root-first.
        let mut cursor = Some(start);
        while let Some(index) = cursor {
            if calculated[index] {
                break;
            }
            chain.push(index);
            cursor = nodes[index].parent;
        }
        while let Some(index) = chain.pop() {
            let parent_global = match nodes[index].parent {
                Some(parent) => transforms[parent].global,
                None => Mat4::IDENTITY,
            };
            let slot = &mut transforms[index];
            if slot.overridden {
                slot.local = Mat4::from_scale_rotation_translation(slot.scale, slot.rotation, slot.translation);
            }
            slot.global = parent_global * slot.local;
            slot.skinning = slot.global * nodes[index].inverse_bind;
            calculated[index] = true;
            computed += 1;
        }
    }

    AnimatedNodeTree { transforms, computed }
}

fn apply_overrides(transforms: &mut [Transformation], animation: &Animation, time: f32) {
    for timeline in &animation.translations {
        if let Some(slot) = transforms.get_mut(timeline.target) {
            slot.translation = timeline.sample(time);
            slot.overridden = true;
        }
    }
    for timeline in &animation.rotations {
        if let Some(slot) = transforms.get_mut(timeline.target) {
            slot.rotation = timeline.sample(time);
            slot.overridden = true;
        }
    }
    for timeline in &animation.scales {
        if let Some(slot) = transforms.get_mut(timeline.target) {
            slot.scale = timeline.sample(time);
            slot.overridden = true;
        }
    }
}
