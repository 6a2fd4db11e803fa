use crate::animation::{Animation, Interpolation, Keyframe, Timeline};
use crate::scene_graph::{MeshDesc, ModelAsset, ModelAssetBuilder, PrimitiveDesc};
use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Quat, Vec3};
use gltf::animation::util::{ReadOutputs, Rotations};
use gltf::animation::Property;
use std::path::Path;
use std::sync::Arc;

/// Imports every node, skin, mesh and TRS animation channel of a glTF file.
///
/// Primitives are laid out as if all meshes shared one index and vertex buffer in document
/// order. Cubic spline channels and morph target weights are skipped.
pub fn load_model_from_gltf(path: impl AsRef<Path>) -> Result<ModelAsset> {
    let path_ref = path.as_ref();
    let (document, buffers, _) = gltf::import(path_ref)
        .with_context(|| format!("Failed to import GLTF model from {}", path_ref.display()))?;

    let model_name = path_ref.file_stem().and_then(|stem| stem.to_str()).unwrap_or("model").to_string();
    let mut builder = ModelAssetBuilder::new(model_name);

    let mut first_index = 0u32;
    let mut base_vertex = 0i32;
    for mesh in document.meshes() {
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            let vertex_count =
                primitive.get(&gltf::Semantic::Positions).map(|accessor| accessor.count()).unwrap_or(0);
            let index_count =
                primitive.indices().map(|accessor| accessor.count()).unwrap_or(vertex_count) as u32;
            primitives.push(PrimitiveDesc {
                index_count,
                first_index,
                base_vertex,
                material: primitive.material().index(),
            });
            first_index += index_count;
            base_vertex += vertex_count as i32;
        }
        let name = mesh.name().map(str::to_string).unwrap_or_else(|| format!("mesh_{}", mesh.index()));
        builder.add_mesh(MeshDesc { name: Arc::from(name), primitives });
    }

    for node in document.nodes() {
        let name = node.name().map(str::to_string).unwrap_or_else(|| format!("node_{}", node.index()));
        builder.add_node(name, None, Mat4::from_cols_array_2d(&node.transform().matrix()));
    }
    for node in document.nodes() {
        for child in node.children() {
            builder.set_parent(child.index(), Some(node.index()))?;
        }
        if let Some(mesh) = node.mesh() {
            builder.set_mesh(node.index(), mesh.index())?;
        }
        if let Some(skin) = node.skin() {
            builder.set_skin(node.index(), skin.index())?;
        }
    }

    for skin in document.skins() {
        let joints: Vec<usize> = skin.joints().map(|joint| joint.index()).collect();
        let reader = skin.reader(|buffer| Some(&buffers[buffer.index()]));
        let inverse_binds: Vec<Mat4> = match reader.read_inverse_bind_matrices() {
            Some(matrices) => matrices.map(|matrix| Mat4::from_cols_array_2d(&matrix)).collect(),
            None => Vec::new(),
        };
        let name = skin.name().map(str::to_string).unwrap_or_else(|| format!("skin_{}", skin.index()));
        builder.add_skin(name, joints, inverse_binds);
    }

    for (anim_index, animation) in document.animations().enumerate() {
        let clip_name: String =
            animation.name().map(str::to_string).unwrap_or_else(|| format!("animation_{anim_index}"));

        let mut translations = Vec::new();
        let mut rotations = Vec::new();
        let mut scales = Vec::new();
        for channel in animation.channels() {
            let target = channel.target().node().index();
            let interpolation = match channel.sampler().interpolation() {
                gltf::animation::Interpolation::Linear => Interpolation::Linear,
                gltf::animation::Interpolation::Step => Interpolation::Step,
                gltf::animation::Interpolation::CubicSpline => {
                    log::warn!(
                        "[assets] animation '{clip_name}' uses CubicSpline interpolation; skipping channel (node {target})."
                    );
                    continue;
                }
            };

            let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
            let Some(inputs) = reader.read_inputs() else {
                continue;
            };
            let times: Vec<f32> = inputs.collect();
            if times.is_empty() {
                continue;
            }
            let Some(outputs) = reader.read_outputs() else {
                continue;
            };

            match (channel.target().property(), outputs) {
                (Property::Translation, ReadOutputs::Translations(values)) => {
                    let values: Vec<Vec3> = values.map(Vec3::from_array).collect();
                    let timeline = build_timeline(&clip_name, target, interpolation, &times, values)?;
                    translations.push(timeline);
                }
                (Property::Scale, ReadOutputs::Scales(values)) => {
                    let values: Vec<Vec3> = values.map(Vec3::from_array).collect();
                    let timeline = build_timeline(&clip_name, target, interpolation, &times, values)?;
                    scales.push(timeline);
                }
                (Property::Rotation, ReadOutputs::Rotations(values)) => {
                    let values = convert_rotations(values);
                    let timeline = build_timeline(&clip_name, target, interpolation, &times, values)?;
                    rotations.push(timeline);
                }
                _ => {}
            }
        }

        if translations.is_empty() && rotations.is_empty() && scales.is_empty() {
            log::debug!("[assets] animation '{clip_name}' has no usable channels; skipped");
            continue;
        }
        builder.add_animation(Animation::new(clip_name, translations, rotations, scales));
    }

    builder.build().with_context(|| format!("GLTF '{}' describes an invalid node graph", path_ref.display()))
}

fn build_timeline<T: crate::animation::Interpolate>(
    clip_name: &str,
    target: usize,
    interpolation: Interpolation,
    times: &[f32],
    values: Vec<T>,
) -> Result<Timeline<T>> {
    if times.len() != values.len() {
        return Err(anyhow!(
            "Animation '{clip_name}' channel count mismatch (node {target}: {} times, {} values)",
            times.len(),
            values.len()
        ));
    }
    let keyframes = times.iter().copied().zip(values).map(|(time, value)| Keyframe { time, value }).collect();
    Timeline::new(target, interpolation, keyframes)
        .with_context(|| format!("Animation '{clip_name}' has an invalid channel"))
}

fn convert_rotations(rotations: Rotations) -> Vec<Quat> {
    rotations
        .into_f32()
        .map(|components| {
            let quat = Quat::from_xyzw(components[0], components[1], components[2], components[3]);
            if quat.length_squared() > 0.0 {
                quat.normalize()
            } else {
                Quat::IDENTITY
            }
        })
        .collect()
}
