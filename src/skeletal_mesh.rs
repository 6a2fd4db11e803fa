use crate::animation::Animation;
use crate::config::PlaybackConfig;
use crate::renderer::{DrawCall, PrimitiveRenderer, SkinUniform, UniformSlice, UniformStream, UniformTarget};
use crate::scene_graph::ModelAsset;
use crate::skin::{self, SkinMatrices};
use anyhow::{ensure, Result};
use glam::{Mat4, Vec4};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Per-actor handle onto a shared [`ModelAsset`] with its own playback cursor.
pub struct SkeletalMesh {
    asset: Arc<ModelAsset>,
    mesh_node: usize,
    mesh_nodes: Vec<usize>,
    animation: Option<usize>,
    time: f32,
    state: PlaybackState,
    looping: bool,
    default_looping: bool,
    speed: f32,
    finished: bool,
    uniform: Option<UniformSlice>,
    joint_limit_warned: bool,
}

impl SkeletalMesh {
    pub fn new(asset: Arc<ModelAsset>, mesh_node: usize) -> Result<Self> {
        ensure!(
            mesh_node < asset.node_count(),
            "Mesh node {mesh_node} is out of range for model '{}' ({} nodes)",
            asset.name,
            asset.node_count()
        );
        let mesh_nodes = asset.mesh_nodes_under(mesh_node);
        Ok(Self {
            asset,
            mesh_node,
            mesh_nodes,
            animation: None,
            time: 0.0,
            state: PlaybackState::Stopped,
            looping: false,
            default_looping: false,
            speed: 1.0,
            finished: false,
            uniform: None,
            joint_limit_warned: false,
        })
    }

    pub fn with_playback(asset: Arc<ModelAsset>, mesh_node: usize, playback: &PlaybackConfig) -> Result<Self> {
        let mut mesh = Self::new(asset, mesh_node)?;
        mesh.set_speed(playback.default_speed);
        mesh.default_looping = playback.default_looping;
        Ok(mesh)
    }

    /// Starts `name` from the beginning. Unknown names leave the instance untouched.
    pub fn play(&mut self, name: &str, looping: bool) -> bool {
        let Some(index) = self.asset.find_animation(name) else {
            log::warn!("[playback] model '{}' has no animation named '{name}'", self.asset.name);
            return false;
        };
        self.animation = Some(index);
        self.time = 0.0;
        self.looping = looping;
        self.finished = false;
        self.state = PlaybackState::Playing;
        true
    }

    /// [`Self::play`] with the loop flag from the instance's [`PlaybackConfig`].
    pub fn play_default(&mut self, name: &str) -> bool {
        self.play(name, self.default_looping)
    }

    /// Valid from any state; keeps the time cursor.
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
    }

    pub fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        self.state = PlaybackState::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        match self.state {
            PlaybackState::Paused => {
                self.state = PlaybackState::Playing;
                true
            }
            PlaybackState::Playing => true,
            PlaybackState::Stopped => false,
        }
    }

    /// Advances playback, resolves the pose and pushes this frame's uniform record.
    ///
    /// A non-looping animation reaching its end is evaluated at the clamped end time first and
    /// reports [`PlaybackState::Stopped`] from then on.
    pub fn update<T: UniformTarget>(
        &mut self,
        dt: f32,
        model: Mat4,
        color: Vec4,
        stream: &mut UniformStream<T>,
    ) -> Option<UniformSlice> {
        let reached_end = if self.state == PlaybackState::Playing { self.advance(dt) } else { false };

        let matrices = self.resolve();
        let packed = SkinUniform::pack(model, color, &matrices);
        if packed.truncated_joints > 0 && !self.joint_limit_warned {
            self.joint_limit_warned = true;
            log::warn!(
                "[playback] skin on '{}' has {} joints; only the first {} are uploaded",
                self.asset.name,
                matrices.joints.len(),
                matrices.joints.len() - packed.truncated_joints
            );
        }
        self.uniform = stream.push_record(&packed.uniform);

        if reached_end {
            self.state = PlaybackState::Stopped;
            self.finished = true;
        }
        self.uniform
    }

    fn advance(&mut self, dt: f32) -> bool {
        let duration = self.total_animation_time();
        if duration <= 0.0 {
            self.time = 0.0;
            return self.animation.is_some() && !self.looping;
        }
        let dt = if dt.is_finite() { dt } else { 0.0 };
        let next = self.time + dt * self.speed;
        if self.looping {
            self.time = crate::wrap_time(next, duration);
            return false;
        }
        self.time = next.clamp(0.0, duration);
        if self.speed >= 0.0 {
            next >= duration
        } else {
            next <= 0.0
        }
    }

    /// Joint and root matrices at the current cursor.
    pub fn resolve(&self) -> SkinMatrices {
        skin::resolve(&self.asset, self.mesh_node, self.animation(), self.time)
    }

    /// Issues one draw per primitive of every mesh-bearing node; returns the draw count.
    /// Nothing is drawn when this frame's record was not pushed or not uploaded.
    pub fn draw<T, R>(&self, stream: &UniformStream<T>, renderer: &mut R) -> usize
    where
        T: UniformTarget,
        R: PrimitiveRenderer,
    {
        let Some(slice) = self.uniform else {
            return 0;
        };
        if !stream.is_uploaded() {
            return 0;
        }
        let uniforms = stream.bind_range(slice);
        let mut draws = 0;
        for (root_index, &node) in self.mesh_nodes.iter().enumerate() {
            let Some(mesh) = self.asset.nodes()[node].mesh else {
                continue;
            };
            let Some(desc) = self.asset.meshes().get(mesh) else {
                continue;
            };
            for primitive in &desc.primitives {
                renderer.draw_primitive(DrawCall { uniforms, node, root_index, mesh, primitive });
                draws += 1;
            }
        }
        draws
    }

    pub fn asset(&self) -> &Arc<ModelAsset> {
        &self.asset
    }

    pub fn mesh_node(&self) -> usize {
        self.mesh_node
    }

    pub fn animation(&self) -> Option<&Animation> {
        self.animation.and_then(|index| self.asset.animation(index))
    }

    pub fn animation_name(&self) -> Option<&str> {
        self.animation().map(|animation| animation.name.as_ref())
    }

    pub fn total_animation_time(&self) -> f32 {
        self.animation().map_or(0.0, Animation::duration)
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Moves the cursor; wraps or clamps the same way [`Self::update`] does. Non-finite times
    /// are ignored.
    pub fn set_time(&mut self, time: f32) {
        if !time.is_finite() {
            return;
        }
        let duration = self.total_animation_time();
        self.time = if duration <= 0.0 {
            0.0
        } else if self.looping {
            crate::wrap_time(time, duration)
        } else {
            time.clamp(0.0, duration)
        };
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// True only when a non-looping animation ran to its end, not when it was never played or
    /// stopped explicitly.
    pub fn is_finished(&self) -> bool {
        self.state == PlaybackState::Stopped && self.finished
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn default_looping(&self) -> bool {
        self.default_looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Negative speeds play backwards. Non-finite values are ignored.
    pub fn set_speed(&mut self, speed: f32) {
        if speed.is_finite() {
            self.speed = speed;
        }
    }

    pub fn uniform(&self) -> Option<UniformSlice> {
        self.uniform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Timeline;
    use crate::renderer::MemoryUniformTarget;
    use crate::scene_graph::{MeshDesc, ModelAssetBuilder, PrimitiveDesc};
    use glam::Vec3;

    fn slide_asset() -> Arc<ModelAsset> {
        let mut builder = ModelAssetBuilder::new("slider");
        let mesh = builder.add_mesh(MeshDesc {
            name: Arc::from("block"),
            primitives: vec![
                PrimitiveDesc { index_count: 36, ..PrimitiveDesc::default() },
                PrimitiveDesc { index_count: 12, first_index: 36, ..PrimitiveDesc::default() },
            ],
        });
        let root = builder.add_node("root", None, Mat4::IDENTITY);
        builder.set_mesh(root, mesh).expect("root");
        let slide = Timeline::linear(root, [(0.0, Vec3::ZERO), (2.0, Vec3::new(2.0, 0.0, 0.0))]).expect("slide");
        builder.add_animation(Animation::new("slide", vec![slide], Vec::new(), Vec::new()));
        Arc::new(builder.build().expect("asset"))
    }

    fn stream() -> UniformStream<MemoryUniformTarget> {
        UniformStream::new(MemoryUniformTarget::new(), 64 * 1024)
    }

    #[test]
    fn play_unknown_animation_leaves_state_alone() {
        let mut mesh = SkeletalMesh::new(slide_asset(), 0).expect("mesh");
        assert!(!mesh.play("jump", true));
        assert_eq!(mesh.state(), PlaybackState::Stopped);
        assert!(mesh.animation().is_none());
        assert!(!mesh.is_finished(), "never played is not finished");
        assert!(mesh.play("slide", true));
        assert_eq!(mesh.animation_name(), Some("slide"));
        assert!((mesh.total_animation_time() - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn pause_and_resume_transitions() {
        let mut mesh = SkeletalMesh::new(slide_asset(), 0).expect("mesh");
        assert!(!mesh.pause());
        assert!(!mesh.resume(), "nothing to resume while stopped");
        mesh.play("slide", false);
        assert!(mesh.resume(), "resume while playing is a no-op success");
        assert!(mesh.pause());
        assert_eq!(mesh.state(), PlaybackState::Paused);
        assert!(!mesh.pause());

        let mut stream = stream();
        stream.reset();
        mesh.update(1.0, Mat4::IDENTITY, Vec4::ONE, &mut stream);
        assert_eq!(mesh.time(), 0.0, "paused playback does not advance");
        assert!(mesh.resume());
        mesh.update(0.5, Mat4::IDENTITY, Vec4::ONE, &mut stream);
        assert!((mesh.time() - 0.5).abs() < 1e-6);

        mesh.stop();
        assert_eq!(mesh.state(), PlaybackState::Stopped);
        assert!((mesh.time() - 0.5).abs() < 1e-6, "stop keeps the cursor");
        assert!(!mesh.is_finished());
    }

    #[test]
    fn draw_emits_one_call_per_primitive_with_bound_range() {
        let mut mesh = SkeletalMesh::new(slide_asset(), 0).expect("mesh");
        let mut stream = stream();
        stream.reset();
        let mut calls = Vec::new();
        assert_eq!(mesh.draw(&stream, &mut |call: DrawCall<'_>| calls.push(call.uniforms)), 0);

        let slice = mesh.update(0.0, Mat4::IDENTITY, Vec4::ONE, &mut stream).expect("pushed");
        assert!(stream.upload());
        let drawn = mesh.draw(&stream, &mut |call: DrawCall<'_>| calls.push(call.uniforms));
        assert_eq!(drawn, 2);
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|range| *range == stream.bind_range(slice)));
        assert_eq!(calls[0].size as usize, SkinUniform::SIZE);
    }

    #[test]
    fn full_stream_skips_the_draw() {
        let mut mesh = SkeletalMesh::new(slide_asset(), 0).expect("mesh");
        let mut stream = UniformStream::new(MemoryUniformTarget::new(), SkinUniform::SIZE - 1);
        stream.reset();
        assert!(mesh.update(0.1, Mat4::IDENTITY, Vec4::ONE, &mut stream).is_none());
        let mut draws = 0;
        assert_eq!(mesh.draw(&stream, &mut |_call: DrawCall<'_>| draws += 1), 0);
        assert_eq!(draws, 0);
    }

    #[test]
    fn rejects_out_of_range_mesh_node() {
        assert!(SkeletalMesh::new(slide_asset(), 5).is_err());
        let playback = PlaybackConfig { default_speed: 0.25, default_looping: true };
        let mesh = SkeletalMesh::with_playback(slide_asset(), 0, &playback).expect("mesh");
        assert!((mesh.speed() - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn play_default_uses_configured_loop_flag() {
        let looping = PlaybackConfig { default_speed: 1.0, default_looping: true };
        let mut mesh = SkeletalMesh::with_playback(slide_asset(), 0, &looping).expect("mesh");
        assert!(mesh.default_looping());
        assert!(mesh.play_default("slide"));
        assert!(mesh.is_looping());

        let once = PlaybackConfig { default_speed: 1.0, default_looping: false };
        let mut mesh = SkeletalMesh::with_playback(slide_asset(), 0, &once).expect("mesh");
        assert!(mesh.play_default("slide"));
        assert!(!mesh.is_looping());
        assert!(!mesh.play_default("jump"));
        assert!(!SkeletalMesh::new(slide_asset(), 0).expect("mesh").default_looping());
    }

    #[test]
    fn non_finite_time_and_delta_are_ignored() {
        let mut mesh = SkeletalMesh::new(slide_asset(), 0).expect("mesh");
        let mut stream = stream();
        mesh.play("slide", false);
        mesh.set_time(0.5);
        mesh.set_time(f32::NAN);
        mesh.set_time(f32::INFINITY);
        assert!((mesh.time() - 0.5).abs() < 1e-6);

        stream.reset();
        assert!(mesh.update(f32::NAN, Mat4::IDENTITY, Vec4::ONE, &mut stream).is_some());
        assert!((mesh.time() - 0.5).abs() < 1e-6);
        assert!(mesh.is_playing());
        mesh.update(f32::NEG_INFINITY, Mat4::IDENTITY, Vec4::ONE, &mut stream);
        assert!((mesh.time() - 0.5).abs() < 1e-6);

        mesh.set_looping(true);
        mesh.update(f32::INFINITY, Mat4::IDENTITY, Vec4::ONE, &mut stream);
        assert!((mesh.time() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn failed_upload_skips_the_draw() {
        struct FailingTarget;
        impl UniformTarget for FailingTarget {
            fn write(&mut self, _buffer: usize, _bytes: &[u8]) -> Result<()> {
                anyhow::bail!("device lost")
            }
        }

        let mut mesh = SkeletalMesh::new(slide_asset(), 0).expect("mesh");
        let mut stream = UniformStream::new(FailingTarget, 64 * 1024);
        stream.reset();
        assert!(mesh.update(0.0, Mat4::IDENTITY, Vec4::ONE, &mut stream).is_some());
        assert!(!stream.upload());
        let mut draws = 0;
        assert_eq!(mesh.draw(&stream, &mut |_call: DrawCall<'_>| draws += 1), 0);
        assert_eq!(draws, 0);
    }
}
