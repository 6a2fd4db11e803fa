use anyhow::{bail, Result};
use glam::{Quat, Vec3};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    #[default]
    Linear,
}

/// Values that can be blended between two keyframes.
pub trait Interpolate: Copy {
    fn interpolate(from: Self, to: Self, t: f32) -> Self;
    fn is_finite_value(&self) -> bool;
}

impl Interpolate for Vec3 {
    #[inline]
    fn interpolate(from: Self, to: Self, t: f32) -> Self {
        from.lerp(to, t)
    }

    fn is_finite_value(&self) -> bool {
        self.is_finite()
    }
}

impl Interpolate for Quat {
    /// Shortest-arc spherical blend; the result stays unit length.
    #[inline]
    fn interpolate(from: Self, to: Self, t: f32) -> Self {
        from.slerp(to, t).normalize()
    }

    fn is_finite_value(&self) -> bool {
        self.is_finite()
    }
}

/// Samples an ordered keyframe slice at `time`, clamping outside the keyed range.
///
/// Callers guarantee `keyframes` is non-empty; [`Timeline`] enforces this at construction.
/// A NaN `time` samples the first key.
pub(crate) fn interpolate<T: Interpolate>(
    keyframes: &[Keyframe<T>],
    interpolation: Interpolation,
    time: f32,
) -> T {
    let first = &keyframes[0];
    if time.is_nan() || time <= first.time || keyframes.len() == 1 {
        return first.value;
    }
    let last = &keyframes[keyframes.len() - 1];
    if time >= last.time {
        return last.value;
    }
    // first.time < time < last.time, so next lands in 1..len
    let next = keyframes.partition_point(|kf| kf.time <= time);
    let from = &keyframes[next - 1];
    let to = &keyframes[next];
    match interpolation {
        Interpolation::Step => from.value,
        Interpolation::Linear => {
            let span = (to.time - from.time).max(f32::EPSILON);
            T::interpolate(from.value, to.value, (time - from.time) / span)
        }
    }
}

/// Keyframed property of one node.
#[derive(Clone, Debug)]
pub struct Timeline<T> {
    pub target: usize,
    pub interpolation: Interpolation,
    keyframes: Arc<[Keyframe<T>]>,
}

pub type TranslationTimeline = Timeline<Vec3>;
pub type RotationTimeline = Timeline<Quat>;
pub type ScaleTimeline = Timeline<Vec3>;

impl<T: Interpolate> Timeline<T> {
    pub fn new(target: usize, interpolation: Interpolation, keyframes: Vec<Keyframe<T>>) -> Result<Self> {
        if keyframes.is_empty() {
            bail!("Timeline for node {target} must contain at least one keyframe");
        }
        let mut frames: Vec<Keyframe<T>> = Vec::with_capacity(keyframes.len());
        for frame in keyframes {
            if !frame.time.is_finite() {
                bail!("Timeline for node {target} contains a non-finite keyframe time");
            }
            if frame.time < 0.0 {
                bail!("Timeline for node {target} contains a negative keyframe time ({})", frame.time);
            }
            if !frame.value.is_finite_value() {
                bail!("Timeline for node {target} contains a non-finite value at t={}", frame.time);
            }
            if let Some(last) = frames.last_mut() {
                if (frame.time - last.time).abs() <= f32::EPSILON {
                    last.value = frame.value;
                    continue;
                }
                if frame.time < last.time {
                    bail!(
                        "Timeline for node {target} is not ordered by time ({} after {})",
                        frame.time,
                        last.time
                    );
                }
            }
            frames.push(frame);
        }
        Ok(Self { target, interpolation, keyframes: Arc::from(frames.into_boxed_slice()) })
    }

    pub fn linear<I>(target: usize, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f32, T)>,
    {
        let keyframes = keys.into_iter().map(|(time, value)| Keyframe { time, value }).collect();
        Self::new(target, Interpolation::Linear, keyframes)
    }

    #[inline]
    pub fn sample(&self, time: f32) -> T {
        interpolate(&self.keyframes, self.interpolation, time)
    }

    pub fn keyframes(&self) -> &[Keyframe<T>] {
        &self.keyframes
    }

    pub fn start_time(&self) -> f32 {
        self.keyframes[0].time
    }

    pub fn end_time(&self) -> f32 {
        self.keyframes[self.keyframes.len() - 1].time
    }
}

#[derive(Clone, Debug)]
pub struct Animation {
    pub name: Arc<str>,
    duration: f32,
    pub translations: Vec<TranslationTimeline>,
    pub rotations: Vec<RotationTimeline>,
    pub scales: Vec<ScaleTimeline>,
}

impl Animation {
    /// Duration is derived from the latest keyframe across all timelines.
    pub fn new(
        name: impl Into<Arc<str>>,
        translations: Vec<TranslationTimeline>,
        rotations: Vec<RotationTimeline>,
        scales: Vec<ScaleTimeline>,
    ) -> Self {
        let mut animation = Self { name: name.into(), duration: 0.0, translations, rotations, scales };
        animation.duration = animation.last_key_time();
        animation
    }

    /// Requests an explicit duration; it never drops below the last keyframe.
    pub fn with_duration(mut self, duration: f32) -> Self {
        let requested = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        self.duration = requested.max(self.last_key_time());
        self
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn timeline_count(&self) -> usize {
        self.translations.len() + self.rotations.len() + self.scales.len()
    }

    pub fn targets(&self) -> impl Iterator<Item = usize> + '_ {
        self.translations
            .iter()
            .map(|t| t.target)
            .chain(self.rotations.iter().map(|t| t.target))
            .chain(self.scales.iter().map(|t| t.target))
    }

    fn last_key_time(&self) -> f32 {
        let mut last = 0.0_f32;
        for timeline in &self.translations {
            last = last.max(timeline.end_time());
        }
        for timeline in &self.rotations {
            last = last.max(timeline.end_time());
        }
        for timeline in &self.scales {
            last = last.max(timeline.end_time());
        }
        last
    }
}
