pub mod animation;
pub mod assets;
pub mod config;
pub mod frame;
pub mod pose;
pub mod renderer;
pub mod scene_graph;
pub mod skeletal_mesh;
pub mod skin;
pub mod time;

pub use frame::{FramePhase, FrameSchedule};
pub use skeletal_mesh::{PlaybackState, SkeletalMesh};

/// Wraps `time` into `[0, duration)`, including negative times from reversed playback.
pub(crate) fn wrap_time(time: f32, duration: f32) -> f32 {
    if duration <= 0.0 || !time.is_finite() {
        return 0.0;
    }
    let wrapped = time.rem_euclid(duration);
    // rem_euclid can round up to `duration` for tiny negative inputs
    if wrapped >= duration {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::wrap_time;

    #[test]
    fn wraps_both_directions() {
        assert!((wrap_time(2.5, 2.0) - 0.5).abs() < 1e-6);
        assert!((wrap_time(-0.5, 2.0) - 1.5).abs() < 1e-6);
        assert!((wrap_time(-4.5, 2.0) - 1.5).abs() < 1e-6);
        assert_eq!(wrap_time(2.0, 2.0), 0.0);
        assert_eq!(wrap_time(-1e-9, 2.0), 0.0);
        assert_eq!(wrap_time(1.0, 0.0), 0.0);
    }
}
