use std::time::{Duration, Instant};

/// Frame clock feeding `dt` into skeletal mesh updates. A fixed step makes playback
/// deterministic for tools and tests.
pub struct Time {
    start: Instant,
    last: Instant,
    pub delta: Duration,
    fixed_step: Option<Duration>,
    frames: u64,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, delta: Duration::ZERO, fixed_step: None, frames: 0 }
    }

    pub fn fixed(step_seconds: f32) -> Self {
        let mut time = Self::new();
        time.fixed_step = Some(Duration::from_secs_f32(step_seconds.max(0.0)));
        time
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = self.fixed_step.unwrap_or(now - self.last);
        self.last = now;
        self.frames += 1;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        match self.fixed_step {
            Some(step) => step.as_secs_f32() * self.frames as f32,
            None => self.last.duration_since(self.start).as_secs_f32(),
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}
