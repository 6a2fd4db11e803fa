use crate::renderer::{UniformStream, UniformTarget};
use anyhow::{bail, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Updating,
    Uploaded,
}

/// Owns the uniform stream and enforces the per-frame order
/// `begin_frame` (reset) -> updates (push) -> `end_updates` (upload) -> draws (bind).
///
/// Updates pushed outside the update phase or draws before the upload would bind offsets
/// against the wrong buffer, so those calls fail instead.
pub struct FrameSchedule<T: UniformTarget> {
    stream: UniformStream<T>,
    phase: FramePhase,
    frame: u64,
}

impl<T: UniformTarget> FrameSchedule<T> {
    pub fn new(stream: UniformStream<T>) -> Self {
        Self { stream, phase: FramePhase::Idle, frame: 0 }
    }

    /// Starts a frame. Allowed after a completed frame or before the first one.
    pub fn begin_frame(&mut self) -> Result<()> {
        if self.phase == FramePhase::Updating {
            bail!("Frame {} is still in its update phase; call end_updates first", self.frame);
        }
        self.stream.reset();
        self.frame += 1;
        self.phase = FramePhase::Updating;
        Ok(())
    }

    /// Stream handle for `SkeletalMesh::update` calls.
    pub fn updates(&mut self) -> Result<&mut UniformStream<T>> {
        if self.phase != FramePhase::Updating {
            bail!("Uniform pushes are only valid between begin_frame and end_updates");
        }
        Ok(&mut self.stream)
    }

    /// Uploads the frame's records. Returns whether anything was uploaded.
    pub fn end_updates(&mut self) -> Result<bool> {
        if self.phase != FramePhase::Updating {
            bail!("end_updates called outside the update phase (phase {:?})", self.phase);
        }
        let uploaded = self.stream.upload();
        self.phase = FramePhase::Uploaded;
        Ok(uploaded)
    }

    /// Stream handle for `SkeletalMesh::draw` calls.
    pub fn draws(&self) -> Result<&UniformStream<T>> {
        if self.phase != FramePhase::Uploaded {
            bail!("Draws must follow end_updates (phase {:?})", self.phase);
        }
        Ok(&self.stream)
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn stream(&self) -> &UniformStream<T> {
        &self.stream
    }

    pub fn into_stream(self) -> UniformStream<T> {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::MemoryUniformTarget;

    fn schedule() -> FrameSchedule<MemoryUniformTarget> {
        FrameSchedule::new(UniformStream::new(MemoryUniformTarget::new(), 4096))
    }

    #[test]
    fn enforces_reset_update_upload_draw_order() {
        let mut frames = schedule();
        assert!(frames.updates().is_err());
        assert!(frames.draws().is_err());
        assert!(frames.end_updates().is_err());

        frames.begin_frame().expect("begin");
        assert!(frames.begin_frame().is_err(), "frame already open");
        assert!(frames.draws().is_err(), "draw before upload");
        frames.updates().expect("updates").push(&[1u8; 32]).expect("push");
        assert!(frames.end_updates().expect("upload"));
        assert_eq!(frames.phase(), FramePhase::Uploaded);
        assert!(frames.updates().is_err(), "push after upload");
        let stream = frames.draws().expect("draws");
        assert_eq!(stream.read_index(), 0);

        frames.begin_frame().expect("next frame");
        assert_eq!(frames.frame(), 2);
        assert_eq!(frames.stream().staged_len(), 0);
    }
}
