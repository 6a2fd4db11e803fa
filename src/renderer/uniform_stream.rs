use crate::config::StreamConfig;
use anyhow::{ensure, Result};

/// Typical `minUniformBufferOffsetAlignment` across desktop and mobile GPUs.
pub const UNIFORM_OFFSET_ALIGNMENT: usize = 256;

/// Location of one pushed record inside the frame's staging region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformSlice {
    pub offset: u32,
    pub size: u32,
}

/// A slice resolved against one of the two GPU buffers, ready to bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformRange {
    pub buffer: usize,
    pub offset: u64,
    pub size: u64,
}

/// Destination of uploaded staging bytes. Implementations own two equally sized buffers.
pub trait UniformTarget {
    /// Copies `bytes` to the start of `buffer`. An error means nothing was written.
    fn write(&mut self, buffer: usize, bytes: &[u8]) -> Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StreamStats {
    pub frames: u64,
    pub pushes: u64,
    pub rejected: u64,
    pub bytes_staged: u64,
    pub uploads: u64,
    pub failed_uploads: u64,
    pub bytes_uploaded: u64,
    pub peak_staged: usize,
}

impl StreamStats {
    fn record_push(&mut self, bytes: usize, staged: usize) {
        self.pushes = self.pushes.saturating_add(1);
        self.bytes_staged = self.bytes_staged.saturating_add(bytes as u64);
        self.peak_staged = self.peak_staged.max(staged);
    }

    fn record_upload(&mut self, bytes: usize) {
        self.uploads = self.uploads.saturating_add(1);
        self.bytes_uploaded = self.bytes_uploaded.saturating_add(bytes as u64);
    }
}

/// Double-buffered uniform staging area for per-instance skinning records.
///
/// Frame order: [`reset`](Self::reset), any number of [`push`](Self::push),
/// [`upload`](Self::upload), then [`bind_range`](Self::bind_range) for each draw. `upload`
/// writes buffer [`write_index`](Self::write_index) and flips; `bind_range` always refers to the
/// most recently uploaded buffer, so the next frame's upload lands in the other one while the
/// GPU may still be reading this frame's draws.
pub struct UniformStream<T: UniformTarget> {
    target: T,
    staging: Vec<u8>,
    capacity: usize,
    alignment: usize,
    current: usize,
    uploaded: bool,
    overflow_logged: bool,
    stats: StreamStats,
}

impl<T: UniformTarget> UniformStream<T> {
    pub fn new(target: T, capacity: usize) -> Self {
        Self {
            target,
            staging: Vec::with_capacity(capacity),
            capacity,
            alignment: UNIFORM_OFFSET_ALIGNMENT,
            current: 0,
            uploaded: false,
            overflow_logged: false,
            stats: StreamStats::default(),
        }
    }

    pub fn with_alignment(target: T, capacity: usize, alignment: usize) -> Result<Self> {
        ensure!(alignment.is_power_of_two(), "Uniform offset alignment {alignment} is not a power of two");
        let mut stream = Self::new(target, capacity);
        stream.alignment = alignment;
        Ok(stream)
    }

    pub fn from_config(target: T, config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        Self::with_alignment(target, config.capacity_bytes, config.alignment)
    }

    /// Clears the staging region. Neither GPU buffer is touched.
    pub fn reset(&mut self) {
        self.staging.clear();
        self.uploaded = false;
        self.overflow_logged = false;
        self.stats.frames = self.stats.frames.saturating_add(1);
    }

    /// Appends `bytes` at the next aligned offset. `None` when the record would not fit.
    pub fn push(&mut self, bytes: &[u8]) -> Option<UniformSlice> {
        if bytes.is_empty() {
            return None;
        }
        let offset = align_up(self.staging.len(), self.alignment);
        let end = offset.checked_add(bytes.len()).filter(|&end| end <= self.capacity);
        let Some(end) = end else {
            self.stats.rejected = self.stats.rejected.saturating_add(1);
            if !self.overflow_logged {
                self.overflow_logged = true;
                log::warn!(
                    "[stream] uniform stream full ({} of {} bytes staged); dropping {}-byte record",
                    self.staging.len(),
                    self.capacity,
                    bytes.len()
                );
            }
            return None;
        };
        self.staging.resize(offset, 0);
        self.staging.extend_from_slice(bytes);
        self.stats.record_push(bytes.len(), end);
        Some(UniformSlice { offset: offset as u32, size: bytes.len() as u32 })
    }

    pub fn push_record<R: bytemuck::Pod>(&mut self, record: &R) -> Option<UniformSlice> {
        self.push(bytemuck::bytes_of(record))
    }

    /// Copies staged bytes into the buffer not bound for rendering, then flips. Returns whether
    /// anything was uploaded; an empty frame keeps the previous binding. A failed write leaves
    /// both buffers and the binding as they were, and this frame's records are not drawable.
    pub fn upload(&mut self) -> bool {
        if self.staging.is_empty() {
            return false;
        }
        if let Err(err) = self.target.write(self.current, &self.staging) {
            self.stats.failed_uploads = self.stats.failed_uploads.saturating_add(1);
            log::warn!("[stream] upload of {} staged bytes failed: {err:#}", self.staging.len());
            return false;
        }
        self.stats.record_upload(self.staging.len());
        self.current = 1 - self.current;
        self.uploaded = true;
        true
    }

    /// Whether this frame's staged records reached the GPU, i.e. its slices may be bound.
    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }

    pub fn bind_range(&self, slice: UniformSlice) -> UniformRange {
        UniformRange { buffer: self.read_index(), offset: slice.offset as u64, size: slice.size as u64 }
    }

    /// Buffer the next [`upload`](Self::upload) writes.
    pub fn write_index(&self) -> usize {
        self.current
    }

    /// Buffer [`bind_range`](Self::bind_range) reads.
    pub fn read_index(&self) -> usize {
        1 - self.current
    }

    pub fn staged(&self) -> &[u8] {
        &self.staging
    }

    pub fn staged_len(&self) -> usize {
        self.staging.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn into_target(self) -> T {
        self.target
    }
}

#[inline]
fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// CPU-side stand-in for the two GPU buffers, used by headless tools and tests.
#[derive(Default)]
pub struct MemoryUniformTarget {
    buffers: [Vec<u8>; 2],
    writes: [u64; 2],
}

impl MemoryUniformTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, index: usize) -> &[u8] {
        &self.buffers[index]
    }

    pub fn write_count(&self, index: usize) -> u64 {
        self.writes[index]
    }

    pub fn read(&self, range: UniformRange) -> Option<&[u8]> {
        let start = usize::try_from(range.offset).ok()?;
        let end = start.checked_add(usize::try_from(range.size).ok()?)?;
        self.buffers.get(range.buffer)?.get(start..end)
    }
}

impl UniformTarget for MemoryUniformTarget {
    fn write(&mut self, buffer: usize, bytes: &[u8]) -> Result<()> {
        ensure!(buffer < 2, "Uniform buffer index {buffer} out of range");
        let dst = &mut self.buffers[buffer];
        if dst.len() < bytes.len() {
            dst.resize(bytes.len(), 0);
        }
        dst[..bytes.len()].copy_from_slice(bytes);
        self.writes[buffer] += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(capacity: usize) -> UniformStream<MemoryUniformTarget> {
        UniformStream::new(MemoryUniformTarget::new(), capacity)
    }

    #[test]
    fn pushes_land_on_aligned_offsets() {
        let mut stream = stream(4096);
        stream.reset();
        let a = stream.push(&[1u8; 10]).expect("first");
        let b = stream.push(&[2u8; 300]).expect("second");
        let c = stream.push(&[3u8; 4]).expect("third");
        assert_eq!(a, UniformSlice { offset: 0, size: 10 });
        assert_eq!(b.offset, 256);
        assert_eq!(c.offset, 768);
        assert_eq!(stream.staged_len(), 772);
        assert!(stream.staged()[10..256].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn rejects_records_past_capacity() {
        let mut stream = stream(600);
        stream.reset();
        assert!(stream.push(&[0u8; 200]).is_some());
        assert!(stream.push(&[0u8; 200]).is_some());
        assert!(stream.push(&[0u8; 100]).is_none(), "512 + 100 exceeds the 600-byte capacity");
        assert!(stream.push(&[0u8; 80]).is_some(), "a smaller record still fits at 512");
        assert!(stream.push(&[]).is_none());
        let stats = stream.stats();
        assert_eq!(stats.pushes, 3);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.peak_staged, 592);
        stream.reset();
        assert!(stream.push(&[0u8; 600]).is_some(), "reset frees the staging region");
    }

    #[test]
    fn upload_alternates_buffers_and_skips_empty_frames() {
        let mut stream = stream(1024);
        stream.reset();
        assert!(!stream.upload());
        assert_eq!(stream.write_index(), 0);

        stream.push(&[7u8; 16]).expect("push");
        assert!(stream.upload());
        assert_eq!(stream.read_index(), 0);
        assert_eq!(stream.write_index(), 1);
        assert_eq!(stream.target().write_count(0), 1);
        assert_eq!(stream.target().write_count(1), 0);

        stream.reset();
        stream.push(&[9u8; 16]).expect("push");
        assert!(stream.upload());
        assert_eq!(stream.read_index(), 1);
        assert_eq!(stream.target().write_count(1), 1);
    }

    struct RejectingTarget {
        limit: usize,
        writes: usize,
    }

    impl UniformTarget for RejectingTarget {
        fn write(&mut self, _buffer: usize, bytes: &[u8]) -> Result<()> {
            ensure!(bytes.len() <= self.limit, "{} bytes exceed the {}-byte buffer", bytes.len(), self.limit);
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn failed_write_keeps_buffers_and_binding() {
        let mut stream = UniformStream::new(RejectingTarget { limit: 512, writes: 0 }, 4096);
        stream.reset();
        stream.push(&[1u8; 64]).expect("push");
        assert!(stream.upload());
        assert!(stream.is_uploaded());
        assert_eq!(stream.read_index(), 0);

        stream.reset();
        assert!(!stream.is_uploaded());
        stream.push(&[2u8; 64]).expect("push");
        stream.push(&[3u8; 64]).expect("push");
        stream.push(&[4u8; 64]).expect("push");
        assert_eq!(stream.staged_len(), 576);
        assert!(!stream.upload(), "write larger than the target buffer fails");
        assert!(!stream.is_uploaded());
        assert_eq!(stream.write_index(), 1, "no flip after a failed write");
        assert_eq!(stream.read_index(), 0);

        let stats = stream.stats();
        assert_eq!(stats.uploads, 1);
        assert_eq!(stats.failed_uploads, 1);
        assert_eq!(stats.bytes_uploaded, 64);
        assert_eq!(stream.target().writes, 1);
    }

    #[test]
    fn alignment_must_be_power_of_two() {
        assert!(UniformStream::with_alignment(MemoryUniformTarget::new(), 1024, 96).is_err());
        let stream = UniformStream::with_alignment(MemoryUniformTarget::new(), 1024, 64).expect("stream");
        assert_eq!(stream.alignment(), 64);
    }
}
