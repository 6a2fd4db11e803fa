use super::skin_uniform::SkinUniform;
use super::uniform_stream::{UniformRange, UniformTarget};
use anyhow::{ensure, Result};

/// Two `UNIFORM | COPY_DST` buffers written through the queue.
pub struct WgpuUniformTarget {
    queue: wgpu::Queue,
    buffers: [wgpu::Buffer; 2],
    capacity: u64,
    padded: Vec<u8>,
}

impl WgpuUniformTarget {
    pub fn new(device: &wgpu::Device, queue: wgpu::Queue, capacity: u64) -> Self {
        let size = align_to_copy(capacity.max(wgpu::COPY_BUFFER_ALIGNMENT));
        let make = |label: &'static str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let buffers = [make("Skin Uniform Stream A"), make("Skin Uniform Stream B")];
        Self { queue, buffers, capacity: size, padded: Vec::new() }
    }

    pub fn buffer(&self, index: usize) -> &wgpu::Buffer {
        &self.buffers[index]
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn buffer_binding(&self, range: UniformRange) -> wgpu::BufferBinding<'_> {
        wgpu::BufferBinding {
            buffer: &self.buffers[range.buffer],
            offset: range.offset,
            size: wgpu::BufferSize::new(range.size),
        }
    }

    /// Bind group exposing one record at binding 0 of `layout`.
    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        range: UniformRange,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Skin Uniform Range BG"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(self.buffer_binding(range)),
            }],
        })
    }

    pub fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Skin Uniform BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(SkinUniform::SIZE as u64),
                },
                count: None,
            }],
        })
    }
}

impl UniformTarget for WgpuUniformTarget {
    fn write(&mut self, buffer: usize, bytes: &[u8]) -> Result<()> {
        let len = bytes.len() as u64;
        ensure!(buffer < self.buffers.len(), "Uniform buffer index {buffer} out of range");
        ensure!(
            len <= self.capacity,
            "Staged {len} bytes exceed GPU uniform buffer capacity {}",
            self.capacity
        );
        if len % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(&self.buffers[buffer], 0, bytes);
            return Ok(());
        }
        self.padded.clear();
        self.padded.extend_from_slice(bytes);
        self.padded.resize(align_to_copy(len) as usize, 0);
        self.queue.write_buffer(&self.buffers[buffer], 0, &self.padded);
        Ok(())
    }
}

fn align_to_copy(len: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    len.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::align_to_copy;

    #[test]
    fn copy_sizes_round_up_to_four_bytes() {
        assert_eq!(align_to_copy(0), 0);
        assert_eq!(align_to_copy(1), 4);
        assert_eq!(align_to_copy(4), 4);
        assert_eq!(align_to_copy(3937), 3940);
    }
}
