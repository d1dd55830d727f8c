//! Buffer management for vertex data, uniforms and particle instances
//!
//! Owning wrappers with deterministic destruction. Per-frame data (uniform
//! block, particle instances) lives in host-visible buffers that stay mapped
//! for the renderer's lifetime; the frame-slot fence protocol guarantees the
//! GPU is done with a region before the CPU rewrites it.

use ash::vk;
use std::marker::PhantomData;

use super::context::{VulkanContext, VulkanError, VulkanResult};

/// Buffer with bound device memory
pub struct Buffer {
    device: ash::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and allocate matching memory
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device().clone();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index =
            context.find_memory_type(requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };

        unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Write a slice of plain-old-data into the buffer (maps and unmaps)
    pub fn write_slice<T: bytemuck::Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)? as *mut u8;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Map the whole buffer and leave it mapped
    fn map_persistent(&self) -> VulkanResult<*mut u8> {
        unsafe {
            self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map(|ptr| ptr as *mut u8)
                .map_err(VulkanError::Api)
        }
    }

    fn unmap(&self) {
        unsafe {
            self.device.unmap_memory(self.memory);
        }
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Allocated size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Vertex buffer for static mesh data
pub struct VertexBuffer {
    buffer: Buffer,
}

impl VertexBuffer {
    /// Create and fill a vertex buffer
    pub fn new<T: bytemuck::Pod>(context: &VulkanContext, vertices: &[T]) -> VulkanResult<Self> {
        let size = std::mem::size_of_val(vertices) as vk::DeviceSize;
        let buffer = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_slice(vertices)?;
        Ok(Self { buffer })
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

/// Index buffer for static mesh data
pub struct IndexBuffer {
    buffer: Buffer,
    index_count: u32,
}

impl IndexBuffer {
    /// Create and fill an index buffer
    pub fn new(context: &VulkanContext, indices: &[u32]) -> VulkanResult<Self> {
        let size = std::mem::size_of_val(indices) as vk::DeviceSize;
        let buffer = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::INDEX_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_slice(indices)?;
        Ok(Self {
            buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// One frame slot's persistently mapped uniform block.
///
/// The slot-fence wait precedes every write, so overwriting the region is
/// safe even while other slots are in flight.
pub struct PerFrameUniform<T: bytemuck::Pod> {
    buffer: Buffer,
    mapped: *mut u8,
    _phantom: PhantomData<T>,
}

impl<T: bytemuck::Pod> PerFrameUniform<T> {
    /// Create a host-coherent uniform buffer and keep it mapped
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context,
            std::mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let mapped = buffer.map_persistent()?;
        Ok(Self {
            buffer,
            mapped,
            _phantom: PhantomData,
        })
    }

    /// Overwrite the uniform block
    pub fn write(&self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped, bytes.len());
        }
    }

    /// Buffer handle for descriptor writes
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

impl<T: bytemuck::Pod> Drop for PerFrameUniform<T> {
    fn drop(&mut self) {
        self.buffer.unmap();
    }
}

/// One frame slot's persistently mapped particle instance stream.
pub struct InstanceBuffer {
    buffer: Buffer,
    mapped: *mut u8,
    capacity: u32,
    stride: u32,
}

impl InstanceBuffer {
    /// Create a mapped vertex buffer holding up to `capacity` instances
    pub fn new<T: bytemuck::Pod>(context: &VulkanContext, capacity: u32) -> VulkanResult<Self> {
        let stride = std::mem::size_of::<T>() as u32;
        let buffer = Buffer::new(
            context,
            vk::DeviceSize::from(capacity) * vk::DeviceSize::from(stride),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let mapped = buffer.map_persistent()?;
        Ok(Self {
            buffer,
            mapped,
            capacity,
            stride,
        })
    }

    /// Copy instances starting at instance offset `first`. Returns how many
    /// were written; overflow beyond the capacity is truncated.
    pub fn write_at<T: bytemuck::Pod>(&self, first: u32, instances: &[T]) -> u32 {
        debug_assert_eq!(std::mem::size_of::<T>() as u32, self.stride);
        let room = self.capacity.saturating_sub(first) as usize;
        let count = instances.len().min(room);
        let bytes: &[u8] = bytemuck::cast_slice(&instances[..count]);
        unsafe {
            let dst = self.mapped.add(first as usize * self.stride as usize);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        }
        count as u32
    }

    /// Maximum number of instances
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Byte offset of instance index `first`
    pub fn byte_offset(&self, first: u32) -> vk::DeviceSize {
        vk::DeviceSize::from(first) * vk::DeviceSize::from(self.stride)
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

impl Drop for InstanceBuffer {
    fn drop(&mut self) {
        self.buffer.unmap();
    }
}
