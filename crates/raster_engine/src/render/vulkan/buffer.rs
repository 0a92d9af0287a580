//! GPU buffers and the fixed-capacity vertex buffer the baked draws read

use ash::{vk, Device};
use std::cell::Cell;

use crate::render::vulkan::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::sync::{Fence, FenceWait};
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};
use crate::scene::Vertex;

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it
    ///
    /// More than one distinct entry in `queue_families` makes the buffer
    /// `CONCURRENT` across them.
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        queue_families: &[u32],
    ) -> VulkanResult<Self> {
        let mut families = queue_families.to_vec();
        families.sort_unstable();
        families.dedup();

        let mut buffer_info = vk::BufferCreateInfo::builder().size(size).usage(usage);
        buffer_info = if families.len() > 1 {
            buffer_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            buffer_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };
        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = find_memory_type(memory_properties, mem_requirements.memory_type_bits, properties).and_then(
            |memory_type_index| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(mem_requirements.size)
                    .memory_type_index(memory_type_index);
                unsafe { device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api) }
            },
        );

        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Copy `data` to the start of host-visible memory
    pub fn write_bytes(&self, data: &[u8]) -> VulkanResult<()> {
        if data.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Write of {} bytes into a {} byte buffer", data.len(), self.size),
            });
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub const fn size(&self) -> vk::DeviceSize {
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

/// Find memory type with required properties
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// `vertices` followed by [`Vertex::PADDING`] up to `capacity`
pub fn pad_vertices(vertices: &[Vertex], capacity: usize) -> VulkanResult<Vec<Vertex>> {
    if vertices.len() > capacity {
        return Err(VulkanError::CapacityExceeded {
            requested: vertices.len(),
            capacity,
        });
    }

    let mut padded = Vec::with_capacity(capacity);
    padded.extend_from_slice(vertices);
    padded.resize(capacity, Vertex::PADDING);
    Ok(padded)
}

/// Whether a submitted copy may still be reading the staging buffer
///
/// Only a successful submission marks a copy pending, so a failed upload
/// never leaves an unsignaled fence that something later waits on.
#[derive(Debug, Default)]
struct PendingCopy {
    pending: Cell<bool>,
}

impl PendingCopy {
    fn submitted(&self) {
        self.pending.set(true);
    }

    fn is_pending(&self) -> bool {
        self.pending.get()
    }

    /// Wait for the pending copy, if any, through `wait`
    fn settle(&self, wait: impl FnOnce() -> VulkanResult<FenceWait>) -> VulkanResult<()> {
        if !self.pending.get() {
            return Ok(());
        }
        match wait()? {
            FenceWait::Signaled => {
                self.pending.set(false);
                Ok(())
            }
            FenceWait::TimedOut => Err(VulkanError::Api(vk::Result::TIMEOUT)),
        }
    }
}

/// Device-local vertex buffer of fixed capacity, filled through a staging copy
///
/// Every baked command buffer draws exactly `capacity` vertices from it.
/// Uploads overwrite the whole buffer, padding unused capacity with vertices
/// that are clipped away.
pub struct VertexBuffer {
    device: Device,
    transfer_queue: vk::Queue,
    copy_commands: vk::CommandBuffer,
    upload_fence: Fence,
    copy: PendingCopy,
    // Declared after the command buffer and fence that use them
    transfer_pool: CommandPool,
    staging: Buffer,
    buffer: Buffer,
    capacity: usize,
    timeout_ns: u64,
}

impl VertexBuffer {
    /// Allocate a buffer for `capacity` vertices, filled with padding
    ///
    /// `timeout_ns` bounds the wait for each upload's copy.
    pub fn new(context: &VulkanContext, capacity: usize, timeout_ns: u64) -> VulkanResult<Self> {
        let device = context.raw_device();
        let families = context.queue_families();
        let memory_properties = &context.physical_device().memory_properties;
        let size = (capacity * Vertex::stride()) as vk::DeviceSize;

        let buffer = Buffer::new(
            device.clone(),
            memory_properties,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            &[families.graphics, families.transfer],
        )?;

        let staging = Buffer::new(
            device.clone(),
            memory_properties,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &[families.transfer],
        )?;

        let transfer_pool = CommandPool::new(device.clone(), families.transfer)?;
        let copy_commands = transfer_pool
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "Driver returned no command buffer".to_string(),
            })?;
        let upload_fence = Fence::new(device.clone(), true)?;

        let vertex_buffer = Self {
            device,
            transfer_queue: context.transfer_queue(),
            copy_commands,
            upload_fence,
            copy: PendingCopy::default(),
            transfer_pool,
            staging,
            buffer,
            capacity,
            timeout_ns,
        };

        vertex_buffer.upload(&[])?;
        log::debug!("Vertex buffer created for {} vertices ({} bytes)", capacity, size);
        Ok(vertex_buffer)
    }

    /// Replace the buffer contents with `vertices`
    ///
    /// Blocks until the copy has landed. A copy left pending by an earlier
    /// timed-out upload is waited for first. The caller must make sure no
    /// draw that reads the buffer is still executing.
    pub fn upload(&self, vertices: &[Vertex]) -> VulkanResult<()> {
        let padded = pad_vertices(vertices, self.capacity)?;
        self.copy.settle(|| self.upload_fence.wait(self.timeout_ns))?;

        self.staging.write_bytes(bytemuck::cast_slice(&padded))?;

        unsafe {
            self.device
                .reset_command_buffer(self.copy_commands, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
        }
        let mut recorder = CommandRecorder::new(self.copy_commands, self.device.clone());
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        recorder.cmd_copy_buffer(self.staging.handle(), self.buffer.handle(), self.buffer.size())?;
        let command_buffer = recorder.end()?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();

        self.upload_fence.reset()?;
        unsafe {
            self.device
                .queue_submit(self.transfer_queue, &[submit_info], self.upload_fence.handle())
                .map_err(VulkanError::Api)?;
        }
        self.copy.submitted();

        self.copy.settle(|| self.upload_fence.wait(self.timeout_ns))?;
        log::trace!("Uploaded {} of {} vertices", vertices.len(), self.capacity);
        Ok(())
    }

    /// Get buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Vertices the buffer holds, also the baked draw count
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        if self.copy.is_pending() {
            let _ = self.upload_fence.wait(u64::MAX);
        }
        self.transfer_pool.free_command_buffers(&[self.copy_commands]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in properties.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        properties
    }

    #[test]
    fn test_find_memory_type_respects_filter() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&properties, 0b111, host).unwrap(), 1);
        assert_eq!(
            find_memory_type(&properties, 0b100, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            2
        );
        assert!(matches!(
            find_memory_type(&properties, 0b001, host),
            Err(VulkanError::NoSuitableMemoryType)
        ));
    }

    #[test]
    fn test_pad_fills_tail_with_clipped_vertices() {
        let vertex = Vertex::new([0.1, 0.2, 0.3], [1.0, 0.0, 0.0]);
        let padded = pad_vertices(&[vertex, vertex], 6).unwrap();

        assert_eq!(padded.len(), 6);
        assert_eq!(&padded[..2], &[vertex, vertex]);
        assert!(padded[2..].iter().all(|v| *v == Vertex::PADDING));
        assert!(padded[2..].iter().all(|v| v.position[2] > 1.0));
    }

    #[test]
    fn test_pad_exact_and_empty() {
        let vertex = Vertex::new([0.0, 0.0, 0.5], [1.0, 1.0, 1.0]);
        assert_eq!(pad_vertices(&[vertex; 3], 3).unwrap(), vec![vertex; 3]);
        assert_eq!(pad_vertices(&[], 3).unwrap(), vec![Vertex::PADDING; 3]);
    }

    #[test]
    fn test_settle_skips_wait_without_submission() {
        let copy = PendingCopy::default();
        let mut waited = false;
        copy.settle(|| {
            waited = true;
            Ok(FenceWait::Signaled)
        })
        .unwrap();

        assert!(!waited);
        assert!(!copy.is_pending());
    }

    #[test]
    fn test_timed_out_copy_stays_pending() {
        let copy = PendingCopy::default();
        copy.submitted();

        let result = copy.settle(|| Ok(FenceWait::TimedOut));
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::TIMEOUT))));
        assert!(copy.is_pending());

        copy.settle(|| Ok(FenceWait::Signaled)).unwrap();
        assert!(!copy.is_pending());
    }

    #[test]
    fn test_failed_wait_keeps_copy_pending() {
        let copy = PendingCopy::default();
        copy.submitted();

        let result = copy.settle(|| Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)));
        assert!(result.is_err());
        assert!(copy.is_pending());
    }

    #[test]
    fn test_pad_rejects_overflow() {
        let result = pad_vertices(&[Vertex::default(); 4], 3);
        assert!(matches!(
            result,
            Err(VulkanError::CapacityExceeded { requested: 4, capacity: 3 })
        ));
    }
}
