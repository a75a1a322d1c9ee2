//! Buffers

use std::ptr::NonNull;

use ash::{vk, Device};
use vk_mem::Alloc;

use crate::render::api::descriptions::BufferDescription;
use crate::render::backends::vulkan::conversions::IntoVk;
use crate::render::error::{RalError, RalResult, VkResultExt};

use super::allocator::allocation_create_info;
use super::NativeResource;

/// Native buffer and its allocation
///
/// Host-visible buffers are mapped at creation and stay mapped until
/// destruction.
pub struct VulkanBuffer {
    pub buffer: vk::Buffer,
    pub allocation: vk_mem::Allocation,
    pub description: BufferDescription,
    pub mapped: Option<NonNull<u8>>,
}

impl VulkanBuffer {
    pub fn new(allocator: &vk_mem::Allocator, description: &BufferDescription) -> RalResult<Self> {
        description.validate()?;

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(description.size)
            .usage(description.usage.into_vk())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let alloc_info = allocation_create_info(description.memory_usage);

        let (buffer, mut allocation) =
            unsafe { allocator.create_buffer(&buffer_info, &alloc_info) }.call("vmaCreateBuffer")?;

        let mapped = if description.memory_usage.is_host_visible() {
            match unsafe { allocator.map_memory(&mut allocation) } {
                Ok(ptr) => NonNull::new(ptr),
                Err(code) => {
                    unsafe { allocator.destroy_buffer(buffer, &mut allocation) };
                    return Err(RalError::device("vmaMapMemory", code));
                }
            }
        } else {
            None
        };

        log::trace!(
            "Created buffer {buffer:?}: {} bytes, {:?}, {:?}",
            description.size,
            description.usage,
            description.memory_usage
        );

        Ok(Self {
            buffer,
            allocation,
            description: description.clone(),
            mapped,
        })
    }

    /// Copy `data` through the persistent mapping
    ///
    /// The caller has checked bounds and host visibility.
    pub fn write_mapped(&self, offset: u64, data: &[u8]) -> RalResult<()> {
        let mapped = self
            .mapped
            .ok_or_else(|| RalError::invalid_operation("buffer is not host visible"))?;
        // SAFETY: the mapping covers `description.size` bytes and the range was checked.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.as_ptr().add(offset as usize), data.len());
        }
        Ok(())
    }
}

impl NativeResource for VulkanBuffer {
    const LABEL: &'static str = "buffer";

    unsafe fn destroy(mut self, _device: &Device, allocator: &vk_mem::Allocator) {
        if self.mapped.take().is_some() {
            allocator.unmap_memory(&mut self.allocation);
        }
        allocator.destroy_buffer(self.buffer, &mut self.allocation);
    }
}
