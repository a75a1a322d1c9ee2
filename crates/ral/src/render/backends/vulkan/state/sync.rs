//! RAII wrappers for semaphores, fences and command pools

use ash::{vk, Device};

use crate::render::error::{RalResult, VkResultExt};

/// Binary semaphore
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Device) -> RalResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None) }.call("vkCreateSemaphore")?;
        Ok(Self { device, semaphore })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// CPU-visible completion fence
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled so the first wait returns
    pub fn new(device: Device, signaled: bool) -> RalResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }.call("vkCreateFence")?;
        Ok(Self { device, fence })
    }

    /// Block until signaled
    pub fn wait(&self) -> RalResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, u64::MAX) }.call("vkWaitForFences")
    }

    pub fn reset(&self) -> RalResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }.call("vkResetFences")
    }

    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Command pool whose buffers are recycled by resetting the whole pool
pub struct CommandPool {
    device: Device,
    pool: vk::CommandPool,
}

impl CommandPool {
    pub fn new(device: Device, queue_family_index: u32, flags: vk::CommandPoolCreateFlags) -> RalResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family_index);
        let pool = unsafe { device.create_command_pool(&create_info, None) }.call("vkCreateCommandPool")?;
        Ok(Self { device, pool })
    }

    /// Allocate one primary command buffer
    pub fn allocate(&self) -> RalResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }.call("vkAllocateCommandBuffers")?;
        Ok(buffers[0])
    }

    /// Return every buffer of the pool to the initial state
    pub fn reset(&self) -> RalResult<()> {
        unsafe {
            self.device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
                .call("vkResetCommandPool")
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
