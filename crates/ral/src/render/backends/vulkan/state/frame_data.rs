//! Per-slot native objects of the frame ring

use ash::{vk, Device};

use crate::render::error::RalResult;

use super::sync::{CommandPool, Fence, Semaphore};

/// Native state of one frame-in-flight slot
///
/// Pacing and deferred deletions live in [`crate::render::api::FrameRing`];
/// this only holds what the queue needs.
pub struct FrameData {
    pub command_pool: CommandPool,
    pub command_buffer: vk::CommandBuffer,
    pub image_available: Semaphore,
    pub render_finished: Semaphore,
    /// Created signaled so the first wait on the slot returns at once
    pub in_flight: Fence,
}

impl FrameData {
    pub fn new(device: &Device, queue_family_index: u32) -> RalResult<Self> {
        let command_pool = CommandPool::new(device.clone(), queue_family_index, vk::CommandPoolCreateFlags::empty())?;
        let command_buffer = command_pool.allocate()?;

        Ok(Self {
            command_pool,
            command_buffer,
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
        })
    }
}

/// Command pool and fence used by `immediate_submit`
pub struct UploadContext {
    pub command_pool: CommandPool,
    pub command_buffer: vk::CommandBuffer,
    pub fence: Fence,
}

impl UploadContext {
    pub fn new(device: &Device, queue_family_index: u32) -> RalResult<Self> {
        let command_pool =
            CommandPool::new(device.clone(), queue_family_index, vk::CommandPoolCreateFlags::TRANSIENT)?;
        let command_buffer = command_pool.allocate()?;

        Ok(Self {
            command_pool,
            command_buffer,
            fence: Fence::new(device.clone(), false)?,
        })
    }
}
