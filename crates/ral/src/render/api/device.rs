//! # Device Abstraction
//!
//! [`Device`] is the one interface every backend implements: resource
//! creation and destruction against typed handles, frame acquisition,
//! submission and presentation.
//!
//! ## Frame Protocol
//!
//! ```text
//! begin_frame()  -> wait on the reused slot's fence, flush its deletions,
//!                   acquire a swapchain image, reset the slot's commands
//! record         -> CommandBuffer methods, handles resolved immediately
//! end_frame(cmd) -> submit (wait image-available, signal render-finished
//!                   and the slot fence), present, advance the slot
//! ```
//!
//! `begin_frame` returns `Ok(None)` when the swapchain had to be recreated
//! and the frame is skipped. Out-of-date and suboptimal results never reach
//! the caller; anything fatal does.
//!
//! ## Resource Lifetime
//!
//! `destroy_*` invalidates the handle immediately and defers the native
//! destruction until the GPU can no longer be using the object. Creation
//! failures (bad descriptions, allocator exhaustion, shader rejection) are
//! logged and produce `Handle::INVALID`; only fatal device errors are
//! returned as `Err`.

use std::ptr::NonNull;

use bytemuck::Pod;

use crate::core::config::{GraphicsApi, RalConfig};
use crate::render::api::command_buffer::CommandBuffer;
use crate::render::api::descriptions::{
    BufferCopy, BufferDescription, DescriptorSetDescription, DescriptorSetLayoutDescription, DescriptorWrite,
    PipelineDescription, SamplerDescription, ShaderDescription, TextureDescription,
};
use crate::render::api::handle::{
    BufferHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, Handle, PipelineHandle,
    ResourceKind, SamplerHandle, ShaderHandle, TextureHandle,
};
use crate::render::api::types::{BufferUsage, Extent2D, Format, MemoryUsage};
use crate::render::backends::headless::HeadlessDevice;
use crate::render::backends::vulkan::VulkanDevice;
use crate::render::error::{RalError, RalResult};
use crate::render::window::Window;

/// Recording callback for [`Device::immediate_submit`]
pub type RecordFn<'a> = &'a mut dyn FnMut(&mut dyn CommandBuffer) -> RalResult<()>;

/// Graphics device: resource factory and frame orchestrator
pub trait Device {
    /// Backend this device was created for
    fn graphics_api(&self) -> GraphicsApi;

    /// Allocate a buffer
    ///
    /// `Ok(Handle::INVALID)` when the description is rejected or memory runs out.
    fn create_buffer(&mut self, description: &BufferDescription) -> RalResult<BufferHandle>;
    /// Allocate a texture with its default view
    fn create_texture(&mut self, description: &TextureDescription) -> RalResult<TextureHandle>;
    /// Create a shader module from SPIR-V
    fn create_shader(&mut self, description: &ShaderDescription) -> RalResult<ShaderHandle>;
    /// Build a graphics or compute pipeline and its layout
    fn create_pipeline(&mut self, description: &PipelineDescription) -> RalResult<PipelineHandle>;
    /// Create a descriptor set layout
    fn create_descriptor_set_layout(
        &mut self,
        description: &DescriptorSetLayoutDescription,
    ) -> RalResult<DescriptorSetLayoutHandle>;
    /// Allocate a descriptor set and apply its initial writes
    fn create_descriptor_set(&mut self, description: &DescriptorSetDescription) -> RalResult<DescriptorSetHandle>;
    /// Create a sampler; anisotropy is clamped to what the device supports
    fn create_sampler(&mut self, description: &SamplerDescription) -> RalResult<SamplerHandle>;

    /// Rewrite bindings of an existing descriptor set
    ///
    /// The set must not be in use by a submitted frame that has not retired.
    fn update_descriptor_set(&mut self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) -> RalResult<()>;

    /// Invalidate `handle` now and release the native buffer once no frame in flight uses it
    ///
    /// Stale or invalid handles are ignored. The same holds for every `destroy_*`.
    fn destroy_buffer(&mut self, handle: BufferHandle);
    /// Deferred destruction of a texture
    fn destroy_texture(&mut self, handle: TextureHandle);
    /// Deferred destruction of a shader module
    fn destroy_shader(&mut self, handle: ShaderHandle);
    /// Deferred destruction of a pipeline
    fn destroy_pipeline(&mut self, handle: PipelineHandle);
    /// Deferred destruction of a descriptor set layout
    fn destroy_descriptor_set_layout(&mut self, handle: DescriptorSetLayoutHandle);
    /// Deferred destruction of a descriptor set
    fn destroy_descriptor_set(&mut self, handle: DescriptorSetHandle);
    /// Deferred destruction of a sampler
    fn destroy_sampler(&mut self, handle: SamplerHandle);

    /// Whether `handle` refers to a live buffer of the current generation
    fn is_valid_buffer(&self, handle: BufferHandle) -> bool;
    /// Whether `handle` refers to a live texture
    fn is_valid_texture(&self, handle: TextureHandle) -> bool;
    /// Whether `handle` refers to a live shader module
    fn is_valid_shader(&self, handle: ShaderHandle) -> bool;
    /// Whether `handle` refers to a live pipeline
    fn is_valid_pipeline(&self, handle: PipelineHandle) -> bool;
    /// Whether `handle` refers to a live descriptor set layout
    fn is_valid_descriptor_set_layout(&self, handle: DescriptorSetLayoutHandle) -> bool;
    /// Whether `handle` refers to a live descriptor set
    fn is_valid_descriptor_set(&self, handle: DescriptorSetHandle) -> bool;
    /// Whether `handle` refers to a live sampler
    fn is_valid_sampler(&self, handle: SamplerHandle) -> bool;

    /// Description a live buffer was created with
    fn get_buffer(&self, handle: BufferHandle) -> RalResult<BufferDescription>;

    /// Description a live texture was created with
    fn get_texture(&self, handle: TextureHandle) -> RalResult<TextureDescription>;

    /// Host pointer to a persistently mapped buffer
    ///
    /// Fails with `InvalidOperation` for `GpuOnly` memory. The pointer stays
    /// valid until the buffer is destroyed.
    fn map_buffer(&mut self, handle: BufferHandle) -> RalResult<NonNull<u8>>;

    /// Release a mapping obtained from `map_buffer`
    fn unmap_buffer(&mut self, handle: BufferHandle) -> RalResult<()>;

    /// Write `data` at `offset`, staging through `immediate_submit` for GPU-only memory
    fn upload_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]) -> RalResult<()>;

    /// Start a frame; `None` means the frame was skipped
    fn begin_frame(&mut self) -> RalResult<Option<Box<dyn CommandBuffer>>>;

    /// Submit and present the frame recorded into `command_buffer`
    fn end_frame(&mut self, command_buffer: Box<dyn CommandBuffer>) -> RalResult<()>;

    /// Record and run one-off work, blocking until the GPU has finished it
    fn immediate_submit(&mut self, record: RecordFn<'_>) -> RalResult<()>;

    /// Block until every submission has retired
    fn wait_idle(&mut self) -> RalResult<()>;

    /// Rebuild the swapchain now (full pipeline stall)
    fn recreate_swapchain(&mut self) -> RalResult<()>;

    /// Request a swapchain rebuild at the next frame boundary
    fn resize(&mut self, width: u32, height: u32);

    /// Extent of the current swapchain images
    fn swapchain_extent(&self) -> Extent2D;
    /// Format of the current swapchain images
    fn swapchain_format(&self) -> Format;
    /// Number of frames that may be recorded before the CPU waits on the GPU
    fn frames_in_flight(&self) -> usize;

    /// Slot the next or current frame records into
    fn current_frame_index(&self) -> usize;
}

/// Typed conveniences over [`Device`]
pub trait DeviceExt: Device {
    /// Upload a slice of plain-old-data values
    fn upload_slice<T: Pod>(&mut self, handle: BufferHandle, offset: u64, data: &[T]) -> RalResult<()> {
        self.upload_buffer(handle, offset, bytemuck::cast_slice(data))
    }

    /// Create a buffer sized for `data` and fill it
    ///
    /// GPU-only buffers get `TRANSFER_DST` added so they can be staged into.
    /// Returns `Handle::INVALID` if creation or upload fails.
    fn create_buffer_with_data<T: Pod>(
        &mut self,
        usage: BufferUsage,
        memory_usage: MemoryUsage,
        data: &[T],
    ) -> RalResult<BufferHandle> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let usage = if memory_usage.is_host_visible() {
            usage
        } else {
            usage | BufferUsage::TRANSFER_DST
        };

        let handle = self.create_buffer(&BufferDescription::new(bytes.len() as u64, usage, memory_usage))?;
        if handle.is_sentinel() {
            return Ok(handle);
        }

        if let Err(err) = self.upload_buffer(handle, 0, bytes) {
            if err.is_fatal() {
                return Err(err);
            }
            log::error!("Initial upload into {handle:?} failed: {err}");
            self.destroy_buffer(handle);
            return Ok(BufferHandle::INVALID);
        }
        Ok(handle)
    }
}

impl<D: Device + ?Sized> DeviceExt for D {}

/// Turn a creation result into the handle contract of [`Device`]
///
/// Fatal errors propagate; everything else is logged and becomes the
/// invalid handle.
pub fn creation_outcome<K: ResourceKind>(result: RalResult<Handle<K>>) -> RalResult<Handle<K>> {
    match result {
        Ok(handle) => Ok(handle),
        Err(err) if err.is_fatal() => {
            log::error!("Fatal error creating {}: {err}", K::NAME);
            Err(err)
        }
        Err(err) => {
            log::error!("Failed to create {}: {err}", K::NAME);
            Ok(Handle::INVALID)
        }
    }
}

/// Copy `data` into a GPU-only buffer through a transient staging buffer
///
/// Blocks until the copy has executed. The staging buffer is released
/// through the normal deferred path.
pub fn staged_upload<D: Device + ?Sized>(
    device: &mut D,
    handle: BufferHandle,
    offset: u64,
    data: &[u8],
) -> RalResult<()> {
    if data.is_empty() {
        return Ok(());
    }

    let size = data.len() as u64;
    let staging = device.create_buffer(&BufferDescription::new(
        size,
        BufferUsage::TRANSFER_SRC,
        MemoryUsage::CpuOnly,
    ))?;
    if staging.is_sentinel() {
        return Err(RalError::ResourceCreation(format!(
            "staging buffer of {size} bytes could not be created"
        )));
    }

    let result = (|| {
        let mapped = device.map_buffer(staging)?;
        // SAFETY: the staging buffer is host visible, mapped and at least `size` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.as_ptr(), data.len());
        }
        device.unmap_buffer(staging)?;

        device.immediate_submit(&mut |cmd: &mut dyn CommandBuffer| {
            cmd.copy_buffer(
                staging,
                handle,
                &BufferCopy {
                    src_offset: 0,
                    dst_offset: offset,
                    size,
                },
            )
        })
    })();

    device.destroy_buffer(staging);
    result
}

/// Instantiate the backend named by `config`
///
/// The Vulkan backend presents to `window` and fails without one; the
/// headless backend ignores it.
pub fn create_device(config: &RalConfig, window: Option<&mut Window>) -> RalResult<Box<dyn Device>> {
    config.validate()?;

    log::info!(
        "Creating {:?} device for '{}' ({} frames in flight)",
        config.graphics_api,
        config.application_name,
        config.device.frames_in_flight
    );

    match config.graphics_api {
        GraphicsApi::Vulkan => {
            let window = window.ok_or_else(|| {
                RalError::Initialization("the Vulkan backend needs a window to present to".to_string())
            })?;
            Ok(Box::new(VulkanDevice::new(config, window)?))
        }
        GraphicsApi::Headless => Ok(Box::new(HeadlessDevice::new(config))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_headless_device() {
        let config = RalConfig::new("factory").with_graphics_api(GraphicsApi::Headless).with_frames_in_flight(3);
        let device = create_device(&config, None).unwrap();
        assert_eq!(device.graphics_api(), GraphicsApi::Headless);
        assert_eq!(device.frames_in_flight(), 3);
    }

    #[test]
    fn test_factory_rejects_invalid_config() {
        let config = RalConfig::new("factory").with_graphics_api(GraphicsApi::Headless).with_frames_in_flight(0);
        assert!(matches!(create_device(&config, None), Err(RalError::Config(_))));
    }

    #[test]
    fn test_vulkan_without_window_fails() {
        let config = RalConfig::new("factory");
        let err = create_device(&config, None).err().unwrap();
        assert!(matches!(err, RalError::Initialization(_)));
    }

    #[test]
    fn test_creation_outcome_classification() {
        let soft: RalResult<BufferHandle> = Err(RalError::ResourceCreation("nope".to_string()));
        assert_eq!(creation_outcome(soft).unwrap(), BufferHandle::INVALID);

        let fatal: RalResult<BufferHandle> =
            Err(RalError::device("vkAllocateMemory", ash::vk::Result::ERROR_DEVICE_LOST));
        assert!(creation_outcome(fatal).is_err());
    }
}
