//! Vulkan implementation of [`Device`]
//!
//! Owns the whole native stack. Field order is drop order: everything that
//! was created from the logical device is declared before it, and the
//! surface before the instance.

use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

use ash::vk;

use crate::core::config::{GraphicsApi, RalConfig, SwapchainConfig};
use crate::render::api::command_buffer::CommandBuffer;
use crate::render::api::descriptions::{
    range_end, BufferDescription, DescriptorSetDescription, DescriptorSetLayoutDescription,
    DescriptorWrite, PipelineDescription, SamplerDescription, ShaderDescription, TextureDescription,
};
use crate::render::api::device::{creation_outcome, staged_upload, Device, RecordFn};
use crate::render::api::frame::FrameRing;
use crate::render::api::handle::{
    BufferHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, PipelineHandle, SamplerHandle,
    ShaderHandle, TextureHandle,
};
use crate::render::api::types::{Extent2D, Format};
use crate::render::error::{swapchain_status, RalError, RalResult, VkResultExt};
use crate::render::window::Window;

use super::conversions::{extent_from_vk, format_from_vk};
use super::initialization::{LogicalDevice, PhysicalDeviceInfo, Surface, VulkanInstance};
use super::rendering::{VulkanCommandBuffer, VulkanPipeline, VulkanShader};
use super::resources::{
    create_allocator, write_descriptor_set, DescriptorAllocator, NativeResource, VulkanBuffer,
    VulkanDescriptorSet, VulkanDescriptorSetLayout, VulkanSampler, VulkanTexture,
};
use super::state::swapchain::choose_extent;
use super::state::{FrameData, Swapchain, SwapchainTarget, UploadContext, VulkanShared};

/// Vulkan [`Device`] presenting to a GLFW window
pub struct VulkanDevice {
    shared: Rc<RefCell<VulkanShared>>,
    frames: FrameRing,
    frame_data: Vec<FrameData>,
    upload: UploadContext,
    descriptor_allocator: DescriptorAllocator,
    swapchain: Swapchain,
    allocator: Rc<vk_mem::Allocator>,
    logical: LogicalDevice,
    physical: PhysicalDeviceInfo,
    surface: Surface,
    instance: VulkanInstance,

    swapchain_config: SwapchainConfig,
    requested_extent: vk::Extent2D,
    /// Image acquired for the frame being recorded
    image_index: Option<u32>,
    needs_recreate: bool,
    /// The surface has zero extent; frames are skipped until it grows
    suspended: bool,
    max_anisotropy: Option<f32>,
}

impl VulkanDevice {
    /// Bring up instance, device, swapchain and frame ring for `window`
    pub fn new(config: &RalConfig, window: &mut Window) -> RalResult<Self> {
        let window_extensions = window.required_instance_extensions()?;
        let instance = VulkanInstance::new(
            &config.application_name,
            &window_extensions,
            config.device.validation_enabled(),
        )?;
        let surface = Surface::new(&instance, window)?;
        let physical = PhysicalDeviceInfo::select(&instance.instance, &surface)?;
        let logical = LogicalDevice::new(&instance.instance, &physical)?;
        let device = logical.device.clone();
        let allocator = Rc::new(create_allocator(&instance.instance, &device, physical.device)?);

        let framebuffer = window.framebuffer_extent();
        let requested_extent = if framebuffer.width == 0 || framebuffer.height == 0 {
            vk::Extent2D {
                width: config.swapchain.width,
                height: config.swapchain.height,
            }
        } else {
            vk::Extent2D {
                width: framebuffer.width,
                height: framebuffer.height,
            }
        };
        let extent = choose_extent(&surface.capabilities(physical.device)?, requested_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(RalError::Initialization("surface has zero extent".to_string()));
        }

        let swapchain = Swapchain::new(
            device.clone(),
            logical.swapchain_loader.clone(),
            &surface,
            &physical,
            extent,
            &config.swapchain,
            vk::SwapchainKHR::null(),
        )?;

        let frames_in_flight = config.device.frames_in_flight.max(1);
        let frame_data = (0..frames_in_flight)
            .map(|_| FrameData::new(&device, physical.graphics_family))
            .collect::<RalResult<Vec<_>>>()?;
        let upload = UploadContext::new(&device, physical.graphics_family)?;

        let max_anisotropy = (physical.features.sampler_anisotropy == vk::TRUE)
            .then_some(physical.properties.limits.max_sampler_anisotropy);

        log::info!(
            "Vulkan device ready on {}: {}x{} {:?}, {} swapchain images, {} frames in flight",
            physical.name(),
            extent.width,
            extent.height,
            swapchain.format(),
            swapchain.image_count(),
            frames_in_flight
        );

        Ok(Self {
            shared: VulkanShared::new(device.clone()),
            frames: FrameRing::new(frames_in_flight),
            frame_data,
            upload,
            descriptor_allocator: DescriptorAllocator::new(device),
            swapchain,
            allocator,
            logical,
            physical,
            surface,
            instance,
            swapchain_config: config.swapchain.clone(),
            requested_extent,
            image_index: None,
            needs_recreate: false,
            suspended: false,
            max_anisotropy,
        })
    }

    /// Whether validation layers are active
    pub fn validation_enabled(&self) -> bool {
        self.instance.validation_enabled()
    }

    /// Deletions waiting in frame slot `index`
    pub fn pending_deletions(&self, index: usize) -> usize {
        self.frames.pending_deletions(index)
    }

    fn defer_destroy<T: NativeResource + 'static>(&mut self, native: T) {
        let device = self.logical.device.clone();
        let allocator = Rc::clone(&self.allocator);
        // SAFETY: runs once the frame that may have used the resource has retired
        self.frames.defer(T::LABEL, move || unsafe { native.destroy(&device, &allocator) });
    }

    fn defer_framebuffers(&mut self, framebuffers: Vec<vk::Framebuffer>) {
        if framebuffers.is_empty() {
            return;
        }
        let device = self.logical.device.clone();
        self.frames.defer("framebuffer", move || unsafe {
            for framebuffer in framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
        });
    }

    fn destroy_framebuffers_now(&self, framebuffers: Vec<vk::Framebuffer>) {
        unsafe {
            for framebuffer in framebuffers {
                self.logical.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }

    /// Rebuild the swapchain for the current surface extent
    ///
    /// A zero extent (minimized window) keeps the old swapchain and suspends
    /// presentation instead.
    fn rebuild_swapchain(&mut self) -> RalResult<()> {
        self.wait_idle()?;
        self.frames.flush_all();

        let capabilities = self.surface.capabilities(self.physical.device)?;
        let extent = choose_extent(&capabilities, self.requested_extent);
        if extent.width == 0 || extent.height == 0 {
            if !self.suspended {
                log::info!("Surface has zero extent, suspending presentation");
            }
            self.suspended = true;
            return Ok(());
        }

        let swapchain = Swapchain::new(
            self.logical.device.clone(),
            self.logical.swapchain_loader.clone(),
            &self.surface,
            &self.physical,
            extent,
            &self.swapchain_config,
            self.swapchain.handle(),
        )?;
        self.swapchain = swapchain;
        self.suspended = false;
        self.needs_recreate = false;

        log::info!("Swapchain recreated at {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Give up on the frame being recorded
    fn abort_frame(&mut self) {
        self.frames.abort_frame();
        self.image_index = None;
        let framebuffers = {
            let mut shared = self.shared.borrow_mut();
            shared.swapchain_target = None;
            std::mem::take(&mut shared.transient_framebuffers)
        };
        // still recording, so these land in the aborted slot and go at its next begin
        self.defer_framebuffers(framebuffers);
    }

    fn try_create_buffer(&mut self, description: &BufferDescription) -> RalResult<BufferHandle> {
        let buffer = VulkanBuffer::new(&self.allocator, description)?;
        Ok(self.shared.borrow_mut().resources.buffers().create(buffer))
    }

    fn try_create_texture(&mut self, description: &TextureDescription) -> RalResult<TextureHandle> {
        let texture = VulkanTexture::new(&self.logical.device, &self.allocator, description)?;
        Ok(self.shared.borrow_mut().resources.textures().create(texture))
    }

    fn try_create_shader(&mut self, description: &ShaderDescription) -> RalResult<ShaderHandle> {
        let shader = VulkanShader::new(&self.logical.device, description)?;
        Ok(self.shared.borrow_mut().resources.shaders().create(shader))
    }

    fn try_create_pipeline(&mut self, description: &PipelineDescription) -> RalResult<PipelineHandle> {
        let mut shared = self.shared.borrow_mut();
        let shared = &mut *shared;
        let pipeline = VulkanPipeline::new(
            &self.logical.device,
            &shared.resources,
            &mut shared.render_passes,
            description,
        )?;
        Ok(shared.resources.pipelines().create(pipeline))
    }

    fn try_create_descriptor_set_layout(
        &mut self,
        description: &DescriptorSetLayoutDescription,
    ) -> RalResult<DescriptorSetLayoutHandle> {
        let layout = VulkanDescriptorSetLayout::new(&self.logical.device, description)?;
        Ok(self.shared.borrow_mut().resources.descriptor_set_layouts().create(layout))
    }

    fn try_create_descriptor_set(&mut self, description: &DescriptorSetDescription) -> RalResult<DescriptorSetHandle> {
        let mut shared = self.shared.borrow_mut();
        let layout = shared.resources.get_descriptor_set_layout(description.layout)?;
        let native_layout = layout.layout;
        let bindings = layout.description.bindings.clone();
        shared
            .resources
            .validate_descriptor_writes(&bindings, &description.writes)
            .map_err(|err| RalError::ResourceCreation(err.to_string()))?;

        let (set, pool) = self.descriptor_allocator.allocate(native_layout)?;
        let native = VulkanDescriptorSet {
            set,
            pool,
            layout: description.layout,
        };
        if let Err(err) = write_descriptor_set(&self.logical.device, &shared.resources, set, &bindings, &description.writes) {
            // SAFETY: the set was never bound
            unsafe { native.destroy(&self.logical.device, &self.allocator) };
            return Err(err);
        }
        Ok(shared.resources.descriptor_sets().create(native))
    }

    fn try_create_sampler(&mut self, description: &SamplerDescription) -> RalResult<SamplerHandle> {
        let sampler = VulkanSampler::new(&self.logical.device, description, self.max_anisotropy)?;
        Ok(self.shared.borrow_mut().resources.samplers().create(sampler))
    }
}

impl Device for VulkanDevice {
    fn graphics_api(&self) -> GraphicsApi {
        GraphicsApi::Vulkan
    }

    fn create_buffer(&mut self, description: &BufferDescription) -> RalResult<BufferHandle> {
        creation_outcome(self.try_create_buffer(description))
    }

    fn create_texture(&mut self, description: &TextureDescription) -> RalResult<TextureHandle> {
        creation_outcome(self.try_create_texture(description))
    }

    fn create_shader(&mut self, description: &ShaderDescription) -> RalResult<ShaderHandle> {
        creation_outcome(self.try_create_shader(description))
    }

    fn create_pipeline(&mut self, description: &PipelineDescription) -> RalResult<PipelineHandle> {
        creation_outcome(self.try_create_pipeline(description))
    }

    fn create_descriptor_set_layout(
        &mut self,
        description: &DescriptorSetLayoutDescription,
    ) -> RalResult<DescriptorSetLayoutHandle> {
        creation_outcome(self.try_create_descriptor_set_layout(description))
    }

    fn create_descriptor_set(&mut self, description: &DescriptorSetDescription) -> RalResult<DescriptorSetHandle> {
        creation_outcome(self.try_create_descriptor_set(description))
    }

    fn create_sampler(&mut self, description: &SamplerDescription) -> RalResult<SamplerHandle> {
        creation_outcome(self.try_create_sampler(description))
    }

    fn update_descriptor_set(&mut self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) -> RalResult<()> {
        let shared = self.shared.borrow();
        let native = shared.resources.get_descriptor_set(set)?;
        let layout = shared.resources.get_descriptor_set_layout(native.layout)?;
        write_descriptor_set(
            &self.logical.device,
            &shared.resources,
            native.set,
            &layout.description.bindings,
            writes,
        )
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        let destroyed = self.shared.borrow_mut().resources.buffers().destroy(handle);
        if let Some(buffer) = destroyed {
            self.defer_destroy(buffer);
        }
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        let destroyed = self.shared.borrow_mut().resources.textures().destroy(handle);
        if let Some(texture) = destroyed {
            self.defer_destroy(texture);
        }
    }

    fn destroy_shader(&mut self, handle: ShaderHandle) {
        let destroyed = self.shared.borrow_mut().resources.shaders().destroy(handle);
        if let Some(shader) = destroyed {
            self.defer_destroy(shader);
        }
    }

    fn destroy_pipeline(&mut self, handle: PipelineHandle) {
        let destroyed = self.shared.borrow_mut().resources.pipelines().destroy(handle);
        if let Some(pipeline) = destroyed {
            self.defer_destroy(pipeline);
        }
    }

    fn destroy_descriptor_set_layout(&mut self, handle: DescriptorSetLayoutHandle) {
        let destroyed = self.shared.borrow_mut().resources.descriptor_set_layouts().destroy(handle);
        if let Some(layout) = destroyed {
            self.defer_destroy(layout);
        }
    }

    fn destroy_descriptor_set(&mut self, handle: DescriptorSetHandle) {
        let destroyed = self.shared.borrow_mut().resources.descriptor_sets().destroy(handle);
        if let Some(set) = destroyed {
            self.defer_destroy(set);
        }
    }

    fn destroy_sampler(&mut self, handle: SamplerHandle) {
        let destroyed = self.shared.borrow_mut().resources.samplers().destroy(handle);
        if let Some(sampler) = destroyed {
            self.defer_destroy(sampler);
        }
    }

    fn is_valid_buffer(&self, handle: BufferHandle) -> bool {
        self.shared.borrow().resources.is_valid_buffer(handle)
    }

    fn is_valid_texture(&self, handle: TextureHandle) -> bool {
        self.shared.borrow().resources.is_valid_texture(handle)
    }

    fn is_valid_shader(&self, handle: ShaderHandle) -> bool {
        self.shared.borrow().resources.is_valid_shader(handle)
    }

    fn is_valid_pipeline(&self, handle: PipelineHandle) -> bool {
        self.shared.borrow().resources.is_valid_pipeline(handle)
    }

    fn is_valid_descriptor_set_layout(&self, handle: DescriptorSetLayoutHandle) -> bool {
        self.shared.borrow().resources.is_valid_descriptor_set_layout(handle)
    }

    fn is_valid_descriptor_set(&self, handle: DescriptorSetHandle) -> bool {
        self.shared.borrow().resources.is_valid_descriptor_set(handle)
    }

    fn is_valid_sampler(&self, handle: SamplerHandle) -> bool {
        self.shared.borrow().resources.is_valid_sampler(handle)
    }

    fn get_buffer(&self, handle: BufferHandle) -> RalResult<BufferDescription> {
        Ok(self.shared.borrow().resources.get_buffer(handle)?.description.clone())
    }

    fn get_texture(&self, handle: TextureHandle) -> RalResult<TextureDescription> {
        Ok(self.shared.borrow().resources.get_texture(handle)?.description.clone())
    }

    fn map_buffer(&mut self, handle: BufferHandle) -> RalResult<NonNull<u8>> {
        let shared = self.shared.borrow();
        let buffer = shared.resources.get_buffer(handle)?;
        buffer.mapped.ok_or_else(|| {
            RalError::invalid_operation(format!("{handle:?} lives in GPU-only memory and cannot be mapped"))
        })
    }

    fn unmap_buffer(&mut self, handle: BufferHandle) -> RalResult<()> {
        let shared = self.shared.borrow();
        let buffer = shared.resources.get_buffer(handle)?;
        if buffer.mapped.is_none() {
            return Err(RalError::invalid_operation(format!(
                "{handle:?} lives in GPU-only memory and was never mapped"
            )));
        }
        // host-visible buffers stay persistently mapped until destruction
        Ok(())
    }

    fn upload_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]) -> RalResult<()> {
        let host_visible = {
            let shared = self.shared.borrow();
            let buffer = shared.resources.get_buffer(handle)?;
            if range_end(offset, data.len() as u64, buffer.description.size).is_none() {
                return Err(RalError::invalid_operation(format!(
                    "upload of {} bytes at {offset} overruns {handle:?} ({} bytes)",
                    data.len(),
                    buffer.description.size
                )));
            }
            if buffer.mapped.is_some() {
                buffer.write_mapped(offset, data)?;
                true
            } else {
                false
            }
        };

        if host_visible {
            Ok(())
        } else {
            staged_upload(self, handle, offset, data)
        }
    }

    fn begin_frame(&mut self) -> RalResult<Option<Box<dyn CommandBuffer>>> {
        if self.needs_recreate || self.suspended {
            self.rebuild_swapchain()?;
            if self.suspended {
                log::trace!("Skipping frame: surface has zero extent");
                return Ok(None);
            }
        }

        let frame_data = &self.frame_data;
        let index = self.frames.begin_frame(|slot| frame_data[slot].in_flight.wait())?;

        let image_available = self.frame_data[index].image_available.handle();
        let acquired = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };
        let image_index = match swapchain_status("vkAcquireNextImageKHR", acquired) {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Swapchain suboptimal at acquire, recreating after present");
                    self.needs_recreate = true;
                }
                image_index
            }
            Err(err) if err.is_swapchain_out_of_date() => {
                self.abort_frame();
                log::warn!("Swapchain out of date at acquire, recreating");
                self.rebuild_swapchain()?;
                return Ok(None);
            }
            Err(err) => {
                self.abort_frame();
                return Err(err);
            }
        };

        if let Err(err) = self.frame_data[index].command_pool.reset() {
            self.abort_frame();
            return Err(err);
        }
        let command_buffer = self.frame_data[index].command_buffer;

        self.image_index = Some(image_index);
        self.shared.borrow_mut().swapchain_target = Some(SwapchainTarget {
            image: self.swapchain.image(image_index),
            view: self.swapchain.image_view(image_index),
            format: self.swapchain.format(),
            extent: self.swapchain.extent(),
            layout: vk::ImageLayout::UNDEFINED,
        });
        log::trace!("Frame slot {index} acquired image {image_index}");

        let mut command_buffer = VulkanCommandBuffer::new(
            Rc::clone(&self.shared),
            self.logical.device.clone(),
            command_buffer,
            Some(index),
        );
        if let Err(err) = command_buffer.begin() {
            self.abort_frame();
            return Err(err);
        }
        Ok(Some(Box::new(command_buffer)))
    }

    fn end_frame(&mut self, mut command_buffer: Box<dyn CommandBuffer>) -> RalResult<()> {
        let index = self.frames.current_index();
        if !self.frames.is_recording() || command_buffer.frame_index() != Some(index) {
            return Err(RalError::invalid_operation(format!(
                "end_frame with a command buffer for slot {:?} while slot {index} is {:?}",
                command_buffer.frame_index(),
                self.frames.current_state()
            )));
        }

        if command_buffer.is_recording() {
            if let Err(err) = command_buffer.end() {
                self.abort_frame();
                return Err(err);
            }
        }
        drop(command_buffer);

        let image_index = self
            .image_index
            .take()
            .ok_or_else(|| RalError::invalid_operation("end_frame without an acquired image"))?;
        let framebuffers = {
            let mut shared = self.shared.borrow_mut();
            shared.swapchain_target = None;
            std::mem::take(&mut shared.transient_framebuffers)
        };
        self.defer_framebuffers(framebuffers);

        let frame = &self.frame_data[index];
        if let Err(err) = frame.in_flight.reset() {
            self.frames.abort_frame();
            return Err(err);
        }

        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [frame.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        let submitted = unsafe {
            self.logical
                .device
                .queue_submit(self.logical.graphics_queue, &[submit_info], frame.in_flight.handle())
        };
        if let Err(code) = submitted {
            self.frames.abort_frame();
            return Err(RalError::device("vkQueueSubmit", code));
        }
        self.frames.mark_submitted()?;

        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let presented = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.logical.present_queue, &present_info)
        };
        self.frames.mark_presented();
        self.frames.advance();

        match swapchain_status("vkQueuePresentKHR", presented) {
            Ok(false) => {}
            Ok(true) => {
                log::debug!("Swapchain suboptimal at present, recreating");
                self.needs_recreate = true;
            }
            Err(err) if err.is_swapchain_out_of_date() => {
                log::warn!("Swapchain out of date at present, recreating");
                self.needs_recreate = true;
            }
            Err(err) => return Err(err),
        }

        if self.needs_recreate {
            self.rebuild_swapchain()?;
        }
        Ok(())
    }

    fn immediate_submit(&mut self, record: RecordFn<'_>) -> RalResult<()> {
        self.upload.command_pool.reset()?;
        let first_framebuffer = self.shared.borrow().transient_framebuffers.len();

        let mut command_buffer = VulkanCommandBuffer::new(
            Rc::clone(&self.shared),
            self.logical.device.clone(),
            self.upload.command_buffer,
            None,
        );
        command_buffer.begin()?;
        let recorded = record(&mut command_buffer).and_then(|()| {
            if command_buffer.is_recording() {
                command_buffer.end()
            } else {
                Ok(())
            }
        });
        drop(command_buffer);

        // framebuffers of this submission only; a frame may be recording around it
        let framebuffers = self
            .shared
            .borrow_mut()
            .transient_framebuffers
            .split_off(first_framebuffer);
        if let Err(err) = recorded {
            self.destroy_framebuffers_now(framebuffers);
            return Err(err);
        }

        let command_buffers = [self.upload.command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        let result = unsafe {
            self.logical
                .device
                .queue_submit(self.logical.graphics_queue, &[submit_info], self.upload.fence.handle())
        }
        .call("vkQueueSubmit")
        .and_then(|()| self.upload.fence.wait())
        .and_then(|()| self.upload.fence.reset());

        self.destroy_framebuffers_now(framebuffers);
        result
    }

    fn wait_idle(&mut self) -> RalResult<()> {
        unsafe { self.logical.device.device_wait_idle() }.call("vkDeviceWaitIdle")
    }

    fn recreate_swapchain(&mut self) -> RalResult<()> {
        if self.frames.is_recording() {
            return Err(RalError::invalid_operation("recreate_swapchain while a frame is recording"));
        }
        self.rebuild_swapchain()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.requested_extent = vk::Extent2D { width, height };
        self.needs_recreate = true;
    }

    fn swapchain_extent(&self) -> Extent2D {
        extent_from_vk(self.swapchain.extent())
    }

    fn swapchain_format(&self) -> Format {
        format_from_vk(self.swapchain.format())
    }

    fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    fn current_frame_index(&self) -> usize {
        self.frames.current_index()
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        if let Err(code) = unsafe { self.logical.device.device_wait_idle() } {
            log::error!("vkDeviceWaitIdle failed during teardown: {code:?}");
        }
        self.frames.flush_all();

        let device = self.logical.device.clone();
        let allocator: &vk_mem::Allocator = &self.allocator;
        let mut shared = self.shared.borrow_mut();
        let live = shared.resources.live_count();
        if live > 0 {
            log::debug!("Destroying {live} resource(s) still alive at teardown");
        }

        // SAFETY: the device is idle and every deferred deletion has run
        unsafe {
            for set in shared.resources.descriptor_sets().drain() {
                set.destroy(&device, allocator);
            }
            for pipeline in shared.resources.pipelines().drain() {
                pipeline.destroy(&device, allocator);
            }
            for shader in shared.resources.shaders().drain() {
                shader.destroy(&device, allocator);
            }
            for layout in shared.resources.descriptor_set_layouts().drain() {
                layout.destroy(&device, allocator);
            }
            for sampler in shared.resources.samplers().drain() {
                sampler.destroy(&device, allocator);
            }
            for texture in shared.resources.textures().drain() {
                texture.destroy(&device, allocator);
            }
            for buffer in shared.resources.buffers().drain() {
                buffer.destroy(&device, allocator);
            }
            for framebuffer in shared.transient_framebuffers.drain(..) {
                device.destroy_framebuffer(framebuffer, None);
            }
        }
        shared.render_passes.clear();
        shared.swapchain_target = None;
        log::debug!("Vulkan device torn down");
    }
}
