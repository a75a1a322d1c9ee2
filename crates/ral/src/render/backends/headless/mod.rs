//! # Headless Backend
//!
//! A device without a GPU. Resources live in host memory, the queue is a
//! serial counter and fences signal only when the CPU waits on them, so a
//! test can observe exactly when the frame protocol blocks and when native
//! objects are freed relative to the work that used them.
//!
//! Fault injection (`inject_*`) reproduces the swapchain and device-loss
//! paths of a real backend.

mod command_buffer;
mod state;

pub use command_buffer::HeadlessCommandBuffer;
pub use state::{
    DeletionRecord, HeadlessBuffer, HeadlessDescriptorSet, HeadlessDescriptorSetLayout,
    HeadlessPipeline, HeadlessResources, HeadlessSampler, HeadlessShader, HeadlessStats,
    HeadlessTexture, NativeId,
};

use std::cell::{Ref, RefCell};
use std::ptr::NonNull;
use std::rc::Rc;

use ash::vk;

use crate::core::config::{GraphicsApi, RalConfig};
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
use crate::render::api::resources_database::ResourcesDatabase;
use crate::render::api::types::{Extent2D, Format, PipelineBindPoint, ShaderStages};
use crate::render::error::{RalError, RalResult};

use state::HeadlessShared;

/// Largest single allocation the simulated allocator accepts
pub const MAX_ALLOCATION_SIZE: u64 = 256 * 1024 * 1024;

#[derive(Debug, Default)]
struct Faults {
    out_of_date_on_acquire: bool,
    out_of_date_on_present: bool,
    suboptimal_on_present: bool,
    device_lost: bool,
}

#[derive(Debug)]
struct SimulatedSwapchain {
    extent: Extent2D,
    format: Format,
    image_count: u32,
    next_image: u32,
}

impl SimulatedSwapchain {
    fn acquire(&mut self, faults: &mut Faults) -> RalResult<u32> {
        if std::mem::take(&mut faults.out_of_date_on_acquire) {
            return Err(RalError::SwapchainOutOfDate);
        }
        let image = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(image)
    }

    /// `Ok(true)` when the presentation was suboptimal
    fn present(&mut self, faults: &mut Faults) -> RalResult<bool> {
        if std::mem::take(&mut faults.out_of_date_on_present) {
            return Err(RalError::SwapchainOutOfDate);
        }
        Ok(std::mem::take(&mut faults.suboptimal_on_present))
    }
}

/// GPU-less [`Device`]
pub struct HeadlessDevice {
    shared: Rc<RefCell<HeadlessShared>>,
    frames: FrameRing,
    /// Submission serial each slot's fence signals, 0 before first use
    fences: Vec<u64>,
    swapchain: SimulatedSwapchain,
    pending_extent: Option<Extent2D>,
    faults: Faults,
}

impl HeadlessDevice {
    /// Create a headless device shaped by `config`
    pub fn new(config: &RalConfig) -> Self {
        let frames_in_flight = config.device.frames_in_flight.max(1);
        let format = if config.swapchain.prefer_srgb {
            Format::Bgra8Srgb
        } else {
            Format::Bgra8Unorm
        };

        log::debug!(
            "Headless device: {}x{} {:?}, {} frames in flight",
            config.swapchain.width,
            config.swapchain.height,
            format,
            frames_in_flight
        );

        Self {
            shared: HeadlessShared::new(),
            frames: FrameRing::new(frames_in_flight),
            fences: vec![0; frames_in_flight],
            swapchain: SimulatedSwapchain {
                extent: Extent2D::new(config.swapchain.width, config.swapchain.height),
                format,
                image_count: frames_in_flight as u32 + 1,
                next_image: 0,
            },
            pending_extent: None,
            faults: Faults::default(),
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> HeadlessStats {
        self.shared.borrow().stats.clone()
    }

    /// Low-level resource lookup
    pub fn resources(&self) -> Ref<'_, ResourcesDatabase<HeadlessResources>> {
        Ref::map(self.shared.borrow(), |shared| &shared.resources)
    }

    /// Deletions waiting in frame slot `index`
    pub fn pending_deletions(&self, index: usize) -> usize {
        self.frames.pending_deletions(index)
    }

    /// Let the simulated GPU finish everything submitted so far
    ///
    /// Fences become signaled; `begin_frame` still performs its wait.
    pub fn let_gpu_catch_up(&mut self) {
        self.shared.borrow_mut().timeline.catch_up();
    }

    /// Contents of a buffer
    pub fn read_buffer(&self, handle: BufferHandle) -> RalResult<Vec<u8>> {
        let shared = self.shared.borrow();
        let buffer = shared.resources.get_buffer(handle)?;
        let bytes = buffer.memory.borrow().clone();
        Ok(bytes)
    }

    /// Base-mip contents of a texture
    pub fn read_texture(&self, handle: TextureHandle) -> RalResult<Vec<u8>> {
        let shared = self.shared.borrow();
        let texture = shared.resources.get_texture(handle)?;
        let bytes = texture.memory.borrow().clone();
        Ok(bytes)
    }

    /// Make the next acquire report an out-of-date swapchain
    pub fn inject_out_of_date(&mut self) {
        self.faults.out_of_date_on_acquire = true;
    }

    /// Make the next present report an out-of-date swapchain
    pub fn inject_out_of_date_present(&mut self) {
        self.faults.out_of_date_on_present = true;
    }

    /// Make the next present report a suboptimal swapchain
    pub fn inject_suboptimal_present(&mut self) {
        self.faults.suboptimal_on_present = true;
    }

    /// Make every following submission fail with a lost device
    pub fn inject_device_lost(&mut self) {
        self.faults.device_lost = true;
    }

    fn defer_free(&mut self, kind: &'static str, id: NativeId) {
        let shared = Rc::clone(&self.shared);
        self.frames.defer(kind, move || shared.borrow_mut().free_native(kind, id));
    }

    fn allocate(&self, size: u64) -> RalResult<state::Memory> {
        if size > MAX_ALLOCATION_SIZE {
            return Err(RalError::ResourceCreation(format!(
                "allocation of {size} bytes exceeds the {MAX_ALLOCATION_SIZE} byte heap"
            )));
        }
        Ok(Rc::new(RefCell::new(vec![0; size as usize])))
    }

    fn try_create_buffer(&mut self, description: &BufferDescription) -> RalResult<BufferHandle> {
        description.validate()?;
        let memory = self.allocate(description.size)?;

        let mut shared = self.shared.borrow_mut();
        let id = shared.allocate_native();
        Ok(shared.resources.buffers().create(HeadlessBuffer {
            id,
            description: description.clone(),
            memory,
            mapped: false,
        }))
    }

    fn try_create_texture(&mut self, description: &TextureDescription) -> RalResult<TextureHandle> {
        description.validate()?;
        let size = description.base_mip_bytes().ok_or_else(|| {
            RalError::ResourceCreation(format!(
                "texture {}x{}x{} is too large to address",
                description.width, description.height, description.depth
            ))
        })?;
        let memory = self.allocate(size)?;

        let mut shared = self.shared.borrow_mut();
        let id = shared.allocate_native();
        Ok(shared.resources.textures().create(HeadlessTexture {
            id,
            description: description.clone(),
            memory,
        }))
    }

    fn try_create_shader(&mut self, description: &ShaderDescription) -> RalResult<ShaderHandle> {
        description.validate()?;
        let mut shared = self.shared.borrow_mut();
        let id = shared.allocate_native();
        Ok(shared.resources.shaders().create(HeadlessShader {
            id,
            stage: description.stage,
        }))
    }

    fn try_create_pipeline(&mut self, description: &PipelineDescription) -> RalResult<PipelineHandle> {
        description.validate()?;
        let mut shared = self.shared.borrow_mut();

        let mut stages = ShaderStages::empty();
        for &shader in &description.shaders {
            stages |= shared.resources.get_shader(shader)?.stage;
        }
        let bind_point = if stages.contains(ShaderStages::COMPUTE) {
            if description.shaders.len() != 1 {
                return Err(RalError::ResourceCreation(
                    "a compute pipeline takes exactly one shader".to_string(),
                ));
            }
            PipelineBindPoint::Compute
        } else {
            if !stages.contains(ShaderStages::VERTEX) {
                return Err(RalError::ResourceCreation(
                    "graphics pipeline has no vertex shader".to_string(),
                ));
            }
            PipelineBindPoint::Graphics
        };

        for &layout in &description.descriptor_set_layouts {
            shared.resources.get_descriptor_set_layout(layout)?;
        }

        let push_constant_stages = description
            .push_constant_ranges
            .iter()
            .fold(ShaderStages::empty(), |acc, range| acc | range.stages);
        let push_constant_end = description
            .push_constant_ranges
            .iter()
            .map(|range| range.offset + range.size)
            .max()
            .unwrap_or(0);

        let id = shared.allocate_native();
        Ok(shared.resources.pipelines().create(HeadlessPipeline {
            id,
            bind_point,
            set_layouts: description.descriptor_set_layouts.clone(),
            push_constant_stages,
            push_constant_end,
            depth_attachment: description.depth_format.is_some(),
            color_attachments: description.color_formats.len(),
        }))
    }

    fn try_create_descriptor_set_layout(
        &mut self,
        description: &DescriptorSetLayoutDescription,
    ) -> RalResult<DescriptorSetLayoutHandle> {
        description.validate()?;
        let mut shared = self.shared.borrow_mut();
        let id = shared.allocate_native();
        Ok(shared.resources.descriptor_set_layouts().create(HeadlessDescriptorSetLayout {
            id,
            description: description.clone(),
        }))
    }

    fn try_create_descriptor_set(&mut self, description: &DescriptorSetDescription) -> RalResult<DescriptorSetHandle> {
        let mut shared = self.shared.borrow_mut();
        let layout = shared.resources.get_descriptor_set_layout(description.layout)?;
        shared
            .resources
            .validate_descriptor_writes(&layout.description.bindings, &description.writes)
            .map_err(|err| RalError::ResourceCreation(err.to_string()))?;

        let id = shared.allocate_native();
        Ok(shared.resources.descriptor_sets().create(HeadlessDescriptorSet {
            id,
            layout: description.layout,
            writes: description.writes.clone(),
        }))
    }

    fn try_create_sampler(&mut self, description: &SamplerDescription) -> RalResult<SamplerHandle> {
        if description.min_lod > description.max_lod {
            return Err(RalError::ResourceCreation(format!(
                "sampler lod range {}..{} is inverted",
                description.min_lod, description.max_lod
            )));
        }
        if description.max_anisotropy.is_some_and(|a| a < 1.0) {
            return Err(RalError::ResourceCreation("max anisotropy must be at least 1".to_string()));
        }

        let mut shared = self.shared.borrow_mut();
        let id = shared.allocate_native();
        Ok(shared.resources.samplers().create(HeadlessSampler {
            id,
            description: *description,
        }))
    }

    fn rebuild_swapchain(&mut self) {
        self.swapchain.next_image = 0;
        self.shared.borrow_mut().stats.swapchain_recreations += 1;
        log::debug!(
            "Headless swapchain recreated at {}x{}",
            self.swapchain.extent.width,
            self.swapchain.extent.height
        );
    }

    fn skip_frame(&mut self, reason: &str) {
        log::warn!("Skipping frame: {reason}");
        self.shared.borrow_mut().stats.skipped_frames += 1;
    }
}

impl Device for HeadlessDevice {
    fn graphics_api(&self) -> GraphicsApi {
        GraphicsApi::Headless
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
        let mut shared = self.shared.borrow_mut();
        let layout = shared.resources.get_descriptor_set(set)?.layout;
        let bindings = shared.resources.get_descriptor_set_layout(layout)?.description.bindings.clone();
        shared.resources.validate_descriptor_writes(&bindings, writes)?;

        let native = shared.resources.get_descriptor_set_mut(set)?;
        for write in writes {
            native.writes.retain(|existing| existing.binding != write.binding);
            native.writes.push(*write);
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        let destroyed = self.shared.borrow_mut().resources.buffers().destroy(handle);
        if let Some(buffer) = destroyed {
            self.defer_free("buffer", buffer.id);
        }
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        let destroyed = self.shared.borrow_mut().resources.textures().destroy(handle);
        if let Some(texture) = destroyed {
            self.defer_free("texture", texture.id);
        }
    }

    fn destroy_shader(&mut self, handle: ShaderHandle) {
        let destroyed = self.shared.borrow_mut().resources.shaders().destroy(handle);
        if let Some(shader) = destroyed {
            self.defer_free("shader", shader.id);
        }
    }

    fn destroy_pipeline(&mut self, handle: PipelineHandle) {
        let destroyed = self.shared.borrow_mut().resources.pipelines().destroy(handle);
        if let Some(pipeline) = destroyed {
            self.defer_free("pipeline", pipeline.id);
        }
    }

    fn destroy_descriptor_set_layout(&mut self, handle: DescriptorSetLayoutHandle) {
        let destroyed = self.shared.borrow_mut().resources.descriptor_set_layouts().destroy(handle);
        if let Some(layout) = destroyed {
            self.defer_free("descriptor set layout", layout.id);
        }
    }

    fn destroy_descriptor_set(&mut self, handle: DescriptorSetHandle) {
        let destroyed = self.shared.borrow_mut().resources.descriptor_sets().destroy(handle);
        if let Some(set) = destroyed {
            self.defer_free("descriptor set", set.id);
        }
    }

    fn destroy_sampler(&mut self, handle: SamplerHandle) {
        let destroyed = self.shared.borrow_mut().resources.samplers().destroy(handle);
        if let Some(sampler) = destroyed {
            self.defer_free("sampler", sampler.id);
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
        let mut shared = self.shared.borrow_mut();
        let buffer = shared.resources.get_buffer_mut(handle)?;
        if !buffer.description.memory_usage.is_host_visible() {
            return Err(RalError::invalid_operation(format!(
                "{handle:?} lives in GPU-only memory and cannot be mapped"
            )));
        }
        buffer.mapped = true;
        let ptr = buffer.memory.borrow_mut().as_mut_ptr();
        NonNull::new(ptr).ok_or_else(|| RalError::invalid_operation("mapped pointer is null"))
    }

    fn unmap_buffer(&mut self, handle: BufferHandle) -> RalResult<()> {
        let mut shared = self.shared.borrow_mut();
        let buffer = shared.resources.get_buffer_mut(handle)?;
        if !buffer.description.memory_usage.is_host_visible() {
            return Err(RalError::invalid_operation(format!(
                "{handle:?} lives in GPU-only memory and was never mapped"
            )));
        }
        buffer.mapped = false;
        Ok(())
    }

    fn upload_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]) -> RalResult<()> {
        let (description, memory) = {
            let shared = self.shared.borrow();
            let buffer = shared.resources.get_buffer(handle)?;
            (buffer.description.clone(), Rc::clone(&buffer.memory))
        };

        let end = range_end(offset, data.len() as u64, description.size).ok_or_else(|| {
            RalError::invalid_operation(format!(
                "upload of {} bytes at {offset} overruns {handle:?} ({} bytes)",
                data.len(),
                description.size
            ))
        })?;

        if description.memory_usage.is_host_visible() {
            memory.borrow_mut()[offset as usize..end as usize].copy_from_slice(data);
            Ok(())
        } else {
            staged_upload(self, handle, offset, data)
        }
    }

    fn begin_frame(&mut self) -> RalResult<Option<Box<dyn CommandBuffer>>> {
        if let Some(extent) = self.pending_extent.take() {
            self.wait_idle()?;
            self.swapchain.extent = extent;
            self.rebuild_swapchain();
        }

        if self.swapchain.extent.width == 0 || self.swapchain.extent.height == 0 {
            self.skip_frame("surface has zero extent");
            return Ok(None);
        }

        let shared = Rc::clone(&self.shared);
        let fences = &self.fences;
        let index = self.frames.begin_frame(|slot| {
            let mut shared = shared.borrow_mut();
            shared.stats.fence_waits += 1;
            if shared.timeline.wait(fences[slot]) {
                shared.stats.blocking_fence_waits += 1;
            }
            Ok(())
        })?;

        let image = match self.swapchain.acquire(&mut self.faults) {
            Ok(image) => image,
            Err(err) if err.is_swapchain_out_of_date() => {
                self.frames.abort_frame();
                self.recreate_swapchain()?;
                self.skip_frame("swapchain out of date at acquire");
                return Ok(None);
            }
            Err(err) => {
                self.frames.abort_frame();
                return Err(err);
            }
        };
        log::trace!("Frame slot {index} acquired image {image}");

        let mut command_buffer = HeadlessCommandBuffer::new(Rc::clone(&self.shared), Some(index));
        command_buffer.begin()?;
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
                self.frames.abort_frame();
                return Err(err);
            }
        }
        let commands = self.shared.borrow_mut().recorded.take().unwrap_or_default();

        if self.faults.device_lost {
            return Err(RalError::device("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST));
        }

        {
            let mut shared = self.shared.borrow_mut();
            let serial = shared.timeline.submit();
            shared.execute(serial, commands);
            shared.stats.submissions += 1;
            self.fences[index] = serial;
        }
        self.frames.mark_submitted()?;

        let presented = self.swapchain.present(&mut self.faults);
        self.shared.borrow_mut().stats.presents += 1;
        self.frames.mark_presented();
        self.frames.advance();

        let stale = match presented {
            Ok(suboptimal) => suboptimal,
            Err(err) if err.is_swapchain_out_of_date() => true,
            Err(err) => return Err(err),
        };
        if stale {
            log::warn!("Swapchain stale at present, recreating");
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    fn immediate_submit(&mut self, record: RecordFn<'_>) -> RalResult<()> {
        let mut command_buffer = HeadlessCommandBuffer::new(Rc::clone(&self.shared), None);
        command_buffer.begin()?;
        record(&mut command_buffer)?;
        if command_buffer.is_recording() {
            command_buffer.end()?;
        }
        let commands = self.shared.borrow_mut().recorded.take().unwrap_or_default();

        if self.faults.device_lost {
            return Err(RalError::device("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST));
        }

        let mut shared = self.shared.borrow_mut();
        let serial = shared.timeline.submit();
        shared.execute(serial, commands);
        shared.timeline.wait(serial);
        shared.stats.immediate_submissions += 1;
        Ok(())
    }

    fn wait_idle(&mut self) -> RalResult<()> {
        if self.faults.device_lost {
            return Err(RalError::device("vkDeviceWaitIdle", vk::Result::ERROR_DEVICE_LOST));
        }
        self.shared.borrow_mut().timeline.catch_up();
        Ok(())
    }

    fn recreate_swapchain(&mut self) -> RalResult<()> {
        if self.frames.is_recording() {
            return Err(RalError::invalid_operation("recreate_swapchain while a frame is recording"));
        }
        self.wait_idle()?;
        self.rebuild_swapchain();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.pending_extent = Some(Extent2D::new(width, height));
    }

    fn swapchain_extent(&self) -> Extent2D {
        self.swapchain.extent
    }

    fn swapchain_format(&self) -> Format {
        self.swapchain.format
    }

    fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    fn current_frame_index(&self) -> usize {
        self.frames.current_index()
    }
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        self.shared.borrow_mut().timeline.catch_up();
        self.frames.flush_all();

        let mut shared = self.shared.borrow_mut();
        let mut leaked = Vec::new();
        leaked.extend(shared.resources.buffers().drain().into_iter().map(|r| ("buffer", r.id)));
        leaked.extend(shared.resources.textures().drain().into_iter().map(|r| ("texture", r.id)));
        leaked.extend(shared.resources.pipelines().drain().into_iter().map(|r| ("pipeline", r.id)));
        leaked.extend(shared.resources.shaders().drain().into_iter().map(|r| ("shader", r.id)));
        leaked.extend(shared.resources.descriptor_sets().drain().into_iter().map(|r| ("descriptor set", r.id)));
        leaked.extend(
            shared
                .resources
                .descriptor_set_layouts()
                .drain()
                .into_iter()
                .map(|r| ("descriptor set layout", r.id)),
        );
        leaked.extend(shared.resources.samplers().drain().into_iter().map(|r| ("sampler", r.id)));

        if !leaked.is_empty() {
            log::debug!("Destroying {} resource(s) still alive at teardown", leaked.len());
        }
        for (kind, id) in leaked {
            shared.free_native(kind, id);
        }
        if shared.live_natives() != 0 {
            log::error!("{} native object(s) outlived the headless device", shared.live_natives());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::descriptions::RenderPassDescription;
    use crate::render::api::types::{BufferUsage, MemoryUsage};

    fn device(frames: usize) -> HeadlessDevice {
        HeadlessDevice::new(
            &RalConfig::new("headless test")
                .with_graphics_api(GraphicsApi::Headless)
                .with_frames_in_flight(frames),
        )
    }

    fn empty_frame(device: &mut HeadlessDevice) {
        let mut cmd = device.begin_frame().unwrap().unwrap();
        cmd.begin_render_pass(&RenderPassDescription::swapchain([0.0; 4])).unwrap();
        cmd.end_render_pass().unwrap();
        device.end_frame(cmd).unwrap();
    }

    #[test]
    fn test_host_visible_upload_and_map() {
        let mut device = device(2);
        let buffer = device
            .create_buffer(&BufferDescription::new(8, BufferUsage::UNIFORM_BUFFER, MemoryUsage::CpuToGpu))
            .unwrap();
        device.upload_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.read_buffer(buffer).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);

        let ptr = device.map_buffer(buffer).unwrap();
        unsafe { *ptr.as_ptr() = 9 };
        device.unmap_buffer(buffer).unwrap();
        assert_eq!(device.read_buffer(buffer).unwrap()[0], 9);
    }

    #[test]
    fn test_gpu_only_upload_is_staged() {
        let mut device = device(2);
        let buffer = device
            .create_buffer(&BufferDescription::new(
                4,
                BufferUsage::VERTEX_BUFFER | BufferUsage::TRANSFER_DST,
                MemoryUsage::GpuOnly,
            ))
            .unwrap();
        assert!(device.map_buffer(buffer).is_err());

        device.upload_buffer(buffer, 0, &[5, 6, 7, 8]).unwrap();
        assert_eq!(device.read_buffer(buffer).unwrap(), vec![5, 6, 7, 8]);
        assert_eq!(device.stats().immediate_submissions, 1);
    }

    #[test]
    fn test_upload_overrun_rejected() {
        let mut device = device(2);
        let buffer = device
            .create_buffer(&BufferDescription::new(4, BufferUsage::UNIFORM_BUFFER, MemoryUsage::CpuToGpu))
            .unwrap();
        assert!(matches!(
            device.upload_buffer(buffer, 2, &[0; 4]),
            Err(RalError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_oversized_allocation_gives_invalid_handle() {
        let mut device = device(2);
        let handle = device
            .create_buffer(&BufferDescription::new(
                MAX_ALLOCATION_SIZE + 1,
                BufferUsage::STORAGE_BUFFER,
                MemoryUsage::GpuOnly,
            ))
            .unwrap();
        assert!(handle.is_sentinel());
        assert!(!device.is_valid_buffer(handle));
    }

    #[test]
    fn test_resize_applies_at_next_frame() {
        let mut device = device(2);
        device.resize(800, 600);
        assert_eq!(device.swapchain_extent(), Extent2D::new(1280, 720));
        empty_frame(&mut device);
        assert_eq!(device.swapchain_extent(), Extent2D::new(800, 600));
        assert_eq!(device.stats().swapchain_recreations, 1);
    }

    #[test]
    fn test_minimized_window_skips_frames() {
        let mut device = device(2);
        device.resize(0, 0);
        assert!(device.begin_frame().unwrap().is_none());
        assert!(device.begin_frame().unwrap().is_none());
        assert_eq!(device.stats().skipped_frames, 2);

        device.resize(640, 480);
        assert!(device.begin_frame().unwrap().is_some());
    }

    #[test]
    fn test_end_frame_rejects_foreign_command_buffer() {
        let mut device = device(2);
        let cmd = device.begin_frame().unwrap().unwrap();
        let foreign = Box::new(HeadlessCommandBuffer::new(Rc::clone(&device.shared), None));
        assert!(device.end_frame(foreign).is_err());
        device.end_frame(cmd).unwrap();
    }

    #[test]
    fn test_teardown_frees_everything() {
        let shared;
        {
            let mut device = device(2);
            shared = Rc::clone(&device.shared);
            device
                .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX_BUFFER, MemoryUsage::CpuToGpu))
                .unwrap();
            let doomed = device
                .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX_BUFFER, MemoryUsage::CpuToGpu))
                .unwrap();
            device.destroy_buffer(doomed);
        }
        let shared = shared.borrow();
        assert_eq!(shared.live_natives(), 0);
        assert_eq!(shared.stats.deletions.len(), 2);
        assert_eq!(shared.stats.premature_deletions, 0);
    }
}
