//! Vulkan command buffer
//!
//! Handles are resolved to native objects while recording. Misuse that a
//! validation layer would report is rejected here with `InvalidOperation`
//! before any native command is recorded.

use std::cell::RefCell;
use std::rc::Rc;

use ash::{vk, Device};

use crate::render::api::command_buffer::CommandBuffer;
use crate::render::api::descriptions::{
    range_end, AttachmentTarget, BufferCopy, BufferTextureCopy, PipelineBarrier, RenderPassDescription,
};
use crate::render::api::handle::{BufferHandle, DescriptorSetHandle, PipelineHandle, TextureHandle};
use crate::render::api::types::{
    BufferUsage, ClearValue, IndexType, LoadOp, PipelineBindPoint, Rect2D, ShaderStages, TextureUsage,
    Viewport,
};
use crate::render::backends::vulkan::conversions::{aspect_mask, IntoVk};
use crate::render::backends::vulkan::state::VulkanShared;
use crate::render::error::{RalError, RalResult, VkResultExt};

use super::render_pass::{create_framebuffer, AttachmentKey, RenderPassKey};

struct BoundPipeline {
    handle: PipelineHandle,
    layout: vk::PipelineLayout,
    bind_point: PipelineBindPoint,
    set_count: usize,
    push_constant_stages: ShaderStages,
    push_constant_end: u32,
    color_attachments: usize,
    depth_attachment: bool,
}

#[derive(Clone, Copy)]
struct ActivePass {
    color_attachments: usize,
    depth_attachment: bool,
}

/// Command buffer of the Vulkan backend
///
/// The native buffer belongs to a frame slot's (or the upload context's)
/// command pool, which is reset before the buffer is handed out again.
pub struct VulkanCommandBuffer {
    shared: Rc<RefCell<VulkanShared>>,
    device: Device,
    command_buffer: vk::CommandBuffer,
    frame_index: Option<usize>,
    recording: bool,
    render_pass: Option<ActivePass>,
    pipeline: Option<BoundPipeline>,
    index_buffer_bound: bool,
}

impl VulkanCommandBuffer {
    pub(in crate::render::backends::vulkan) fn new(
        shared: Rc<RefCell<VulkanShared>>,
        device: Device,
        command_buffer: vk::CommandBuffer,
        frame_index: Option<usize>,
    ) -> Self {
        Self {
            shared,
            device,
            command_buffer,
            frame_index,
            recording: false,
            render_pass: None,
            pipeline: None,
            index_buffer_bound: false,
        }
    }

    fn ensure_recording(&self, command: &str) -> RalResult<()> {
        if self.recording {
            Ok(())
        } else {
            Err(RalError::invalid_operation(format!("{command} recorded outside begin/end")))
        }
    }

    fn ensure_outside_pass(&self, command: &str) -> RalResult<()> {
        self.ensure_recording(command)?;
        if self.render_pass.is_some() {
            return Err(RalError::invalid_operation(format!("{command} inside a render pass")));
        }
        Ok(())
    }

    fn ensure_graphics_draw(&self, command: &str) -> RalResult<()> {
        self.ensure_recording(command)?;
        let pass = self
            .render_pass
            .ok_or_else(|| RalError::invalid_operation(format!("{command} outside a render pass")))?;
        match &self.pipeline {
            Some(bound) if bound.bind_point == PipelineBindPoint::Graphics => {
                if bound.color_attachments != pass.color_attachments
                    || bound.depth_attachment != pass.depth_attachment
                {
                    return Err(RalError::invalid_operation(format!(
                        "{command}: pipeline {:?} is incompatible with the active render pass",
                        bound.handle
                    )));
                }
                Ok(())
            }
            Some(bound) => Err(RalError::invalid_operation(format!(
                "{command} with compute pipeline {:?} bound",
                bound.handle
            ))),
            None => Err(RalError::invalid_operation(format!("{command} without a bound pipeline"))),
        }
    }

    fn buffer_with_usage(&self, handle: BufferHandle, usage: BufferUsage, command: &str) -> RalResult<(vk::Buffer, u64)> {
        let shared = self.shared.borrow();
        let buffer = shared.resources.get_buffer(handle)?;
        if !buffer.description.usage.contains(usage) {
            return Err(RalError::invalid_operation(format!(
                "{command}: {handle:?} lacks {usage:?} usage"
            )));
        }
        Ok((buffer.buffer, buffer.description.size))
    }

    /// Move the acquired swapchain image to present layout if the frame left it elsewhere
    fn prepare_swapchain_for_present(&mut self) {
        let mut shared = self.shared.borrow_mut();
        let Some(target) = shared.swapchain_target.as_mut() else {
            return;
        };
        if target.layout == vk::ImageLayout::PRESENT_SRC_KHR {
            return;
        }

        let barrier = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::empty())
            .old_layout(target.layout)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(target.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .build();

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        target.layout = vk::ImageLayout::PRESENT_SRC_KHR;
    }
}

impl CommandBuffer for VulkanCommandBuffer {
    fn begin(&mut self) -> RalResult<()> {
        if self.recording {
            return Err(RalError::invalid_operation("Command buffer already recording"));
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(self.command_buffer, &begin_info) }
            .call("vkBeginCommandBuffer")?;

        self.recording = true;
        self.render_pass = None;
        self.pipeline = None;
        self.index_buffer_bound = false;
        Ok(())
    }

    fn end(&mut self) -> RalResult<()> {
        self.ensure_recording("end")?;
        if self.render_pass.is_some() {
            return Err(RalError::invalid_operation("Command buffer ended inside a render pass"));
        }
        if self.frame_index.is_some() {
            self.prepare_swapchain_for_present();
        }

        unsafe { self.device.end_command_buffer(self.command_buffer) }.call("vkEndCommandBuffer")?;
        self.recording = false;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn frame_index(&self) -> Option<usize> {
        self.frame_index
    }

    fn begin_render_pass(&mut self, description: &RenderPassDescription) -> RalResult<()> {
        self.ensure_recording("begin_render_pass")?;
        if self.render_pass.is_some() {
            return Err(RalError::invalid_operation("Render pass already active"));
        }
        if description.color_attachments.is_empty() && description.depth_attachment.is_none() {
            return Err(RalError::invalid_operation("Render pass without attachments"));
        }

        let mut shared = self.shared.borrow_mut();
        let shared = &mut *shared;

        let mut key = RenderPassKey {
            colors: Vec::with_capacity(description.color_attachments.len()),
            depth: None,
        };
        let mut views = Vec::new();
        let mut clear_values: Vec<vk::ClearValue> = Vec::new();
        let mut extent: Option<vk::Extent2D> = None;
        let mut fit = |attachment: vk::Extent2D| {
            extent = Some(match extent {
                Some(current) => vk::Extent2D {
                    width: current.width.min(attachment.width),
                    height: current.height.min(attachment.height),
                },
                None => attachment,
            });
        };

        for attachment in &description.color_attachments {
            let (view, format, attachment_extent): (vk::ImageView, vk::Format, vk::Extent2D) = match attachment.target {
                AttachmentTarget::Swapchain => {
                    if self.frame_index.is_none() {
                        return Err(RalError::invalid_operation("Swapchain attachment used outside a frame"));
                    }
                    let target = shared
                        .swapchain_target
                        .as_mut()
                        .ok_or_else(|| RalError::invalid_operation("No swapchain image acquired"))?;
                    target.layout = attachment.final_layout.into_vk();
                    (target.view, target.format, target.extent)
                }
                AttachmentTarget::Texture(handle) => {
                    let texture = shared.resources.get_texture(handle)?;
                    if !texture.description.usage.contains(TextureUsage::COLOR_ATTACHMENT) {
                        return Err(RalError::invalid_operation(format!(
                            "begin_render_pass: {handle:?} lacks COLOR_ATTACHMENT usage"
                        )));
                    }
                    let extent = vk::Extent2D {
                        width: texture.description.width,
                        height: texture.description.height,
                    };
                    (texture.view, texture.description.format.into_vk(), extent)
                }
            };

            fit(attachment_extent);
            views.push(view);
            key.colors.push(AttachmentKey {
                format,
                load_op: attachment.load_op.into_vk(),
                store_op: attachment.store_op.into_vk(),
                initial_layout: attachment.effective_initial_layout().into_vk(),
                final_layout: attachment.final_layout.into_vk(),
            });
            clear_values.push(ClearValue::Color(attachment.clear_color).into_vk());
        }

        if let Some(depth) = &description.depth_attachment {
            let texture = shared.resources.get_texture(depth.texture)?;
            if !texture.description.usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT) {
                return Err(RalError::invalid_operation(format!(
                    "begin_render_pass: {:?} lacks DEPTH_STENCIL_ATTACHMENT usage",
                    depth.texture
                )));
            }
            fit(vk::Extent2D {
                width: texture.description.width,
                height: texture.description.height,
            });
            views.push(texture.view);
            key.depth = Some(AttachmentKey {
                format: texture.description.format.into_vk(),
                load_op: depth.load_op.into_vk(),
                store_op: depth.store_op.into_vk(),
                initial_layout: match depth.load_op {
                    LoadOp::Load => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    LoadOp::Clear | LoadOp::DontCare => vk::ImageLayout::UNDEFINED,
                },
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            });
            clear_values.push(
                ClearValue::DepthStencil {
                    depth: depth.clear_depth,
                    stencil: depth.clear_stencil,
                }
                .into_vk(),
            );
        }

        let extent = extent.ok_or_else(|| RalError::invalid_operation("Render pass without attachments"))?;
        let render_pass = shared.render_passes.get_or_create(&key)?;
        let framebuffer = create_framebuffer(&self.device, render_pass, &views, extent)?;
        shared.transient_framebuffers.push(framebuffer);

        let full = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let render_area = description.render_area.map_or(full, |area| area.into_vk());
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &begin_info, vk::SubpassContents::INLINE);
            self.device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(self.command_buffer, 0, &[render_area]);
        }

        self.render_pass = Some(ActivePass {
            color_attachments: description.color_attachments.len(),
            depth_attachment: description.depth_attachment.is_some(),
        });
        Ok(())
    }

    fn end_render_pass(&mut self) -> RalResult<()> {
        self.ensure_recording("end_render_pass")?;
        if self.render_pass.take().is_none() {
            return Err(RalError::invalid_operation("No active render pass"));
        }
        unsafe { self.device.cmd_end_render_pass(self.command_buffer) };
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> RalResult<()> {
        self.ensure_recording("bind_pipeline")?;
        let shared = self.shared.borrow();
        let native = shared.resources.get_pipeline(pipeline)?;

        unsafe {
            self.device
                .cmd_bind_pipeline(self.command_buffer, native.bind_point.into_vk(), native.pipeline);
        }
        let bound = BoundPipeline {
            handle: pipeline,
            layout: native.layout,
            bind_point: native.bind_point,
            set_count: native.set_layouts.len(),
            push_constant_stages: native.push_constant_stages,
            push_constant_end: native.push_constant_end,
            color_attachments: native.color_attachments,
            depth_attachment: native.depth_attachment,
        };
        drop(shared);

        self.pipeline = Some(bound);
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) -> RalResult<()> {
        self.ensure_recording("bind_vertex_buffer")?;
        let (native, size) = self.buffer_with_usage(buffer, BufferUsage::VERTEX_BUFFER, "bind_vertex_buffer")?;
        if offset >= size {
            return Err(RalError::invalid_operation(format!(
                "vertex buffer offset {offset} beyond size {size}"
            )));
        }
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, binding, &[native], &[offset]);
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) -> RalResult<()> {
        self.ensure_recording("bind_index_buffer")?;
        let (native, _) = self.buffer_with_usage(buffer, BufferUsage::INDEX_BUFFER, "bind_index_buffer")?;
        if offset % index_type.size() != 0 {
            return Err(RalError::invalid_operation(format!(
                "index buffer offset {offset} not aligned to {index_type:?}"
            )));
        }
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.command_buffer, native, offset, index_type.into_vk());
        }
        self.index_buffer_bound = true;
        Ok(())
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: DescriptorSetHandle) -> RalResult<()> {
        self.ensure_recording("bind_descriptor_set")?;
        let (layout, bind_point, set_count) = match &self.pipeline {
            Some(bound) => (bound.layout, bound.bind_point, bound.set_count),
            None => return Err(RalError::invalid_operation("bind_descriptor_set without a bound pipeline")),
        };
        if set_index as usize >= set_count {
            return Err(RalError::invalid_operation(format!(
                "descriptor set index {set_index} outside pipeline layout ({set_count} sets)"
            )));
        }

        let native = self.shared.borrow().resources.get_descriptor_set(set)?.set;
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                bind_point.into_vk(),
                layout,
                set_index,
                &[native],
                &[],
            );
        }
        Ok(())
    }

    fn push_constants(&mut self, stages: ShaderStages, offset: u32, data: &[u8]) -> RalResult<()> {
        self.ensure_recording("push_constants")?;
        let bound = self
            .pipeline
            .as_ref()
            .ok_or_else(|| RalError::invalid_operation("push_constants without a bound pipeline"))?;

        let fits = range_end(u64::from(offset), data.len() as u64, u64::from(bound.push_constant_end)).is_some();
        if !bound.push_constant_stages.contains(stages) || !fits {
            return Err(RalError::invalid_operation(format!(
                "push constants {stages:?} at {offset} ({} bytes) outside the pipeline's ranges",
                data.len()
            )));
        }
        unsafe {
            self.device
                .cmd_push_constants(self.command_buffer, bound.layout, stages.into_vk(), offset, data);
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> RalResult<()> {
        self.ensure_recording("set_viewport")?;
        if viewport.width <= 0.0 || viewport.height == 0.0 {
            return Err(RalError::invalid_operation(format!("degenerate viewport {viewport:?}")));
        }
        unsafe {
            self.device
                .cmd_set_viewport(self.command_buffer, 0, &[(*viewport).into_vk()]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: &Rect2D) -> RalResult<()> {
        self.ensure_recording("set_scissor")?;
        unsafe {
            self.device
                .cmd_set_scissor(self.command_buffer, 0, &[(*scissor).into_vk()]);
        }
        Ok(())
    }

    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier) -> RalResult<()> {
        self.ensure_outside_pass("pipeline_barrier")?;

        let mut src_stage: vk::PipelineStageFlags = barrier.src_stage.into_vk();
        if src_stage.is_empty() {
            src_stage = vk::PipelineStageFlags::TOP_OF_PIPE;
        }
        let mut dst_stage: vk::PipelineStageFlags = barrier.dst_stage.into_vk();
        if dst_stage.is_empty() {
            dst_stage = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
        }
        let src_access: vk::AccessFlags = barrier.src_access.into_vk();
        let dst_access: vk::AccessFlags = barrier.dst_access.into_vk();

        match barrier.transition {
            Some(transition) => {
                let shared = self.shared.borrow();
                let texture = shared.resources.get_texture(transition.texture)?;
                let image_barrier = vk::ImageMemoryBarrier::builder()
                    .src_access_mask(src_access)
                    .dst_access_mask(dst_access)
                    .old_layout(transition.old_layout.into_vk())
                    .new_layout(transition.new_layout.into_vk())
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(texture.image)
                    .subresource_range(texture.full_range())
                    .build();
                unsafe {
                    self.device.cmd_pipeline_barrier(
                        self.command_buffer,
                        src_stage,
                        dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[image_barrier],
                    );
                }
            }
            None => {
                let memory_barrier = vk::MemoryBarrier::builder()
                    .src_access_mask(src_access)
                    .dst_access_mask(dst_access)
                    .build();
                unsafe {
                    self.device.cmd_pipeline_barrier(
                        self.command_buffer,
                        src_stage,
                        dst_stage,
                        vk::DependencyFlags::empty(),
                        &[memory_barrier],
                        &[],
                        &[],
                    );
                }
            }
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> RalResult<()> {
        self.ensure_graphics_draw("draw")?;
        if vertex_count > 0 && instance_count > 0 {
            unsafe {
                self.device
                    .cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance);
            }
        }
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> RalResult<()> {
        self.ensure_graphics_draw("draw_indexed")?;
        if !self.index_buffer_bound {
            return Err(RalError::invalid_operation("draw_indexed without an index buffer"));
        }
        if index_count > 0 && instance_count > 0 {
            unsafe {
                self.device.cmd_draw_indexed(
                    self.command_buffer,
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                );
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RalResult<()> {
        self.ensure_outside_pass("dispatch")?;
        match &self.pipeline {
            Some(bound) if bound.bind_point == PipelineBindPoint::Compute => {}
            _ => return Err(RalError::invalid_operation("dispatch without a compute pipeline")),
        }
        if x > 0 && y > 0 && z > 0 {
            unsafe { self.device.cmd_dispatch(self.command_buffer, x, y, z) };
        }
        Ok(())
    }

    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, region: &BufferCopy) -> RalResult<()> {
        self.ensure_outside_pass("copy_buffer")?;
        let (src_buffer, src_size) = self.buffer_with_usage(src, BufferUsage::TRANSFER_SRC, "copy_buffer")?;
        let (dst_buffer, dst_size) = self.buffer_with_usage(dst, BufferUsage::TRANSFER_DST, "copy_buffer")?;

        region.check(src_size, dst_size)?;

        let copy = vk::BufferCopy {
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        };
        unsafe {
            self.device
                .cmd_copy_buffer(self.command_buffer, src_buffer, dst_buffer, &[copy]);
        }
        Ok(())
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: BufferHandle,
        dst: TextureHandle,
        region: &BufferTextureCopy,
    ) -> RalResult<()> {
        self.ensure_outside_pass("copy_buffer_to_texture")?;
        let (src_buffer, src_size) =
            self.buffer_with_usage(src, BufferUsage::TRANSFER_SRC, "copy_buffer_to_texture")?;

        let shared = self.shared.borrow();
        let texture = shared.resources.get_texture(dst)?;
        let description = &texture.description;
        if !description.usage.contains(TextureUsage::TRANSFER_DST) {
            return Err(RalError::invalid_operation(format!(
                "copy_buffer_to_texture: {dst:?} lacks TRANSFER_DST usage"
            )));
        }

        region.check(description, src_size)?;
        let [x, y, z] = region.texture_offset;
        let [w, h, d] = region.extent;

        let copy = vk::BufferImageCopy {
            buffer_offset: region.buffer_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: aspect_mask(description.format),
                mip_level: region.mip_level,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x, y, z },
            image_extent: vk::Extent3D {
                width: w,
                height: h,
                depth: d,
            },
        };
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                src_buffer,
                texture.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy],
            );
        }
        Ok(())
    }
}
