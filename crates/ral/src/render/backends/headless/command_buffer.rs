//! Headless command buffer
//!
//! Resolves every handle at record time and validates usage the way a
//! validation layer would, then hands the resolved work to the device.

use std::cell::RefCell;
use std::rc::Rc;

use crate::render::api::command_buffer::CommandBuffer;
use crate::render::api::descriptions::{
    range_end, AttachmentTarget, BufferCopy, BufferTextureCopy, PipelineBarrier, RenderPassDescription,
};
use crate::render::api::handle::{BufferHandle, DescriptorSetHandle, PipelineHandle, TextureHandle};
use crate::render::api::types::{
    BufferUsage, IndexType, PipelineBindPoint, Rect2D, ShaderStages, TextureUsage, Viewport,
};
use crate::render::error::{RalError, RalResult};

use super::state::{GpuOp, HeadlessShared, NativeId, RecordedCommands};

struct BoundPipeline {
    handle: PipelineHandle,
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

/// Command buffer of the headless backend
pub struct HeadlessCommandBuffer {
    shared: Rc<RefCell<HeadlessShared>>,
    frame_index: Option<usize>,
    recording: bool,
    render_pass: Option<ActivePass>,
    pipeline: Option<BoundPipeline>,
    index_buffer_bound: bool,
    commands: RecordedCommands,
}

impl HeadlessCommandBuffer {
    pub(super) fn new(shared: Rc<RefCell<HeadlessShared>>, frame_index: Option<usize>) -> Self {
        Self {
            shared,
            frame_index,
            recording: false,
            render_pass: None,
            pipeline: None,
            index_buffer_bound: false,
            commands: RecordedCommands::default(),
        }
    }

    fn ensure_recording(&self, command: &str) -> RalResult<()> {
        if self.recording {
            Ok(())
        } else {
            Err(RalError::invalid_operation(format!("{command} recorded outside begin/end")))
        }
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

    fn buffer_with_usage(
        &mut self,
        handle: BufferHandle,
        usage: BufferUsage,
        command: &str,
    ) -> RalResult<(NativeId, super::state::Memory, u64)> {
        let shared = self.shared.borrow();
        let buffer = shared.resources.get_buffer(handle)?;
        if !buffer.description.usage.contains(usage) {
            return Err(RalError::invalid_operation(format!(
                "{command}: {handle:?} lacks {usage:?} usage"
            )));
        }
        let resolved = (buffer.id, Rc::clone(&buffer.memory), buffer.description.size);
        drop(shared);
        self.commands.used.push(resolved.0);
        Ok(resolved)
    }

    fn use_texture(&mut self, handle: TextureHandle, usage: TextureUsage, command: &str) -> RalResult<NativeId> {
        let shared = self.shared.borrow();
        let texture = shared.resources.get_texture(handle)?;
        if !texture.description.usage.contains(usage) {
            return Err(RalError::invalid_operation(format!(
                "{command}: {handle:?} lacks {usage:?} usage"
            )));
        }
        let id = texture.id;
        drop(shared);
        self.commands.used.push(id);
        Ok(id)
    }
}

impl CommandBuffer for HeadlessCommandBuffer {
    fn begin(&mut self) -> RalResult<()> {
        if self.recording {
            return Err(RalError::invalid_operation("Command buffer already recording"));
        }
        self.recording = true;
        self.render_pass = None;
        self.pipeline = None;
        self.index_buffer_bound = false;
        self.commands = RecordedCommands::default();
        Ok(())
    }

    fn end(&mut self) -> RalResult<()> {
        self.ensure_recording("end")?;
        if self.render_pass.is_some() {
            return Err(RalError::invalid_operation("Command buffer ended inside a render pass"));
        }
        self.recording = false;
        self.shared.borrow_mut().recorded = Some(std::mem::take(&mut self.commands));
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

        for attachment in &description.color_attachments {
            match attachment.target {
                AttachmentTarget::Swapchain => {
                    if self.frame_index.is_none() {
                        return Err(RalError::invalid_operation(
                            "Swapchain attachment used outside a frame",
                        ));
                    }
                }
                AttachmentTarget::Texture(texture) => {
                    self.use_texture(texture, TextureUsage::COLOR_ATTACHMENT, "begin_render_pass")?;
                }
            }
        }
        if let Some(depth) = &description.depth_attachment {
            self.use_texture(depth.texture, TextureUsage::DEPTH_STENCIL_ATTACHMENT, "begin_render_pass")?;
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
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> RalResult<()> {
        self.ensure_recording("bind_pipeline")?;
        let shared = self.shared.borrow();
        let native = shared.resources.get_pipeline(pipeline)?;
        let bound = BoundPipeline {
            handle: pipeline,
            bind_point: native.bind_point,
            set_count: native.set_layouts.len(),
            push_constant_stages: native.push_constant_stages,
            push_constant_end: native.push_constant_end,
            color_attachments: native.color_attachments,
            depth_attachment: native.depth_attachment,
        };
        let id = native.id;
        drop(shared);

        self.commands.used.push(id);
        self.pipeline = Some(bound);
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, _binding: u32, buffer: BufferHandle, offset: u64) -> RalResult<()> {
        self.ensure_recording("bind_vertex_buffer")?;
        let (_, _, size) = self.buffer_with_usage(buffer, BufferUsage::VERTEX_BUFFER, "bind_vertex_buffer")?;
        if offset >= size {
            return Err(RalError::invalid_operation(format!(
                "vertex buffer offset {offset} beyond size {size}"
            )));
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) -> RalResult<()> {
        self.ensure_recording("bind_index_buffer")?;
        self.buffer_with_usage(buffer, BufferUsage::INDEX_BUFFER, "bind_index_buffer")?;
        if offset % index_type.size() != 0 {
            return Err(RalError::invalid_operation(format!(
                "index buffer offset {offset} not aligned to {:?}",
                index_type
            )));
        }
        self.index_buffer_bound = true;
        Ok(())
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: DescriptorSetHandle) -> RalResult<()> {
        self.ensure_recording("bind_descriptor_set")?;
        let set_count = match &self.pipeline {
            Some(bound) => bound.set_count,
            None => return Err(RalError::invalid_operation("bind_descriptor_set without a bound pipeline")),
        };
        if set_index as usize >= set_count {
            return Err(RalError::invalid_operation(format!(
                "descriptor set index {set_index} outside pipeline layout ({set_count} sets)"
            )));
        }

        let id = self.shared.borrow().resources.get_descriptor_set(set)?.id;
        self.commands.used.push(id);
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
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> RalResult<()> {
        self.ensure_recording("set_viewport")?;
        if viewport.width <= 0.0 || viewport.height == 0.0 {
            return Err(RalError::invalid_operation(format!("degenerate viewport {viewport:?}")));
        }
        Ok(())
    }

    fn set_scissor(&mut self, _scissor: &Rect2D) -> RalResult<()> {
        self.ensure_recording("set_scissor")
    }

    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier) -> RalResult<()> {
        self.ensure_recording("pipeline_barrier")?;
        if self.render_pass.is_some() {
            return Err(RalError::invalid_operation("pipeline_barrier inside a render pass"));
        }

        let transition = match barrier.transition {
            Some(transition) => {
                let id = self.shared.borrow().resources.get_texture(transition.texture)?.id;
                self.commands.used.push(id);
                Some((id, transition.old_layout, transition.new_layout))
            }
            None => None,
        };

        self.commands.ops.push(GpuOp::Barrier { transition });
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) -> RalResult<()> {
        self.ensure_graphics_draw("draw")?;
        if vertex_count > 0 && instance_count > 0 {
            self.commands.ops.push(GpuOp::Draw);
        }
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) -> RalResult<()> {
        self.ensure_graphics_draw("draw_indexed")?;
        if !self.index_buffer_bound {
            return Err(RalError::invalid_operation("draw_indexed without an index buffer"));
        }
        if index_count > 0 && instance_count > 0 {
            self.commands.ops.push(GpuOp::Draw);
        }
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RalResult<()> {
        self.ensure_recording("dispatch")?;
        if self.render_pass.is_some() {
            return Err(RalError::invalid_operation("dispatch inside a render pass"));
        }
        match &self.pipeline {
            Some(bound) if bound.bind_point == PipelineBindPoint::Compute => {}
            _ => return Err(RalError::invalid_operation("dispatch without a compute pipeline")),
        }
        if x > 0 && y > 0 && z > 0 {
            self.commands.ops.push(GpuOp::Dispatch);
        }
        Ok(())
    }

    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, region: &BufferCopy) -> RalResult<()> {
        self.ensure_recording("copy_buffer")?;
        if self.render_pass.is_some() {
            return Err(RalError::invalid_operation("copy_buffer inside a render pass"));
        }
        let (_, src_memory, src_size) = self.buffer_with_usage(src, BufferUsage::TRANSFER_SRC, "copy_buffer")?;
        let (_, dst_memory, dst_size) = self.buffer_with_usage(dst, BufferUsage::TRANSFER_DST, "copy_buffer")?;

        region.check(src_size, dst_size)?;

        self.commands.ops.push(GpuOp::CopyBuffer {
            src: src_memory,
            dst: dst_memory,
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        });
        Ok(())
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: BufferHandle,
        dst: TextureHandle,
        region: &BufferTextureCopy,
    ) -> RalResult<()> {
        self.ensure_recording("copy_buffer_to_texture")?;
        if self.render_pass.is_some() {
            return Err(RalError::invalid_operation("copy_buffer_to_texture inside a render pass"));
        }
        let (_, src_memory, src_size) =
            self.buffer_with_usage(src, BufferUsage::TRANSFER_SRC, "copy_buffer_to_texture")?;
        self.use_texture(dst, TextureUsage::TRANSFER_DST, "copy_buffer_to_texture")?;

        let (dst_memory, description) = {
            let shared = self.shared.borrow();
            let texture = shared.resources.get_texture(dst)?;
            (Rc::clone(&texture.memory), texture.description.clone())
        };

        if region.mip_level != 0 {
            return Err(RalError::invalid_operation("headless textures only store the base mip"));
        }
        region.check(&description, src_size)?;

        self.commands.ops.push(GpuOp::CopyBufferToTexture {
            src: src_memory,
            dst: dst_memory,
            region: *region,
            texture: description,
        });
        Ok(())
    }
}
