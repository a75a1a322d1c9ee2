//! Backend-agnostic command recording
//!
//! A command buffer records a linear sequence of GPU commands between
//! `begin` and `end`. Handles are resolved while recording, so a resource
//! destroyed after being recorded stays alive natively until the deletion
//! queue of its frame is flushed, even though its handle is already stale.
//!
//! Recording is single threaded; a command buffer is neither reentrant nor
//! shared.

use bytemuck::Pod;

use crate::render::api::descriptions::{
    BufferCopy, BufferTextureCopy, PipelineBarrier, RenderPassDescription,
};
use crate::render::api::handle::{
    BufferHandle, DescriptorSetHandle, PipelineHandle, TextureHandle,
};
use crate::render::api::types::{IndexType, Rect2D, ShaderStages, Viewport};
use crate::render::error::RalResult;

/// Records GPU commands against resource handles
pub trait CommandBuffer {
    /// Start recording
    ///
    /// Command buffers handed out by `Device::begin_frame` and
    /// `Device::immediate_submit` are already recording.
    fn begin(&mut self) -> RalResult<()>;

    /// Finish recording
    fn end(&mut self) -> RalResult<()>;

    /// Whether `begin` was called without a matching `end`
    fn is_recording(&self) -> bool;

    /// Frame-in-flight slot this buffer was allocated for, `None` for one-shot buffers
    fn frame_index(&self) -> Option<usize>;

    /// Begin a render pass instance
    fn begin_render_pass(&mut self, description: &RenderPassDescription) -> RalResult<()>;

    /// End the current render pass instance
    fn end_render_pass(&mut self) -> RalResult<()>;

    /// Bind a graphics or compute pipeline
    fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> RalResult<()>;

    /// Bind a vertex buffer to `binding`
    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) -> RalResult<()>;

    /// Bind an index buffer
    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, index_type: IndexType) -> RalResult<()>;

    /// Bind a descriptor set at `set_index` of the bound pipeline's layout
    fn bind_descriptor_set(&mut self, set_index: u32, set: DescriptorSetHandle) -> RalResult<()>;

    /// Update push constants of the bound pipeline's layout
    fn push_constants(&mut self, stages: ShaderStages, offset: u32, data: &[u8]) -> RalResult<()>;

    /// Set the dynamic viewport
    fn set_viewport(&mut self, viewport: &Viewport) -> RalResult<()>;

    /// Set the dynamic scissor
    fn set_scissor(&mut self, scissor: &Rect2D) -> RalResult<()>;

    /// Record an execution/memory dependency, optionally with a layout transition
    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier) -> RalResult<()>;

    /// Non-indexed draw
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> RalResult<()>;

    /// Indexed draw
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> RalResult<()>;

    /// Compute dispatch
    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) -> RalResult<()>;

    /// Copy between buffers
    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, region: &BufferCopy) -> RalResult<()>;

    /// Copy tightly packed texels from a buffer into a texture in `TransferDst` layout
    fn copy_buffer_to_texture(
        &mut self,
        src: BufferHandle,
        dst: TextureHandle,
        region: &BufferTextureCopy,
    ) -> RalResult<()>;
}

/// Typed helpers layered over [`CommandBuffer`]
pub trait CommandBufferExt: CommandBuffer {
    /// Push a plain-old-data value as push constants
    fn push_constants_typed<T: Pod>(&mut self, stages: ShaderStages, offset: u32, value: &T) -> RalResult<()> {
        self.push_constants(stages, offset, bytemuck::bytes_of(value))
    }

    /// Copy the whole of `src` to the start of `dst`
    fn copy_buffer_whole(&mut self, src: BufferHandle, dst: BufferHandle, size: u64) -> RalResult<()> {
        self.copy_buffer(
            src,
            dst,
            &BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            },
        )
    }
}

impl<C: CommandBuffer + ?Sized> CommandBufferExt for C {}
