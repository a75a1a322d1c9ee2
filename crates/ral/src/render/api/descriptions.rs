//! Plain-data descriptions handed to the device
//!
//! Loaders and material systems build these; the device consumes them
//! verbatim and never keeps references into them.

use crate::render::api::handle::{
    BufferHandle, DescriptorSetLayoutHandle, SamplerHandle, ShaderHandle, TextureHandle,
};
use crate::render::api::types::{
    Access, AddressMode, BlendFactor, BlendOp, BufferUsage, CompareOp, CullMode, DescriptorType,
    Filter, Format, FrontFace, ImageLayout, LoadOp, MemoryUsage, PipelineStage, PolygonMode,
    PrimitiveTopology, Rect2D, ShaderStages, StoreOp, TextureUsage, VertexInputRate,
};
use crate::render::error::{RalError, RalResult};

/// SPIR-V magic number, first word of every module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Buffer creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescription {
    /// Size in bytes
    pub size: u64,
    /// Permitted uses
    pub usage: BufferUsage,
    /// Memory placement
    pub memory_usage: MemoryUsage,
}

impl BufferDescription {
    /// Describe a buffer
    pub fn new(size: u64, usage: BufferUsage, memory_usage: MemoryUsage) -> Self {
        Self {
            size,
            usage,
            memory_usage,
        }
    }

    /// Check the parameters before any native call is made
    pub fn validate(&self) -> RalResult<()> {
        if self.size == 0 {
            return Err(RalError::ResourceCreation("buffer size must be non-zero".to_string()));
        }
        if self.usage.is_empty() {
            return Err(RalError::ResourceCreation("buffer usage must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Texture creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescription {
    pub width: u32,
    pub height: u32,
    /// Greater than one for volume textures
    pub depth: u32,
    pub mip_levels: u32,
    pub format: Format,
    pub usage: TextureUsage,
}

impl TextureDescription {
    /// Describe a single-mip 2D texture
    pub fn texture_2d(width: u32, height: u32, format: Format, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            depth: 1,
            mip_levels: 1,
            format,
            usage,
        }
    }

    /// Set the mip count
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Bytes of the base mip, `None` when not representable
    pub fn base_mip_bytes(&self) -> Option<u64> {
        u64::from(self.width)
            .checked_mul(u64::from(self.height))?
            .checked_mul(u64::from(self.depth))?
            .checked_mul(u64::from(self.format.texel_size()))
    }

    /// Check the parameters before any native call is made
    pub fn validate(&self) -> RalResult<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(RalError::ResourceCreation(format!(
                "texture extent {}x{}x{} has a zero dimension",
                self.width, self.height, self.depth
            )));
        }
        if self.format == Format::Undefined {
            return Err(RalError::ResourceCreation("texture format is undefined".to_string()));
        }
        let max_mips = 32 - self.width.max(self.height).max(self.depth).leading_zeros();
        if self.mip_levels == 0 || self.mip_levels > max_mips {
            return Err(RalError::ResourceCreation(format!(
                "texture mip count {} outside 1..={max_mips}",
                self.mip_levels
            )));
        }
        if self.usage.is_empty() {
            return Err(RalError::ResourceCreation("texture usage must not be empty".to_string()));
        }
        if self.usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT) && !self.format.is_depth() {
            return Err(RalError::ResourceCreation(format!(
                "{:?} cannot be a depth attachment",
                self.format
            )));
        }
        Ok(())
    }
}

/// Shader module parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDescription {
    /// The single stage this module is compiled for
    pub stage: ShaderStages,
    /// SPIR-V words
    pub code: Vec<u32>,
    pub entry_point: String,
}

impl ShaderDescription {
    /// Build a description from a SPIR-V binary
    ///
    /// Length and magic number are checked here; anything deeper is left to
    /// the driver.
    pub fn from_spirv_bytes(stage: ShaderStages, bytes: &[u8]) -> RalResult<Self> {
        if bytes.len() % 4 != 0 {
            return Err(RalError::ResourceCreation(format!(
                "SPIR-V length {} is not a multiple of 4",
                bytes.len()
            )));
        }

        let code: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
            .collect();

        let description = Self {
            stage,
            code,
            entry_point: "main".to_string(),
        };
        description.validate()?;
        Ok(description)
    }

    /// Check the parameters before any native call is made
    pub fn validate(&self) -> RalResult<()> {
        if self.stage.bits().count_ones() != 1 {
            return Err(RalError::ResourceCreation(format!(
                "shader must target exactly one stage, got {:?}",
                self.stage
            )));
        }
        match self.code.first() {
            Some(&SPIRV_MAGIC) => Ok(()),
            Some(&word) => Err(RalError::ResourceCreation(format!(
                "invalid SPIR-V magic number {word:#010x}"
            ))),
            None => Err(RalError::ResourceCreation("empty shader module".to_string())),
        }
    }
}

/// One vertex buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// One vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

/// Vertex input layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Interleaved per-vertex layout in binding 0, offsets packed in order
    pub fn interleaved(formats: &[Format]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(location, &format)| {
                let attribute = VertexAttribute {
                    location: location as u32,
                    binding: 0,
                    format,
                    offset,
                };
                offset += format.texel_size();
                attribute
            })
            .collect();

        Self {
            bindings: vec![VertexBinding {
                binding: 0,
                stride: offset,
                input_rate: VertexInputRate::Vertex,
            }],
            attributes,
        }
    }
}

/// Rasterizer state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub line_width: f32,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            line_width: 1.0,
        }
    }
}

/// Depth test state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare_op: CompareOp,
}

impl DepthState {
    /// Depth testing off
    pub const DISABLED: Self = Self {
        test_enable: false,
        write_enable: false,
        compare_op: CompareOp::Always,
    };

    /// Standard less-than test with writes
    pub const LESS: Self = Self {
        test_enable: true,
        write_enable: true,
        compare_op: CompareOp::Less,
    };
}

impl Default for DepthState {
    fn default() -> Self {
        Self::DISABLED
    }
}

/// Color blend state shared by every color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    pub enabled: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
}

impl BlendState {
    /// Blending off
    pub const OPAQUE: Self = Self {
        enabled: false,
        src_color: BlendFactor::One,
        dst_color: BlendFactor::Zero,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::Zero,
        alpha_op: BlendOp::Add,
    };

    /// Straight alpha blending
    pub const ALPHA: Self = Self {
        enabled: true,
        src_color: BlendFactor::SrcAlpha,
        dst_color: BlendFactor::OneMinusSrcAlpha,
        color_op: BlendOp::Add,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
        alpha_op: BlendOp::Add,
    };
}

impl Default for BlendState {
    fn default() -> Self {
        Self::OPAQUE
    }
}

/// Push constant range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: ShaderStages,
    pub offset: u32,
    pub size: u32,
}

/// Graphics or compute pipeline parameters
///
/// A pipeline whose only shader is a compute shader is a compute pipeline;
/// the raster, blend and attachment fields are ignored for it.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDescription {
    pub shaders: Vec<ShaderHandle>,
    pub vertex_layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub raster: RasterState,
    pub depth: DepthState,
    pub blend: BlendState,
    pub descriptor_set_layouts: Vec<DescriptorSetLayoutHandle>,
    pub push_constant_ranges: Vec<PushConstantRange>,
    /// Formats of the color attachments this pipeline renders to
    pub color_formats: Vec<Format>,
    pub depth_format: Option<Format>,
}

impl PipelineDescription {
    /// Graphics pipeline with default fixed-function state
    pub fn graphics(shaders: Vec<ShaderHandle>, color_format: Format) -> Self {
        Self {
            shaders,
            vertex_layout: VertexLayout::default(),
            topology: PrimitiveTopology::TriangleList,
            raster: RasterState::default(),
            depth: DepthState::default(),
            blend: BlendState::default(),
            descriptor_set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            color_formats: vec![color_format],
            depth_format: None,
        }
    }

    /// Compute pipeline
    pub fn compute(shader: ShaderHandle) -> Self {
        Self {
            color_formats: Vec::new(),
            ..Self::graphics(vec![shader], Format::Undefined)
        }
    }

    /// Set the vertex layout
    pub fn with_vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    /// Set the descriptor set layouts, in set order
    pub fn with_descriptor_set_layouts(mut self, layouts: Vec<DescriptorSetLayoutHandle>) -> Self {
        self.descriptor_set_layouts = layouts;
        self
    }

    /// Add a push constant range
    pub fn with_push_constants(mut self, range: PushConstantRange) -> Self {
        self.push_constant_ranges.push(range);
        self
    }

    /// Enable depth with the given attachment format
    pub fn with_depth(mut self, format: Format, state: DepthState) -> Self {
        self.depth_format = Some(format);
        self.depth = state;
        self
    }

    /// Set the rasterizer state
    pub fn with_raster(mut self, raster: RasterState) -> Self {
        self.raster = raster;
        self
    }

    /// Set the blend state
    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = blend;
        self
    }

    /// Check the parameters that need no resource lookup
    pub fn validate(&self) -> RalResult<()> {
        if self.shaders.is_empty() {
            return Err(RalError::ResourceCreation("pipeline has no shaders".to_string()));
        }
        if let Some(format) = self.depth_format {
            if !format.is_depth() {
                return Err(RalError::ResourceCreation(format!(
                    "{format:?} is not a depth format"
                )));
            }
        }
        Ok(())
    }
}

/// One binding of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStages,
}

impl DescriptorBinding {
    /// Single descriptor binding
    pub fn new(binding: u32, descriptor_type: DescriptorType, stages: ShaderStages) -> Self {
        Self {
            binding,
            descriptor_type,
            count: 1,
            stages,
        }
    }
}

/// Descriptor set layout parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetLayoutDescription {
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutDescription {
    /// Check for duplicate binding numbers
    pub fn validate(&self) -> RalResult<()> {
        for (i, a) in self.bindings.iter().enumerate() {
            if self.bindings[i + 1..].iter().any(|b| b.binding == a.binding) {
                return Err(RalError::ResourceCreation(format!(
                    "descriptor binding {} declared twice",
                    a.binding
                )));
            }
        }
        Ok(())
    }
}

/// What a descriptor write points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    /// Buffer range; `None` range means "to the end"
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        range: Option<u64>,
    },
    /// Texture, optionally paired with a sampler
    Texture {
        texture: TextureHandle,
        sampler: Option<SamplerHandle>,
    },
    /// Standalone sampler
    Sampler(SamplerHandle),
}

/// One descriptor write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub resource: DescriptorResource,
}

/// Descriptor set allocation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSetDescription {
    pub layout: DescriptorSetLayoutHandle,
    /// Initial contents
    pub writes: Vec<DescriptorWrite>,
}

/// Sampler parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDescription {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: Filter,
    pub address_mode: [AddressMode; 3],
    pub max_anisotropy: Option<f32>,
    pub compare_op: Option<CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDescription {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_filter: Filter::Linear,
            address_mode: [AddressMode::Repeat; 3],
            max_anisotropy: None,
            compare_op: None,
            min_lod: 0.0,
            max_lod: 1000.0,
        }
    }
}

/// Render target of a color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentTarget {
    /// The image acquired for the current frame
    Swapchain,
    /// A texture created with `COLOR_ATTACHMENT` usage
    Texture(TextureHandle),
}

/// Color attachment of a render pass instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub target: AttachmentTarget,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: [f32; 4],
    /// Layout the image is in when the pass begins (ignored on clear)
    pub initial_layout: ImageLayout,
    /// Layout the image is left in
    pub final_layout: ImageLayout,
}

impl ColorAttachment {
    /// Clear the swapchain image and leave it ready for presentation
    pub fn swapchain(clear_color: [f32; 4]) -> Self {
        Self {
            target: AttachmentTarget::Swapchain,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            clear_color,
            initial_layout: ImageLayout::Undefined,
            final_layout: ImageLayout::Present,
        }
    }

    /// Clear a texture and leave it ready for sampling
    pub fn texture(texture: TextureHandle, clear_color: [f32; 4]) -> Self {
        Self {
            target: AttachmentTarget::Texture(texture),
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            clear_color,
            initial_layout: ImageLayout::Undefined,
            final_layout: ImageLayout::ShaderReadOnly,
        }
    }

    /// Effective initial layout once the load op is taken into account
    pub fn effective_initial_layout(&self) -> ImageLayout {
        match self.load_op {
            LoadOp::Load => self.initial_layout,
            LoadOp::Clear | LoadOp::DontCare => ImageLayout::Undefined,
        }
    }
}

/// Depth attachment of a render pass instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub texture: TextureHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

impl DepthAttachment {
    /// Clear to the far plane and discard afterwards
    pub fn transient(texture: TextureHandle) -> Self {
        Self {
            texture,
            load_op: LoadOp::Clear,
            store_op: StoreOp::DontCare,
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }
}

/// Parameters of `begin_render_pass`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescription {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
    /// Defaults to the full attachment extent
    pub render_area: Option<Rect2D>,
}

impl RenderPassDescription {
    /// Single swapchain color attachment cleared to `clear_color`
    pub fn swapchain(clear_color: [f32; 4]) -> Self {
        Self {
            color_attachments: vec![ColorAttachment::swapchain(clear_color)],
            depth_attachment: None,
            render_area: None,
        }
    }

    /// Add a depth attachment
    pub fn with_depth(mut self, depth: DepthAttachment) -> Self {
        self.depth_attachment = Some(depth);
        self
    }
}

/// Layout transition carried by a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureTransition {
    pub texture: TextureHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
}

/// Execution and memory dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineBarrier {
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
    pub src_access: Access,
    pub dst_access: Access,
    pub transition: Option<TextureTransition>,
}

impl PipelineBarrier {
    /// Global memory dependency
    pub fn memory(
        src_stage: PipelineStage,
        src_access: Access,
        dst_stage: PipelineStage,
        dst_access: Access,
    ) -> Self {
        Self {
            src_stage,
            dst_stage,
            src_access,
            dst_access,
            transition: None,
        }
    }

    /// Attach a layout transition of `texture`
    pub fn with_transition(
        mut self,
        texture: TextureHandle,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) -> Self {
        self.transition = Some(TextureTransition {
            texture,
            old_layout,
            new_layout,
        });
        self
    }
}

/// End of `offset..offset + len` if the range lies within `limit`
///
/// `None` when the range overruns `limit` or the end is not representable.
pub fn range_end(offset: u64, len: u64, limit: u64) -> Option<u64> {
    offset.checked_add(len).filter(|&end| end <= limit)
}

/// Buffer-to-buffer copy region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    /// Read offset in the source buffer
    pub src_offset: u64,
    /// Write offset in the destination buffer
    pub dst_offset: u64,
    /// Bytes to copy
    pub size: u64,
}

impl BufferCopy {
    /// Reject regions that fall outside either buffer
    pub fn check(&self, src_size: u64, dst_size: u64) -> RalResult<()> {
        if range_end(self.src_offset, self.size, src_size).is_none()
            || range_end(self.dst_offset, self.size, dst_size).is_none()
        {
            return Err(RalError::invalid_operation(format!(
                "copy region {self:?} out of bounds ({src_size} -> {dst_size} bytes)"
            )));
        }
        Ok(())
    }
}

/// Buffer-to-texture copy region (tightly packed rows)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTextureCopy {
    /// Offset of the first texel in the source buffer
    pub buffer_offset: u64,
    /// Destination mip level
    pub mip_level: u32,
    /// Texel offset inside the mip
    pub texture_offset: [i32; 3],
    /// Texels copied along each axis
    pub extent: [u32; 3],
}

impl BufferTextureCopy {
    /// Reject regions outside the mip level or the source buffer
    pub fn check(&self, texture: &TextureDescription, src_size: u64) -> RalResult<()> {
        let mip_extent = |size: u32| size.checked_shr(self.mip_level).unwrap_or(0).max(1);
        let axis_fits = |offset: i32, len: u32, size: u32| {
            u32::try_from(offset)
                .ok()
                .and_then(|offset| offset.checked_add(len))
                .map_or(false, |end| end <= mip_extent(size))
        };
        let [x, y, z] = self.texture_offset;
        let [w, h, d] = self.extent;
        let fits = self.mip_level < texture.mip_levels
            && axis_fits(x, w, texture.width)
            && axis_fits(y, h, texture.height)
            && axis_fits(z, d, texture.depth);

        let bytes = u64::from(w)
            .checked_mul(u64::from(h))
            .and_then(|n| n.checked_mul(u64::from(d)))
            .and_then(|n| n.checked_mul(u64::from(texture.format.texel_size())));
        let in_buffer = bytes.map_or(false, |bytes| range_end(self.buffer_offset, bytes, src_size).is_some());

        if !fits || !in_buffer {
            return Err(RalError::invalid_operation(format!("texture copy {self:?} out of bounds")));
        }
        Ok(())
    }


    /// Copy covering the whole base mip of a texture
    pub fn whole(description: &TextureDescription) -> Self {
        Self {
            buffer_offset: 0,
            mip_level: 0,
            texture_offset: [0; 3],
            extent: [description.width, description.height, description.depth],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spirv_words(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_buffer_description_validation() {
        let desc = BufferDescription::new(256, BufferUsage::VERTEX_BUFFER, MemoryUsage::CpuToGpu);
        assert!(desc.validate().is_ok());
        assert!(BufferDescription::new(0, BufferUsage::VERTEX_BUFFER, MemoryUsage::GpuOnly)
            .validate()
            .is_err());
        assert!(BufferDescription::new(16, BufferUsage::empty(), MemoryUsage::GpuOnly)
            .validate()
            .is_err());
    }

    #[test]
    fn test_texture_mip_bound() {
        let desc = TextureDescription::texture_2d(256, 128, Format::Rgba8Unorm, TextureUsage::SAMPLED);
        assert!(desc.clone().with_mip_levels(9).validate().is_ok());
        assert!(desc.with_mip_levels(10).validate().is_err());
    }

    #[test]
    fn test_depth_usage_needs_depth_format() {
        let desc = TextureDescription::texture_2d(
            64,
            64,
            Format::Rgba8Unorm,
            TextureUsage::DEPTH_STENCIL_ATTACHMENT,
        );
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_spirv_parsing() {
        let bytes = spirv_words(&[SPIRV_MAGIC, 0x0001_0000, 0]);
        let desc = ShaderDescription::from_spirv_bytes(ShaderStages::VERTEX, &bytes).unwrap();
        assert_eq!(desc.code.len(), 3);
        assert_eq!(desc.entry_point, "main");

        assert!(ShaderDescription::from_spirv_bytes(ShaderStages::VERTEX, &bytes[..5]).is_err());
        let bad = spirv_words(&[0xdead_beef]);
        assert!(ShaderDescription::from_spirv_bytes(ShaderStages::FRAGMENT, &bad).is_err());
        assert!(ShaderDescription::from_spirv_bytes(ShaderStages::ALL_GRAPHICS, &bytes).is_err());
    }

    #[test]
    fn test_interleaved_layout_offsets() {
        let layout = VertexLayout::interleaved(&[Format::Rg32Float, Format::Rgb32Float]);
        assert_eq!(layout.bindings[0].stride, 20);
        assert_eq!(layout.attributes[1].offset, 8);
        assert_eq!(layout.attributes[1].location, 1);
    }

    #[test]
    fn test_duplicate_descriptor_binding_rejected() {
        let desc = DescriptorSetLayoutDescription {
            bindings: vec![
                DescriptorBinding::new(0, DescriptorType::UniformBuffer, ShaderStages::VERTEX),
                DescriptorBinding::new(0, DescriptorType::CombinedImageSampler, ShaderStages::FRAGMENT),
            ],
        };
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_clear_ignores_initial_layout() {
        let mut attachment = ColorAttachment::swapchain([0.0; 4]);
        attachment.initial_layout = ImageLayout::Present;
        assert_eq!(attachment.effective_initial_layout(), ImageLayout::Undefined);
        attachment.load_op = LoadOp::Load;
        assert_eq!(attachment.effective_initial_layout(), ImageLayout::Present);
    }

    #[test]
    fn test_range_end_rejects_overflow() {
        assert_eq!(range_end(8, 8, 16), Some(16));
        assert_eq!(range_end(8, 9, 16), None);
        assert_eq!(range_end(1, u64::MAX, u64::MAX), None);
        assert_eq!(range_end(u64::MAX, 0, u64::MAX), Some(u64::MAX));
    }

    #[test]
    fn test_buffer_copy_bounds() {
        let region = BufferCopy {
            src_offset: 4,
            dst_offset: 0,
            size: 12,
        };
        assert!(region.check(16, 12).is_ok());
        assert!(region.check(15, 12).is_err());
        assert!(region.check(16, 11).is_err());

        let wrapping = BufferCopy {
            src_offset: 1,
            dst_offset: 0,
            size: u64::MAX,
        };
        assert!(wrapping.check(u64::MAX, u64::MAX).is_err());
    }

    #[test]
    fn test_texture_copy_bounds() {
        let texture = TextureDescription::texture_2d(8, 4, Format::Rgba8Unorm, TextureUsage::TRANSFER_DST)
            .with_mip_levels(3);
        let whole = BufferTextureCopy::whole(&texture);
        assert!(whole.check(&texture, 128).is_ok());
        assert!(whole.check(&texture, 127).is_err());

        let mip = BufferTextureCopy {
            mip_level: 2,
            extent: [2, 1, 1],
            ..whole
        };
        assert!(mip.check(&texture, 8).is_ok());
        assert!(BufferTextureCopy { mip_level: 3, ..mip }.check(&texture, 8).is_err());
        assert!(BufferTextureCopy { mip_level: 40, ..mip }.check(&texture, 8).is_err());

        let far = BufferTextureCopy {
            texture_offset: [i32::MAX, 0, 0],
            extent: [u32::MAX, 1, 1],
            ..whole
        };
        assert!(far.check(&texture, u64::MAX).is_err());
        let huge = BufferTextureCopy {
            extent: [u32::MAX; 3],
            ..whole
        };
        assert!(huge.check(&texture, u64::MAX).is_err());
        assert!(TextureDescription::texture_2d(u32::MAX, u32::MAX, Format::Rgba32Float, TextureUsage::SAMPLED)
            .base_mip_bytes()
            .is_none());
    }
}
