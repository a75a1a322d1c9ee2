//! Backend-agnostic enums and flag sets
//!
//! Every backend translates these into its own vocabulary. The enums derive
//! [`strum::EnumIter`] so translation tables can be checked exhaustively.

use bitflags::bitflags;
use strum::EnumIter;

bitflags! {
    /// How a buffer may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        /// Vertex attribute source
        const VERTEX_BUFFER = 1 << 0;
        /// Index source
        const INDEX_BUFFER = 1 << 1;
        /// Uniform block source
        const UNIFORM_BUFFER = 1 << 2;
        /// Shader storage
        const STORAGE_BUFFER = 1 << 3;
        /// Source of copies
        const TRANSFER_SRC = 1 << 4;
        /// Destination of copies
        const TRANSFER_DST = 1 << 5;
        /// Indirect draw/dispatch arguments
        const INDIRECT_BUFFER = 1 << 6;
    }
}

bitflags! {
    /// How a texture may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        /// Sampled from shaders
        const SAMPLED = 1 << 0;
        /// Read/written as a storage image
        const STORAGE = 1 << 1;
        /// Rendered to as a color attachment
        const COLOR_ATTACHMENT = 1 << 2;
        /// Rendered to as a depth/stencil attachment
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        /// Source of copies
        const TRANSFER_SRC = 1 << 4;
        /// Destination of copies
        const TRANSFER_DST = 1 << 5;
    }
}

bitflags! {
    /// Pipeline stages used by barriers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStage: u32 {
        /// Start of the pipeline
        const TOP_OF_PIPE = 1 << 0;
        /// Indirect argument fetch
        const DRAW_INDIRECT = 1 << 1;
        /// Vertex and index fetch
        const VERTEX_INPUT = 1 << 2;
        /// Vertex shading
        const VERTEX_SHADER = 1 << 3;
        /// Fragment shading
        const FRAGMENT_SHADER = 1 << 4;
        /// Depth/stencil tests before fragment shading
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        /// Depth/stencil tests after fragment shading
        const LATE_FRAGMENT_TESTS = 1 << 6;
        /// Color attachment writes and blending
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        /// Compute shading
        const COMPUTE_SHADER = 1 << 8;
        /// Copies and clears
        const TRANSFER = 1 << 9;
        /// End of the pipeline
        const BOTTOM_OF_PIPE = 1 << 10;
        /// Host reads and writes
        const HOST = 1 << 11;
        /// Every graphics stage
        const ALL_GRAPHICS = 1 << 12;
        /// Every stage
        const ALL_COMMANDS = 1 << 13;
    }
}

bitflags! {
    /// Memory access kinds used by barriers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Access: u32 {
        /// Indirect argument reads
        const INDIRECT_COMMAND_READ = 1 << 0;
        /// Index buffer reads
        const INDEX_READ = 1 << 1;
        /// Vertex buffer reads
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        /// Uniform buffer reads
        const UNIFORM_READ = 1 << 3;
        /// Any shader read
        const SHADER_READ = 1 << 4;
        /// Any shader write
        const SHADER_WRITE = 1 << 5;
        /// Color attachment reads (blending)
        const COLOR_ATTACHMENT_READ = 1 << 6;
        /// Color attachment writes
        const COLOR_ATTACHMENT_WRITE = 1 << 7;
        /// Depth/stencil reads
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 8;
        /// Depth/stencil writes
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 9;
        /// Copy reads
        const TRANSFER_READ = 1 << 10;
        /// Copy writes
        const TRANSFER_WRITE = 1 << 11;
        /// Host reads
        const HOST_READ = 1 << 12;
        /// Host writes
        const HOST_WRITE = 1 << 13;
        /// Any read
        const MEMORY_READ = 1 << 14;
        /// Any write
        const MEMORY_WRITE = 1 << 15;
    }
}

bitflags! {
    /// Shader stages
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u32 {
        /// Vertex stage
        const VERTEX = 1 << 0;
        /// Fragment stage
        const FRAGMENT = 1 << 1;
        /// Compute stage
        const COMPUTE = 1 << 2;
        /// Both graphics stages
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

/// Where buffer or texture memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum MemoryUsage {
    /// Device-local, not host visible
    #[default]
    GpuOnly,
    /// Host memory, mapped
    CpuOnly,
    /// Host-written every frame, read by the device
    CpuToGpu,
    /// Device-written, read back by the host
    GpuToCpu,
}

impl MemoryUsage {
    /// Whether the memory is persistently mapped
    pub fn is_host_visible(self) -> bool {
        !matches!(self, Self::GpuOnly)
    }
}

/// Texel and vertex attribute formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Format {
    /// Unknown or unsupported native format
    Undefined,
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Uint,
    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Float,
    D16Unorm,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

impl Format {
    /// Whether the format carries depth
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::D16Unorm | Self::D32Float | Self::D24UnormS8Uint | Self::D32FloatS8Uint
        )
    }

    /// Whether the format carries stencil
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32FloatS8Uint)
    }

    /// Size of one texel in bytes
    pub fn texel_size(self) -> u32 {
        match self {
            Self::Undefined => 0,
            Self::R8Unorm => 1,
            Self::Rg8Unorm | Self::R16Float | Self::D16Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8Srgb
            | Self::Bgra8Unorm
            | Self::Bgra8Srgb
            | Self::Rg16Float
            | Self::R32Uint
            | Self::R32Float
            | Self::D32Float
            | Self::D24UnormS8Uint => 4,
            Self::Rgba16Float | Self::Rg32Float | Self::D32FloatS8Uint => 8,
            Self::Rgb32Float => 12,
            Self::Rgba32Float => 16,
        }
    }
}

/// Texture layout, the abstract side of a layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum ImageLayout {
    /// Contents are discarded
    #[default]
    Undefined,
    /// Any use, not optimal for anything
    General,
    /// Color attachment writes
    ColorAttachment,
    /// Depth/stencil attachment writes
    DepthStencilAttachment,
    /// Depth/stencil reads
    DepthStencilReadOnly,
    /// Sampled reads
    ShaderReadOnly,
    /// Copy source
    TransferSrc,
    /// Copy destination
    TransferDst,
    /// Handed to the presentation engine
    Present,
}

/// Descriptor binding types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum DescriptorType {
    /// Uniform buffer
    UniformBuffer,
    /// Uniform buffer with a dynamic offset
    UniformBufferDynamic,
    /// Storage buffer
    StorageBuffer,
    /// Texture and sampler pair
    CombinedImageSampler,
    /// Texture without sampler
    SampledImage,
    /// Storage image
    StorageImage,
    /// Sampler without texture
    Sampler,
}

/// Primitive assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Rasterization fill mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

/// Face culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
    FrontAndBack,
}

/// Winding of front faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Blend equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Texel filter, also used for mip selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Out-of-range texture coordinate handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Index width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum IndexType {
    U16,
    #[default]
    U32,
}

impl IndexType {
    /// Size of one index in bytes
    pub fn size(self) -> u64 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Vertex binding step rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum VertexInputRate {
    #[default]
    Vertex,
    Instance,
}

/// Attachment load behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum LoadOp {
    Load,
    #[default]
    Clear,
    DontCare,
}

/// Attachment store behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

/// Which pipeline a bind targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum PipelineBindPoint {
    #[default]
    Graphics,
    Compute,
}

/// Viewport transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-extent viewport with the standard depth range
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    /// Build an extent
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Integer rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    /// Rectangle covering `extent` from the origin
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }
}

/// Clear value for one attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// RGBA color
    Color([f32; 4]),
    /// Depth and stencil
    DepthStencil {
        depth: f32,
        stencil: u32,
    },
}

impl Default for ClearValue {
    fn default() -> Self {
        Self::Color([0.0, 0.0, 0.0, 1.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_depth_formats() {
        let depth: Vec<Format> = Format::iter().filter(|f| f.is_depth()).collect();
        assert_eq!(depth.len(), 4);
        assert!(depth.iter().all(|f| f.texel_size() >= 2));
        assert!(Format::iter().filter(|f| f.has_stencil()).all(Format::is_depth));
    }

    #[test]
    fn test_texel_sizes() {
        assert_eq!(Format::Rgba8Srgb.texel_size(), 4);
        assert_eq!(Format::Rgb32Float.texel_size(), 12);
        assert!(Format::iter()
            .filter(|f| *f != Format::Undefined)
            .all(|f| f.texel_size() > 0));
    }

    #[test]
    fn test_host_visibility() {
        assert!(!MemoryUsage::GpuOnly.is_host_visible());
        assert!(MemoryUsage::CpuToGpu.is_host_visible());
    }

    #[test]
    fn test_flag_bits_are_disjoint() {
        let bits: Vec<u32> = PipelineStage::all().iter().map(|f| f.bits()).collect();
        assert_eq!(bits.len(), 14);
        assert!(bits.iter().all(|b| b.count_ones() == 1));
    }
}
