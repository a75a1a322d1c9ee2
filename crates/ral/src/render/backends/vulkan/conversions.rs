//! Translation between RAL types and `ash::vk`
//!
//! Enum conversions are exhaustive matches so a new variant fails to compile
//! until it is mapped. Flag conversions go through a per-bit table that the
//! tests check against `all()`.

use ash::vk;

use crate::render::api::types::{
    Access, AddressMode, BlendFactor, BlendOp, BufferUsage, ClearValue, CompareOp, CullMode,
    DescriptorType, Extent2D, Filter, Format, FrontFace, ImageLayout, IndexType, LoadOp,
    PipelineBindPoint, PipelineStage, PolygonMode, PrimitiveTopology, Rect2D, ShaderStages,
    StoreOp, TextureUsage, VertexInputRate, Viewport,
};

/// Convert a RAL value into its Vulkan counterpart
///
/// A local trait keeps `.into_vk()` available on foreign `vk` targets.
pub trait IntoVk<T> {
    /// Consume self and produce the Vulkan value
    fn into_vk(self) -> T;
}

macro_rules! flag_table {
    ($ral:ty => $vk:ty, $table:ident: [$(($from:ident, $to:ident)),+ $(,)?]) => {
        const $table: &[($ral, $vk)] = &[$((<$ral>::$from, <$vk>::$to)),+];

        impl IntoVk<$vk> for $ral {
            fn into_vk(self) -> $vk {
                $table
                    .iter()
                    .filter(|(flag, _)| self.contains(*flag))
                    .fold(<$vk>::empty(), |acc, (_, native)| acc | *native)
            }
        }
    };
}

flag_table!(BufferUsage => vk::BufferUsageFlags, BUFFER_USAGE: [
    (VERTEX_BUFFER, VERTEX_BUFFER),
    (INDEX_BUFFER, INDEX_BUFFER),
    (UNIFORM_BUFFER, UNIFORM_BUFFER),
    (STORAGE_BUFFER, STORAGE_BUFFER),
    (TRANSFER_SRC, TRANSFER_SRC),
    (TRANSFER_DST, TRANSFER_DST),
    (INDIRECT_BUFFER, INDIRECT_BUFFER),
]);

flag_table!(TextureUsage => vk::ImageUsageFlags, TEXTURE_USAGE: [
    (SAMPLED, SAMPLED),
    (STORAGE, STORAGE),
    (COLOR_ATTACHMENT, COLOR_ATTACHMENT),
    (DEPTH_STENCIL_ATTACHMENT, DEPTH_STENCIL_ATTACHMENT),
    (TRANSFER_SRC, TRANSFER_SRC),
    (TRANSFER_DST, TRANSFER_DST),
]);

flag_table!(PipelineStage => vk::PipelineStageFlags, PIPELINE_STAGE: [
    (TOP_OF_PIPE, TOP_OF_PIPE),
    (DRAW_INDIRECT, DRAW_INDIRECT),
    (VERTEX_INPUT, VERTEX_INPUT),
    (VERTEX_SHADER, VERTEX_SHADER),
    (FRAGMENT_SHADER, FRAGMENT_SHADER),
    (EARLY_FRAGMENT_TESTS, EARLY_FRAGMENT_TESTS),
    (LATE_FRAGMENT_TESTS, LATE_FRAGMENT_TESTS),
    (COLOR_ATTACHMENT_OUTPUT, COLOR_ATTACHMENT_OUTPUT),
    (COMPUTE_SHADER, COMPUTE_SHADER),
    (TRANSFER, TRANSFER),
    (BOTTOM_OF_PIPE, BOTTOM_OF_PIPE),
    (HOST, HOST),
    (ALL_GRAPHICS, ALL_GRAPHICS),
    (ALL_COMMANDS, ALL_COMMANDS),
]);

flag_table!(Access => vk::AccessFlags, ACCESS: [
    (INDIRECT_COMMAND_READ, INDIRECT_COMMAND_READ),
    (INDEX_READ, INDEX_READ),
    (VERTEX_ATTRIBUTE_READ, VERTEX_ATTRIBUTE_READ),
    (UNIFORM_READ, UNIFORM_READ),
    (SHADER_READ, SHADER_READ),
    (SHADER_WRITE, SHADER_WRITE),
    (COLOR_ATTACHMENT_READ, COLOR_ATTACHMENT_READ),
    (COLOR_ATTACHMENT_WRITE, COLOR_ATTACHMENT_WRITE),
    (DEPTH_STENCIL_ATTACHMENT_READ, DEPTH_STENCIL_ATTACHMENT_READ),
    (DEPTH_STENCIL_ATTACHMENT_WRITE, DEPTH_STENCIL_ATTACHMENT_WRITE),
    (TRANSFER_READ, TRANSFER_READ),
    (TRANSFER_WRITE, TRANSFER_WRITE),
    (HOST_READ, HOST_READ),
    (HOST_WRITE, HOST_WRITE),
    (MEMORY_READ, MEMORY_READ),
    (MEMORY_WRITE, MEMORY_WRITE),
]);

flag_table!(ShaderStages => vk::ShaderStageFlags, SHADER_STAGE: [
    (VERTEX, VERTEX),
    (FRAGMENT, FRAGMENT),
    (COMPUTE, COMPUTE),
]);

impl IntoVk<vk::Format> for Format {
    fn into_vk(self) -> vk::Format {
        match self {
            Format::Undefined => vk::Format::UNDEFINED,
            Format::R8Unorm => vk::Format::R8_UNORM,
            Format::Rg8Unorm => vk::Format::R8G8_UNORM,
            Format::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Format::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            Format::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            Format::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            Format::R16Float => vk::Format::R16_SFLOAT,
            Format::Rg16Float => vk::Format::R16G16_SFLOAT,
            Format::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
            Format::R32Uint => vk::Format::R32_UINT,
            Format::R32Float => vk::Format::R32_SFLOAT,
            Format::Rg32Float => vk::Format::R32G32_SFLOAT,
            Format::Rgb32Float => vk::Format::R32G32B32_SFLOAT,
            Format::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
            Format::D16Unorm => vk::Format::D16_UNORM,
            Format::D32Float => vk::Format::D32_SFLOAT,
            Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            Format::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        }
    }
}

/// Reverse format lookup; formats the RAL does not name map to `Undefined`
pub fn format_from_vk(format: vk::Format) -> Format {
    match format {
        vk::Format::R8_UNORM => Format::R8Unorm,
        vk::Format::R8G8_UNORM => Format::Rg8Unorm,
        vk::Format::R8G8B8A8_UNORM => Format::Rgba8Unorm,
        vk::Format::R8G8B8A8_SRGB => Format::Rgba8Srgb,
        vk::Format::B8G8R8A8_UNORM => Format::Bgra8Unorm,
        vk::Format::B8G8R8A8_SRGB => Format::Bgra8Srgb,
        vk::Format::R16_SFLOAT => Format::R16Float,
        vk::Format::R16G16_SFLOAT => Format::Rg16Float,
        vk::Format::R16G16B16A16_SFLOAT => Format::Rgba16Float,
        vk::Format::R32_UINT => Format::R32Uint,
        vk::Format::R32_SFLOAT => Format::R32Float,
        vk::Format::R32G32_SFLOAT => Format::Rg32Float,
        vk::Format::R32G32B32_SFLOAT => Format::Rgb32Float,
        vk::Format::R32G32B32A32_SFLOAT => Format::Rgba32Float,
        vk::Format::D16_UNORM => Format::D16Unorm,
        vk::Format::D32_SFLOAT => Format::D32Float,
        vk::Format::D24_UNORM_S8_UINT => Format::D24UnormS8Uint,
        vk::Format::D32_SFLOAT_S8_UINT => Format::D32FloatS8Uint,
        _ => Format::Undefined,
    }
}

/// Aspect covered by views and barriers of a texture in `format`
pub fn aspect_mask(format: Format) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

impl IntoVk<vk::ImageLayout> for ImageLayout {
    fn into_vk(self) -> vk::ImageLayout {
        match self {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::General => vk::ImageLayout::GENERAL,
            ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

impl IntoVk<vk::DescriptorType> for DescriptorType {
    fn into_vk(self) -> vk::DescriptorType {
        match self {
            DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorType::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        }
    }
}

impl IntoVk<vk::PrimitiveTopology> for PrimitiveTopology {
    fn into_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

impl IntoVk<vk::PolygonMode> for PolygonMode {
    fn into_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
            PolygonMode::Point => vk::PolygonMode::POINT,
        }
    }
}

impl IntoVk<vk::CullModeFlags> for CullMode {
    fn into_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
        }
    }
}

impl IntoVk<vk::FrontFace> for FrontFace {
    fn into_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

impl IntoVk<vk::CompareOp> for CompareOp {
    fn into_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

impl IntoVk<vk::BlendFactor> for BlendFactor {
    fn into_vk(self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
            BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        }
    }
}

impl IntoVk<vk::BlendOp> for BlendOp {
    fn into_vk(self) -> vk::BlendOp {
        match self {
            BlendOp::Add => vk::BlendOp::ADD,
            BlendOp::Subtract => vk::BlendOp::SUBTRACT,
            BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
            BlendOp::Min => vk::BlendOp::MIN,
            BlendOp::Max => vk::BlendOp::MAX,
        }
    }
}

impl IntoVk<vk::Filter> for Filter {
    fn into_vk(self) -> vk::Filter {
        match self {
            Filter::Nearest => vk::Filter::NEAREST,
            Filter::Linear => vk::Filter::LINEAR,
        }
    }
}

impl IntoVk<vk::SamplerMipmapMode> for Filter {
    fn into_vk(self) -> vk::SamplerMipmapMode {
        match self {
            Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
            Filter::Linear => vk::SamplerMipmapMode::LINEAR,
        }
    }
}

impl IntoVk<vk::SamplerAddressMode> for AddressMode {
    fn into_vk(self) -> vk::SamplerAddressMode {
        match self {
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }
}

impl IntoVk<vk::IndexType> for IndexType {
    fn into_vk(self) -> vk::IndexType {
        match self {
            IndexType::U16 => vk::IndexType::UINT16,
            IndexType::U32 => vk::IndexType::UINT32,
        }
    }
}

impl IntoVk<vk::VertexInputRate> for VertexInputRate {
    fn into_vk(self) -> vk::VertexInputRate {
        match self {
            VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
            VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
        }
    }
}

impl IntoVk<vk::AttachmentLoadOp> for LoadOp {
    fn into_vk(self) -> vk::AttachmentLoadOp {
        match self {
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

impl IntoVk<vk::AttachmentStoreOp> for StoreOp {
    fn into_vk(self) -> vk::AttachmentStoreOp {
        match self {
            StoreOp::Store => vk::AttachmentStoreOp::STORE,
            StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

impl IntoVk<vk::PipelineBindPoint> for PipelineBindPoint {
    fn into_vk(self) -> vk::PipelineBindPoint {
        match self {
            PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
        }
    }
}

impl IntoVk<vk::Extent2D> for Extent2D {
    fn into_vk(self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

impl IntoVk<vk::Rect2D> for Rect2D {
    fn into_vk(self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: self.x, y: self.y },
            extent: vk::Extent2D {
                width: self.width,
                height: self.height,
            },
        }
    }
}

impl IntoVk<vk::Viewport> for Viewport {
    fn into_vk(self) -> vk::Viewport {
        vk::Viewport {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
        }
    }
}

impl IntoVk<vk::ClearValue> for ClearValue {
    fn into_vk(self) -> vk::ClearValue {
        match self {
            ClearValue::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// Back to RAL extent from a surface extent
pub fn extent_from_vk(extent: vk::Extent2D) -> Extent2D {
    Extent2D::new(extent.width, extent.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::hash::Hash;
    use strum::IntoEnumIterator;

    fn assert_injective<E, T>(name: &str)
    where
        E: IntoEnumIterator + IntoVk<T> + Copy + std::fmt::Debug,
        T: Eq + Hash,
    {
        let mut seen: HashSet<T> = HashSet::new();
        for value in E::iter() {
            let native: T = value.into_vk();
            assert!(seen.insert(native), "{name}: {value:?} collides with another variant");
        }
    }

    #[test]
    fn test_enum_conversions_are_injective() {
        assert_injective::<Format, vk::Format>("format");
        assert_injective::<ImageLayout, vk::ImageLayout>("image layout");
        assert_injective::<DescriptorType, vk::DescriptorType>("descriptor type");
        assert_injective::<PrimitiveTopology, vk::PrimitiveTopology>("topology");
        assert_injective::<PolygonMode, vk::PolygonMode>("polygon mode");
        assert_injective::<CullMode, vk::CullModeFlags>("cull mode");
        assert_injective::<CompareOp, vk::CompareOp>("compare op");
        assert_injective::<BlendFactor, vk::BlendFactor>("blend factor");
        assert_injective::<BlendOp, vk::BlendOp>("blend op");
        assert_injective::<AddressMode, vk::SamplerAddressMode>("address mode");
        assert_injective::<LoadOp, vk::AttachmentLoadOp>("load op");
    }

    #[test]
    fn test_format_round_trip() {
        for format in Format::iter() {
            assert_eq!(format_from_vk(format.into_vk()), format);
        }
        assert_eq!(format_from_vk(vk::Format::BC7_SRGB_BLOCK), Format::Undefined);
    }

    #[test]
    fn test_flag_tables_cover_every_bit() {
        assert_eq!(BUFFER_USAGE.len(), BufferUsage::all().iter().count());
        assert_eq!(TEXTURE_USAGE.len(), TextureUsage::all().iter().count());
        assert_eq!(PIPELINE_STAGE.len(), PipelineStage::all().iter().count());
        assert_eq!(ACCESS.len(), Access::all().iter().count());

        for flag in Access::all().iter() {
            let native: vk::AccessFlags = flag.into_vk();
            assert_eq!(native.as_raw().count_ones(), 1, "{flag:?}");
        }
        for flag in PipelineStage::all().iter() {
            let native: vk::PipelineStageFlags = flag.into_vk();
            assert_eq!(native.as_raw().count_ones(), 1, "{flag:?}");
        }
    }

    #[test]
    fn test_flag_unions_translate_bitwise() {
        let usage = BufferUsage::VERTEX_BUFFER | BufferUsage::TRANSFER_DST;
        let native: vk::BufferUsageFlags = usage.into_vk();
        assert_eq!(native, vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST);

        let stages: vk::ShaderStageFlags = ShaderStages::ALL_GRAPHICS.into_vk();
        assert_eq!(stages, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);

        let empty: vk::AccessFlags = Access::empty().into_vk();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_aspect_masks() {
        assert_eq!(aspect_mask(Format::Rgba8Unorm), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_mask(Format::D32Float), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_mask(Format::D24UnormS8Uint),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
