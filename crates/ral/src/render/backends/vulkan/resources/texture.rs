//! Textures: image, default view and allocation

use ash::{vk, Device};
use vk_mem::Alloc;

use crate::render::api::descriptions::TextureDescription;
use crate::render::api::types::MemoryUsage;
use crate::render::backends::vulkan::conversions::{aspect_mask, IntoVk};
use crate::render::error::{RalError, RalResult, VkResultExt};

use super::allocator::allocation_create_info;
use super::NativeResource;

pub struct VulkanTexture {
    pub image: vk::Image,
    /// View over every mip level, used for sampling and attachments
    pub view: vk::ImageView,
    pub allocation: vk_mem::Allocation,
    pub description: TextureDescription,
}

impl VulkanTexture {
    pub fn new(device: &Device, allocator: &vk_mem::Allocator, description: &TextureDescription) -> RalResult<Self> {
        description.validate()?;

        let (image_type, view_type) = if description.depth > 1 {
            (vk::ImageType::TYPE_3D, vk::ImageViewType::TYPE_3D)
        } else {
            (vk::ImageType::TYPE_2D, vk::ImageViewType::TYPE_2D)
        };
        let format: vk::Format = description.format.into_vk();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(image_type)
            .format(format)
            .extent(vk::Extent3D {
                width: description.width,
                height: description.height,
                depth: description.depth,
            })
            .mip_levels(description.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(description.usage.into_vk())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_info = allocation_create_info(MemoryUsage::GpuOnly);

        let (image, mut allocation) =
            unsafe { allocator.create_image(&image_info, &alloc_info) }.call("vmaCreateImage")?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(view_type)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(description.format),
                base_mip_level: 0,
                level_count: description.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = match unsafe { device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(code) => {
                unsafe { allocator.destroy_image(image, &mut allocation) };
                return Err(RalError::device("vkCreateImageView", code));
            }
        };

        log::trace!(
            "Created texture {image:?}: {}x{}x{} {:?}, {} mips",
            description.width,
            description.height,
            description.depth,
            description.format,
            description.mip_levels
        );

        Ok(Self {
            image,
            view,
            allocation,
            description: description.clone(),
        })
    }

    /// Subresource range covering every mip level
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: aspect_mask(self.description.format),
            base_mip_level: 0,
            level_count: self.description.mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

impl NativeResource for VulkanTexture {
    const LABEL: &'static str = "texture";

    unsafe fn destroy(mut self, device: &Device, allocator: &vk_mem::Allocator) {
        device.destroy_image_view(self.view, None);
        allocator.destroy_image(self.image, &mut self.allocation);
    }
}
