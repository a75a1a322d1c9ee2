//! Native resources of the Vulkan backend
//!
//! Every resource kind wraps its Vulkan objects in a plain struct stored in
//! the [`ResourcesDatabase`](crate::render::api::ResourcesDatabase). Nothing
//! here destroys itself on drop: destruction goes through
//! [`NativeResource::destroy`], called either from a frame's deletion queue
//! or at device teardown.

pub mod allocator;
pub mod buffer;
pub mod descriptor;
pub mod sampler;
pub mod texture;

pub use allocator::{allocation_create_info, create_allocator};
pub use buffer::VulkanBuffer;
pub use descriptor::{write_descriptor_set, DescriptorAllocator, VulkanDescriptorSet, VulkanDescriptorSetLayout};
pub use sampler::VulkanSampler;
pub use texture::VulkanTexture;

use ash::Device;

use crate::render::api::resources_database::ResourceTypes;
use crate::render::backends::vulkan::rendering::{VulkanPipeline, VulkanShader};

/// A native object that must be explicitly destroyed
pub trait NativeResource {
    /// Kind name used in deletion logs
    const LABEL: &'static str;

    /// Release the native objects
    ///
    /// # Safety
    ///
    /// The GPU must no longer reference the resource, and `device` and
    /// `allocator` must be the ones it was created with.
    unsafe fn destroy(self, device: &Device, allocator: &vk_mem::Allocator);
}

/// Resource representation of the Vulkan backend
pub struct VulkanResources;

impl ResourceTypes for VulkanResources {
    type Buffer = VulkanBuffer;
    type Texture = VulkanTexture;
    type Shader = VulkanShader;
    type Pipeline = VulkanPipeline;
    type DescriptorSet = VulkanDescriptorSet;
    type DescriptorSetLayout = VulkanDescriptorSetLayout;
    type Sampler = VulkanSampler;
}
