//! State shared between the Vulkan device and its command buffers

use std::cell::RefCell;
use std::rc::Rc;

use ash::{vk, Device};

use crate::render::api::resources_database::ResourcesDatabase;
use crate::render::backends::vulkan::rendering::RenderPassCache;
use crate::render::backends::vulkan::resources::VulkanResources;

/// Swapchain image acquired for the frame being recorded
#[derive(Debug, Clone, Copy)]
pub struct SwapchainTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    /// Layout the last recorded render pass left the image in
    pub layout: vk::ImageLayout,
}

pub struct VulkanShared {
    pub resources: ResourcesDatabase<VulkanResources>,
    pub render_passes: RenderPassCache,
    pub swapchain_target: Option<SwapchainTarget>,
    /// Framebuffers created while recording, released with their frame
    pub transient_framebuffers: Vec<vk::Framebuffer>,
}

impl VulkanShared {
    pub fn new(device: Device) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            resources: ResourcesDatabase::new(),
            render_passes: RenderPassCache::new(device),
            swapchain_target: None,
            transient_framebuffers: Vec::new(),
        }))
    }
}
