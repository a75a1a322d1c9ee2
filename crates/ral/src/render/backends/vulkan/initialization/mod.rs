//! Vulkan bootstrap: instance, surface, GPU selection and logical device

pub mod context;
pub mod surface;

pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanInstance};
pub use surface::Surface;
