//! Presentation surface

use ash::extensions::khr;
use ash::vk;

use crate::render::error::{RalResult, VkResultExt};
use crate::render::window::Window;

use super::context::VulkanInstance;

/// Window surface and the loader used to query it
pub struct Surface {
    loader: khr::Surface,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Create a surface for `window` through GLFW
    pub fn new(instance: &VulkanInstance, window: &mut Window) -> RalResult<Self> {
        let loader = khr::Surface::new(&instance.entry, &instance.instance);
        let surface = window.create_vulkan_surface(instance.instance.handle())?;
        Ok(Self { loader, surface })
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> RalResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
        }
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> RalResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .call("vkGetPhysicalDeviceSurfaceFormatsKHR")
        }
    }

    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> RalResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .call("vkGetPhysicalDeviceSurfacePresentModesKHR")
        }
    }

    /// Whether queue family `queue_family_index` can present here
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family_index: u32) -> RalResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.surface)
                .call("vkGetPhysicalDeviceSurfaceSupportKHR")
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}
