//! Swapchain creation and recreation
//!
//! The selection rules (format, present mode, extent, image count) are free
//! functions so they can be checked without a surface.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::core::config::SwapchainConfig;
use crate::render::error::{RalError, RalResult, VkResultExt};

use crate::render::backends::vulkan::initialization::{PhysicalDeviceInfo, Surface};

/// Pick the surface format, preferring BGRA8 in sRGB when asked to
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR], prefer_srgb: bool) -> Option<vk::SurfaceFormatKHR> {
    let wanted = if prefer_srgb {
        vk::Format::B8G8R8A8_SRGB
    } else {
        vk::Format::B8G8R8A8_UNORM
    };

    available
        .iter()
        .find(|sf| sf.format == wanted && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| available.iter().find(|sf| sf.format == wanted))
        .or_else(|| available.first())
        .copied()
}

/// MAILBOX when preferred and offered, FIFO otherwise (always supported)
pub fn choose_present_mode(available: &[vk::PresentModeKHR], prefer_mailbox: bool) -> vk::PresentModeKHR {
    if prefer_mailbox && available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's extent if it dictates one, else `requested` clamped to its limits
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested
            .width
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: requested
            .height
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

/// One image above the minimum, capped by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Swapchain with one view per image
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Build a swapchain for `surface`
    ///
    /// Passing the previous handle as `old_swapchain` lets the driver hand
    /// over resources; the caller still drops the old [`Swapchain`].
    pub fn new(
        device: Device,
        loader: SwapchainLoader,
        surface: &Surface,
        physical: &PhysicalDeviceInfo,
        extent: vk::Extent2D,
        config: &SwapchainConfig,
        old_swapchain: vk::SwapchainKHR,
    ) -> RalResult<Self> {
        let capabilities = surface.capabilities(physical.device)?;
        let formats = surface.formats(physical.device)?;
        let present_modes = surface.present_modes(physical.device)?;

        let format = choose_surface_format(&formats, config.prefer_srgb).ok_or_else(|| {
            RalError::Initialization("surface reports no formats".to_string())
        })?;
        let present_mode = choose_present_mode(&present_modes, config.prefer_mailbox);
        let image_count = choose_image_count(&capabilities);

        let queue_families = [physical.graphics_family, physical.present_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);
        create_info = if physical.graphics_family == physical.present_family {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        };

        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }.call("vkCreateSwapchainKHR")?;

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(code) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(RalError::device("vkGetSwapchainImagesKHR", code));
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            match unsafe { device.create_image_view(&view_info, None) } {
                Ok(view) => image_views.push(view),
                Err(code) => {
                    unsafe {
                        for view in image_views {
                            device.destroy_image_view(view, None);
                        }
                        loader.destroy_swapchain(swapchain, None);
                    }
                    return Err(RalError::device("vkCreateImageView", code));
                }
            }
        }

        log::info!(
            "Swapchain created: {}x{} {:?} {:?}, {} images",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            images.len()
        );

        Ok(Self {
            device,
            loader,
            swapchain,
            images,
            image_views,
            format,
            extent,
        })
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn loader(&self) -> &SwapchainLoader {
        &self.loader
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    pub fn image_view(&self, index: u32) -> vk::ImageView {
        self.image_views[index as usize]
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn capabilities(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_format_prefers_srgb() {
        let available = [surface_format(vk::Format::R8G8B8A8_UNORM), surface_format(vk::Format::B8G8R8A8_SRGB)];
        assert_eq!(choose_surface_format(&available, true).unwrap().format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(choose_surface_format(&available, false).unwrap().format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[], true).is_none());
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO], true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_extent_follows_surface_or_clamps() {
        let requested = vk::Extent2D {
            width: 8000,
            height: 600,
        };
        let fixed = capabilities((800, 600), 2, 3);
        assert_eq!(choose_extent(&fixed, requested).width, 800);

        let free = capabilities((u32::MAX, u32::MAX), 2, 3);
        let extent = choose_extent(&free, requested);
        assert_eq!((extent.width, extent.height), (4096, 600));
    }

    #[test]
    fn test_image_count_respects_maximum() {
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 2)), 2);
    }
}
