//! Samplers

use ash::{vk, Device};

use crate::render::api::descriptions::SamplerDescription;
use crate::render::backends::vulkan::conversions::IntoVk;
use crate::render::error::{RalError, RalResult, VkResultExt};

use super::NativeResource;

pub struct VulkanSampler {
    pub sampler: vk::Sampler,
    pub description: SamplerDescription,
}

impl VulkanSampler {
    /// Create a sampler; anisotropy is clamped to `max_anisotropy` and
    /// dropped entirely when the device feature is off (`None`)
    pub fn new(device: &Device, description: &SamplerDescription, max_anisotropy: Option<f32>) -> RalResult<Self> {
        if description.min_lod > description.max_lod {
            return Err(RalError::ResourceCreation(format!(
                "sampler lod range {}..{} is inverted",
                description.min_lod, description.max_lod
            )));
        }

        let anisotropy = match (description.max_anisotropy, max_anisotropy) {
            (Some(requested), Some(limit)) => Some(requested.clamp(1.0, limit)),
            (Some(_), None) => {
                log::warn!("Anisotropic filtering requested but not enabled on this device");
                None
            }
            (None, _) => None,
        };

        let [u, v, w] = description.address_mode;
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(description.mag_filter.into_vk())
            .min_filter(description.min_filter.into_vk())
            .mipmap_mode(description.mipmap_filter.into_vk())
            .address_mode_u(u.into_vk())
            .address_mode_v(v.into_vk())
            .address_mode_w(w.into_vk())
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .compare_enable(description.compare_op.is_some())
            .compare_op(description.compare_op.map_or(vk::CompareOp::ALWAYS, |op| op.into_vk()))
            .min_lod(description.min_lod)
            .max_lod(description.max_lod)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { device.create_sampler(&create_info, None) }.call("vkCreateSampler")?;

        Ok(Self {
            sampler,
            description: *description,
        })
    }
}

impl NativeResource for VulkanSampler {
    const LABEL: &'static str = "sampler";

    unsafe fn destroy(self, device: &Device, _allocator: &vk_mem::Allocator) {
        device.destroy_sampler(self.sampler, None);
    }
}
