//! Shader modules

use std::ffi::CString;

use ash::{vk, Device};

use crate::render::api::descriptions::ShaderDescription;
use crate::render::api::types::ShaderStages;
use crate::render::backends::vulkan::conversions::IntoVk;
use crate::render::backends::vulkan::resources::NativeResource;
use crate::render::error::{RalError, RalResult, VkResultExt};

/// SPIR-V module compiled for a single stage
pub struct VulkanShader {
    pub module: vk::ShaderModule,
    pub stage: ShaderStages,
    pub entry_point: CString,
}

impl VulkanShader {
    pub fn new(device: &Device, description: &ShaderDescription) -> RalResult<Self> {
        description.validate()?;
        let entry_point = CString::new(description.entry_point.as_str()).map_err(|_| {
            RalError::ResourceCreation(format!(
                "shader entry point {:?} contains a NUL byte",
                description.entry_point
            ))
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&description.code);
        let module = unsafe { device.create_shader_module(&create_info, None) }.call("vkCreateShaderModule")?;

        log::trace!(
            "Created {:?} shader module {module:?} ({} words)",
            description.stage,
            description.code.len()
        );

        Ok(Self {
            module,
            stage: description.stage,
            entry_point,
        })
    }

    /// Stage info referencing this module; borrows the entry point name
    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage.into_vk())
            .module(self.module)
            .name(&self.entry_point)
            .build()
    }
}

impl NativeResource for VulkanShader {
    const LABEL: &'static str = "shader";

    unsafe fn destroy(self, device: &Device, _allocator: &vk_mem::Allocator) {
        device.destroy_shader_module(self.module, None);
    }
}
