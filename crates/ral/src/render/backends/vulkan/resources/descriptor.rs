//! Descriptor set layouts, pooled set allocation and set writes

use ash::{vk, Device};

use crate::render::api::descriptions::{
    DescriptorBinding, DescriptorResource, DescriptorSetLayoutDescription, DescriptorWrite,
};
use crate::render::api::handle::DescriptorSetLayoutHandle;
use crate::render::api::resources_database::ResourcesDatabase;
use crate::render::api::types::DescriptorType;
use crate::render::backends::vulkan::conversions::IntoVk;
use crate::render::error::{RalError, RalResult, VkResultExt};

use super::{NativeResource, VulkanResources};

/// Sets each pool can hold before another pool is created
const SETS_PER_POOL: u32 = 256;

const POOL_SIZES: [(vk::DescriptorType, u32); 7] = [
    (vk::DescriptorType::UNIFORM_BUFFER, 4),
    (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1),
    (vk::DescriptorType::STORAGE_BUFFER, 2),
    (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4),
    (vk::DescriptorType::SAMPLED_IMAGE, 1),
    (vk::DescriptorType::STORAGE_IMAGE, 1),
    (vk::DescriptorType::SAMPLER, 1),
];

pub struct VulkanDescriptorSetLayout {
    pub layout: vk::DescriptorSetLayout,
    pub description: DescriptorSetLayoutDescription,
}

impl VulkanDescriptorSetLayout {
    pub fn new(device: &Device, description: &DescriptorSetLayoutDescription) -> RalResult<Self> {
        description.validate()?;

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = description
            .bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.binding)
                    .descriptor_type(binding.descriptor_type.into_vk())
                    .descriptor_count(binding.count)
                    .stage_flags(binding.stages.into_vk())
                    .build()
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout =
            unsafe { device.create_descriptor_set_layout(&create_info, None) }.call("vkCreateDescriptorSetLayout")?;

        Ok(Self {
            layout,
            description: description.clone(),
        })
    }
}

impl NativeResource for VulkanDescriptorSetLayout {
    const LABEL: &'static str = "descriptor set layout";

    unsafe fn destroy(self, device: &Device, _allocator: &vk_mem::Allocator) {
        device.destroy_descriptor_set_layout(self.layout, None);
    }
}

pub struct VulkanDescriptorSet {
    pub set: vk::DescriptorSet,
    /// Pool the set was allocated from and is returned to
    pub pool: vk::DescriptorPool,
    pub layout: DescriptorSetLayoutHandle,
}

impl NativeResource for VulkanDescriptorSet {
    const LABEL: &'static str = "descriptor set";

    unsafe fn destroy(self, device: &Device, _allocator: &vk_mem::Allocator) {
        if let Err(code) = device.free_descriptor_sets(self.pool, &[self.set]) {
            log::warn!("vkFreeDescriptorSets failed: {code:?}");
        }
    }
}

/// Growable list of descriptor pools
///
/// Sets are allocated from the newest pool; when it is exhausted a new one
/// is created. Pools are only destroyed with the allocator.
pub struct DescriptorAllocator {
    device: Device,
    pools: Vec<vk::DescriptorPool>,
}

impl DescriptorAllocator {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            pools: Vec::new(),
        }
    }

    fn create_pool(&mut self) -> RalResult<vk::DescriptorPool> {
        let sizes: Vec<vk::DescriptorPoolSize> = POOL_SIZES
            .iter()
            .map(|&(ty, per_set)| vk::DescriptorPoolSize {
                ty,
                descriptor_count: per_set * SETS_PER_POOL,
            })
            .collect();

        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(SETS_PER_POOL)
            .pool_sizes(&sizes);
        let pool = unsafe { self.device.create_descriptor_pool(&create_info, None) }.call("vkCreateDescriptorPool")?;

        log::debug!("Descriptor pool {} created", self.pools.len());
        self.pools.push(pool);
        Ok(pool)
    }

    fn allocate_from(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> ash::prelude::VkResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map(|sets| sets[0])
    }

    /// Allocate one set with `layout`, growing the pool list when needed
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> RalResult<(vk::DescriptorSet, vk::DescriptorPool)> {
        let pool = match self.pools.last() {
            Some(&pool) => pool,
            None => self.create_pool()?,
        };

        match self.allocate_from(pool, layout) {
            Ok(set) => Ok((set, pool)),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                let pool = self.create_pool()?;
                let set = self.allocate_from(pool, layout).call("vkAllocateDescriptorSets")?;
                Ok((set, pool))
            }
            Err(code) => Err(RalError::device("vkAllocateDescriptorSets", code)),
        }
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        unsafe {
            for pool in self.pools.drain(..) {
                self.device.destroy_descriptor_pool(pool, None);
            }
        }
    }
}

enum DescriptorInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

/// Validate `writes` against `bindings` and apply them to `set`
pub fn write_descriptor_set(
    device: &Device,
    resources: &ResourcesDatabase<VulkanResources>,
    set: vk::DescriptorSet,
    bindings: &[DescriptorBinding],
    writes: &[DescriptorWrite],
) -> RalResult<()> {
    resources.validate_descriptor_writes(bindings, writes)?;

    let mut infos = Vec::with_capacity(writes.len());
    for write in writes {
        let descriptor_type = bindings
            .iter()
            .find(|binding| binding.binding == write.binding)
            .map(|binding| binding.descriptor_type)
            .ok_or_else(|| RalError::invalid_operation(format!("layout has no binding {}", write.binding)))?;

        let info = match write.resource {
            DescriptorResource::Buffer { buffer, offset, range } => {
                DescriptorInfo::Buffer(vk::DescriptorBufferInfo {
                    buffer: resources.get_buffer(buffer)?.buffer,
                    offset,
                    range: range.unwrap_or(vk::WHOLE_SIZE),
                })
            }
            DescriptorResource::Texture { texture, sampler } => {
                let image_layout = if descriptor_type == DescriptorType::StorageImage {
                    vk::ImageLayout::GENERAL
                } else {
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                };
                let sampler = match sampler {
                    Some(sampler) => resources.get_sampler(sampler)?.sampler,
                    None => vk::Sampler::null(),
                };
                DescriptorInfo::Image(vk::DescriptorImageInfo {
                    sampler,
                    image_view: resources.get_texture(texture)?.view,
                    image_layout,
                })
            }
            DescriptorResource::Sampler(sampler) => DescriptorInfo::Image(vk::DescriptorImageInfo {
                sampler: resources.get_sampler(sampler)?.sampler,
                image_view: vk::ImageView::null(),
                image_layout: vk::ImageLayout::UNDEFINED,
            }),
        };
        infos.push((write.binding, descriptor_type, info));
    }

    let native_writes: Vec<vk::WriteDescriptorSet> = infos
        .iter()
        .map(|(binding, descriptor_type, info)| {
            let write = vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type((*descriptor_type).into_vk());
            match info {
                DescriptorInfo::Buffer(buffer) => write.buffer_info(std::slice::from_ref(buffer)).build(),
                DescriptorInfo::Image(image) => write.image_info(std::slice::from_ref(image)).build(),
            }
        })
        .collect();

    unsafe { device.update_descriptor_sets(&native_writes, &[]) };
    Ok(())
}
