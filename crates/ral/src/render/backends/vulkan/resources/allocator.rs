//! Device memory through VMA

use ash::vk;

use crate::render::api::types::MemoryUsage;
use crate::render::error::{RalResult, VkResultExt};

/// Create the allocator every buffer and texture is placed with
pub fn create_allocator(
    instance: &ash::Instance,
    device: &ash::Device,
    physical_device: vk::PhysicalDevice,
) -> RalResult<vk_mem::Allocator> {
    vk_mem::Allocator::new(vk_mem::AllocatorCreateInfo::new(instance, device, physical_device))
        .call("vmaCreateAllocator")
}

/// Allocation parameters for a RAL memory usage
///
/// Host-visible usages require coherent memory so writes through the
/// persistent mapping need no explicit flush.
pub fn allocation_create_info(memory_usage: MemoryUsage) -> vk_mem::AllocationCreateInfo {
    let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

    match memory_usage {
        MemoryUsage::GpuOnly => vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: vk_mem::AllocationCreateFlags::empty(),
            ..Default::default()
        },
        MemoryUsage::CpuOnly => vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferHost,
            flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            required_flags: host,
            ..Default::default()
        },
        MemoryUsage::CpuToGpu => vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::Auto,
            flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            required_flags: host,
            ..Default::default()
        },
        MemoryUsage::GpuToCpu => vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferHost,
            flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
            required_flags: host,
            preferred_flags: vk::MemoryPropertyFlags::HOST_CACHED,
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_host_visible_usages_require_coherent_memory() {
        for usage in MemoryUsage::iter() {
            let info = allocation_create_info(usage);
            assert_eq!(
                info.required_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE),
                usage.is_host_visible(),
                "{usage:?}"
            );
            if usage.is_host_visible() {
                assert!(info.required_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
                assert!(!info.flags.is_empty());
            }
        }
    }

    #[test]
    fn test_readback_prefers_cached_memory() {
        let info = allocation_create_info(MemoryUsage::GpuToCpu);
        assert!(info.preferred_flags.contains(vk::MemoryPropertyFlags::HOST_CACHED));
        assert!(info.flags.contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM));
    }
}
