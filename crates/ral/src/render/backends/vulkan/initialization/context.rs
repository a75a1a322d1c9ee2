//! Instance, physical device and logical device
//!
//! Each wrapper owns its native object and destroys it on drop. Drop order
//! is enforced by the owner (`VulkanDevice` declares these last).

use std::collections::HashSet;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Entry, Instance};

use crate::core::config::GraphicsApi;
use crate::render::error::{RalError, RalResult, VkResultExt};

use super::surface::Surface;

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Vulkan instance with an optional validation messenger
pub struct VulkanInstance {
    /// Loaded entry points
    pub entry: Entry,
    /// Instance handle and dispatch table
    pub instance: Instance,
    debug: Option<DebugMessenger>,
}

impl VulkanInstance {
    /// Load the loader and create an instance
    ///
    /// `window_extensions` are the surface extensions the window system needs.
    /// Validation is skipped with a warning when the layer is not installed.
    pub fn new(app_name: &str, window_extensions: &[String], enable_validation: bool) -> RalResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            log::error!("Failed to load the Vulkan loader: {e}");
            RalError::UnsupportedBackend(GraphicsApi::Vulkan)
        })?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| RalError::Initialization("application name contains a NUL byte".to_string()))?;
        let engine_name_cstr = CString::new("ral").unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_1);

        let extension_cstrs = window_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| RalError::Initialization("instance extension name contains a NUL byte".to_string()))?;
        let mut extensions: Vec<*const c_char> = extension_cstrs.iter().map(|ext| ext.as_ptr()).collect();

        let validation = enable_validation && Self::validation_layer_available(&entry);
        if enable_validation && !validation {
            log::warn!("Validation requested but {VALIDATION_LAYER:?} is not installed");
        }

        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            extensions.push(vk::ExtValidationFeaturesFn::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let enabled_features = [vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION];
        let mut validation_features =
            vk::ValidationFeaturesEXT::builder().enabled_validation_features(&enabled_features);

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        if validation {
            create_info = create_info.push_next(&mut validation_features);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }.call("vkCreateInstance")?;

        let debug = if validation {
            let loader = DebugUtils::new(&entry, &instance);
            match Self::create_debug_messenger(&loader) {
                Ok(messenger) => Some(DebugMessenger { loader, messenger }),
                Err(err) => {
                    log::warn!("Debug messenger unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };

        log::info!(
            "Vulkan instance created for '{app_name}' (validation {})",
            if debug.is_some() { "on" } else { "off" }
        );

        Ok(Self { entry, instance, debug })
    }

    fn validation_layer_available(entry: &Entry) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers
                    .iter()
                    .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER)
            })
            .unwrap_or(false)
    }

    fn create_debug_messenger(loader: &DebugUtils) -> RalResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { loader.create_debug_utils_messenger(&create_info, None) }.call("vkCreateDebugUtilsMessengerEXT")
    }

    /// Whether validation messages are being forwarded to the log
    pub fn validation_enabled(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Forwards validation output to `log`
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {message_type:?} - {message}");
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {message_type:?} - {message}");
    } else {
        log::debug!("[Vulkan] {message_type:?} - {message}");
    }

    vk::FALSE
}

/// Selected GPU and the queue families used on it
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub graphics_family: u32,
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Pick the best GPU that can render and present to `surface`
    ///
    /// Discrete GPUs win over integrated ones; ties keep enumeration order.
    pub fn select(instance: &Instance, surface: &Surface) -> RalResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.call("vkEnumeratePhysicalDevices")?;

        let mut best: Option<(u32, Self)> = None;
        for device in devices {
            match Self::evaluate(instance, device, surface) {
                Ok(info) => {
                    let score = info.score();
                    if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
                        best = Some((score, info));
                    }
                }
                Err(err) => log::debug!("Skipping physical device: {err}"),
            }
        }

        let (_, info) = best.ok_or_else(|| RalError::Initialization("No suitable GPU found".to_string()))?;
        log::info!("Selected GPU: {}", info.name());
        Ok(info)
    }

    fn evaluate(instance: &Instance, device: vk::PhysicalDevice, surface: &Surface) -> RalResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = surface.supports_present(device, index)?;

            // a family that does both avoids a queue ownership transfer
            if graphics && present {
                graphics_family = Some(index);
                present_family = Some(index);
                break;
            }
            if graphics && graphics_family.is_none() {
                graphics_family = Some(index);
            }
            if present && present_family.is_none() {
                present_family = Some(index);
            }
        }

        let graphics_family = graphics_family
            .ok_or_else(|| RalError::Initialization("No graphics queue family found".to_string()))?;
        let present_family = present_family
            .ok_or_else(|| RalError::Initialization("No present queue family found".to_string()))?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .call("vkEnumerateDeviceExtensionProperties")?;
        let has_swapchain = extensions.iter().any(|available| {
            (unsafe { CStr::from_ptr(available.extension_name.as_ptr()) }) == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Err(RalError::Initialization("VK_KHR_swapchain not supported".to_string()));
        }

        if surface.formats(device)?.is_empty() || surface.present_modes(device)?.is_empty() {
            return Err(RalError::Initialization("Surface has no formats or present modes".to_string()));
        }

        Ok(Self {
            device,
            properties,
            features,
            graphics_family,
            present_family,
        })
    }

    fn score(&self) -> u32 {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 3,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
            _ => 0,
        }
    }

    /// Driver-reported device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Logical device with its queues and swapchain loader
pub struct LogicalDevice {
    pub device: Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_family: u32,
    pub present_family: u32,
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the device with one queue per distinct family
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo) -> RalResult<Self> {
        let unique_families: HashSet<u32> = [physical.graphics_family, physical.present_family].into_iter().collect();

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions = [SwapchainLoader::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(physical.features.sampler_anisotropy == vk::TRUE)
            .fill_mode_non_solid(physical.features.fill_mode_non_solid == vk::TRUE)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical.device, &create_info, None) }.call("vkCreateDevice")?;
        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            graphics_family: physical.graphics_family,
            present_family: physical.present_family,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}
