//! # Vulkan Backend
//!
//! Native implementation of the device traits on top of `ash` and VMA.
//!
//! ## Architecture
//!
//! - `initialization`: instance, validation, surface, physical and logical device
//! - `state`: swapchain, per-frame synchronization, state shared with command buffers
//! - `resources`: buffers, textures, samplers and descriptors
//! - `rendering`: shaders, pipelines, render pass cache and command recording
//! - `conversions`: translation of RAL enums and flags to Vulkan
//!
//! Every native object created through the device is owned by a resource
//! manager and destroyed through the frame ring's deletion queues.

pub mod conversions;
pub mod device;
pub mod initialization;
pub mod rendering;
pub mod resources;
pub mod state;

pub use device::VulkanDevice;
pub use rendering::VulkanCommandBuffer;
pub use resources::VulkanResources;
