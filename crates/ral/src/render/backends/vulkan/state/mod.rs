//! Swapchain, synchronization and per-frame native state

pub mod frame_data;
pub mod shared;
pub mod swapchain;
pub mod sync;

pub use frame_data::{FrameData, UploadContext};
pub use shared::{SwapchainTarget, VulkanShared};
pub use swapchain::Swapchain;
pub use sync::{CommandPool, Fence, Semaphore};
