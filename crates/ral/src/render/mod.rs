//! # Rendering Abstraction Layer
//!
//! - [`api`]: handles, resource managers, frame ring and the device traits
//! - [`backends`]: Vulkan and headless implementations
//! - [`window`]: GLFW window used for presentation
//! - [`error`]: error taxonomy shared by every backend

pub mod api;
pub mod backends;
pub mod error;
pub mod window;

pub use api::{create_device, CommandBuffer, CommandBufferExt, Device, DeviceExt};
pub use error::{RalError, RalResult};
pub use window::{Window, WindowError, WindowEvent};
