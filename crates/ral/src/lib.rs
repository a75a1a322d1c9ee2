//! # RAL
//!
//! A rendering abstraction layer: applications create GPU resources through
//! generation-checked handles and record frames against one [`Device`]
//! interface, while the backend pipelines several frames in flight and
//! defers native destruction until the GPU is done with each object.
//!
//! ## Features
//!
//! - **Typed handles**: stale or forged handles are rejected, never dereferenced
//! - **Frames in flight**: per-slot fences, semaphores and deletion queues
//! - **Swapchain recovery**: out-of-date and suboptimal surfaces are rebuilt internally
//! - **Backends**: Vulkan (ash + VMA) and a headless simulation for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ral::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RalConfig::new("demo").with_graphics_api(GraphicsApi::Headless);
//!     let mut device = create_device(&config, None)?;
//!
//!     let buffer = device.create_buffer(&BufferDescription::new(
//!         256,
//!         BufferUsage::VERTEX_BUFFER,
//!         MemoryUsage::CpuToGpu,
//!     ))?;
//!
//!     if let Some(mut cmd) = device.begin_frame()? {
//!         cmd.end()?;
//!         device.end_frame(cmd)?;
//!     }
//!
//!     device.destroy_buffer(buffer);
//!     device.wait_idle()?;
//!     Ok(())
//! }
//! ```
//!
//! [`Device`]: render::api::Device

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for RAL users
pub mod prelude {
    pub use crate::{
        core::config::{DeviceConfig, GraphicsApi, LoggingConfig, RalConfig, SwapchainConfig},
        config::{Config, ConfigError},
        foundation::logging,
        render::{
            api::*,
            error::{RalError, RalResult},
            window::{Window, WindowEvent},
        },
    };
}
