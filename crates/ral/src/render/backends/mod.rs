//! Backend implementations of [`crate::render::api::Device`]
//!
//! - [`vulkan`]: native backend presenting through a GLFW surface
//! - [`headless`]: simulated queue for tests and tooling

pub mod headless;
pub mod vulkan;
