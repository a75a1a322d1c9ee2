//! # Core Module
//!
//! Shared configuration types used to select and tune a rendering backend.
//!
//! ## Organization
//!
//! - **Config**: Unified configuration for device, swapchain and logging

pub mod config;

pub use config::{
    RalConfig,
    DeviceConfig,
    SwapchainConfig,
    LoggingConfig,
    GraphicsApi,
};
pub use crate::config::{Config, ConfigError};
