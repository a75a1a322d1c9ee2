//! # Unified Configuration System
//!
//! Configuration structures for the rendering abstraction layer. The backend
//! is chosen from an explicit [`GraphicsApi`] value handed to
//! [`crate::render::api::create_device`], never from global state.
//!
//! ## Configuration Categories
//!
//! - **Device Config**: frames in flight, validation layers
//! - **Swapchain Config**: initial extent and presentation preferences
//! - **Logging Config**: default log filter

use serde::{Serialize, Deserialize};

use crate::config::{Config, ConfigError};

/// Upper bound on frames in flight accepted by validation
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Graphics API used to instantiate a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphicsApi {
    /// Vulkan backend (requires a window for presentation)
    Vulkan,
    /// GPU-less backend with a simulated queue, used for tests and tooling
    Headless,
}

impl Default for GraphicsApi {
    fn default() -> Self {
        Self::Vulkan
    }
}

/// # Device Configuration
///
/// Settings that shape the frame-in-flight pipeline and the native device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Number of frames the CPU may record ahead of the GPU
    pub frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers (None = debug builds only)
    pub enable_validation: Option<bool>,
}

impl DeviceConfig {
    /// Create a device configuration with double buffering
    pub fn new() -> Self {
        Self {
            frames_in_flight: 2,
            enable_validation: None,
        }
    }

    /// Set frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Resolve the validation setting for the current build type
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.frames_in_flight == 0 {
            return Err("Frames in flight must be at least 1".to_string());
        }

        if self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(format!(
                "Frames in flight should not exceed {MAX_FRAMES_IN_FLIGHT}"
            ));
        }

        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Swapchain Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapchainConfig {
    /// Initial width used when the surface does not dictate an extent
    pub width: u32,
    /// Initial height used when the surface does not dictate an extent
    pub height: u32,
    /// Prefer MAILBOX presentation over FIFO when available
    pub prefer_mailbox: bool,
    /// Prefer an sRGB surface format when available
    pub prefer_srgb: bool,
}

impl SwapchainConfig {
    /// Create a swapchain configuration for the given extent
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            prefer_mailbox: true,
            prefer_srgb: true,
        }
    }

    /// Set presentation mode preference
    pub fn with_mailbox(mut self, prefer: bool) -> Self {
        self.prefer_mailbox = prefer;
        self
    }
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// # Logging Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter (`error`, `warn`, `info`, `debug`, `trace`)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// # Complete Configuration
///
/// Top-level configuration handed to the device factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RalConfig {
    /// Application name for instance creation
    pub application_name: String,
    /// Backend to instantiate
    pub graphics_api: GraphicsApi,
    /// Device configuration
    pub device: DeviceConfig,
    /// Swapchain configuration
    pub swapchain: SwapchainConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl RalConfig {
    /// Create a new configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            graphics_api: GraphicsApi::default(),
            device: DeviceConfig::default(),
            swapchain: SwapchainConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Select the backend
    pub fn with_graphics_api(mut self, api: GraphicsApi) -> Self {
        self.graphics_api = api;
        self
    }

    /// Set frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.device.frames_in_flight = frames;
        self
    }

    /// Set the initial swapchain extent
    pub fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.swapchain.width = width;
        self.swapchain.height = height;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        self.device.validate().map_err(ConfigError::Invalid)?;

        if self.swapchain.width == 0 || self.swapchain.height == 0 {
            return Err(ConfigError::Invalid("Swapchain extent must be non-zero".to_string()));
        }

        Ok(())
    }
}

impl Default for RalConfig {
    fn default() -> Self {
        Self::new("RAL Application")
    }
}

impl Config for RalConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device.frames_in_flight, 2);
        assert_eq!(config.graphics_api, GraphicsApi::Vulkan);
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        assert!(RalConfig::default().with_frames_in_flight(0).validate().is_err());
        assert!(RalConfig::default().with_frames_in_flight(9).validate().is_err());
        assert!(RalConfig::default().with_frames_in_flight(3).validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let config = RalConfig::new("");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RalConfig::new("toml test")
            .with_graphics_api(GraphicsApi::Headless)
            .with_frames_in_flight(3);

        let text = config.to_string_with_format("ral.toml").unwrap();
        let parsed = RalConfig::from_str_with_format(&text, "ral.toml").unwrap();

        assert_eq!(parsed.application_name, "toml test");
        assert_eq!(parsed.graphics_api, GraphicsApi::Headless);
        assert_eq!(parsed.device.frames_in_flight, 3);
    }

    #[test]
    fn test_ron_parse() {
        let text = r#"(
            application_name: "ron test",
            graphics_api: Headless,
            device: (frames_in_flight: 2, enable_validation: Some(false)),
            swapchain: (width: 640, height: 480, prefer_mailbox: false, prefer_srgb: true),
            logging: (level: "debug"),
        )"#;

        let parsed = RalConfig::from_str_with_format(text, "ral.ron").unwrap();
        assert_eq!(parsed.swapchain.width, 640);
        assert!(!parsed.device.validation_enabled());
        assert_eq!(parsed.logging.level, "debug");
    }

    #[test]
    fn test_unsupported_format() {
        let result = RalConfig::from_str_with_format("", "ral.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
