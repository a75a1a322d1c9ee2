//! Error types for the rendering abstraction layer

use ash::vk;
use thiserror::Error;

use crate::config::ConfigError;
use crate::core::config::GraphicsApi;
use crate::render::window::WindowError;

/// Rendering abstraction layer errors
#[derive(Error, Debug)]
pub enum RalError {
    /// A stale, out-of-range or sentinel handle was presented for lookup
    #[error("Invalid {kind} handle (index {index}, generation {generation})")]
    InvalidHandle {
        /// Resource kind the handle was checked against
        kind: &'static str,
        /// Slot index carried by the handle
        index: u32,
        /// Generation carried by the handle
        generation: u32,
    },

    /// The swapchain no longer matches the surface and must be recreated
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// Native API call failed
    #[error("{call} failed: {code:?}")]
    Device {
        /// Native entry point that failed
        call: &'static str,
        /// Native error code
        code: vk::Result,
    },

    /// Resource could not be created (bad description, allocator exhaustion, shader failure)
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// API misuse such as recording outside a frame
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Backend initialization failed
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Window system error
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Requested backend is not available in this build or environment
    #[error("Graphics API {0:?} is not supported here")]
    UnsupportedBackend(GraphicsApi),
}

/// Result type for RAL operations
pub type RalResult<T> = Result<T, RalError>;

impl RalError {
    /// Build a native-call error
    pub fn device(call: &'static str, code: vk::Result) -> Self {
        Self::Device { call, code }
    }

    /// Build an invalid-operation error
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }

    /// Whether the error must abort the render loop
    ///
    /// Creation failures, misuse and stale handles are local to one call;
    /// lost devices and host memory exhaustion are not recoverable here.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Device { code, .. } => is_fatal_code(*code),
            Self::Initialization(_) | Self::Window(_) | Self::UnsupportedBackend(_) => true,
            Self::InvalidHandle { .. }
            | Self::SwapchainOutOfDate
            | Self::ResourceCreation(_)
            | Self::InvalidOperation { .. }
            | Self::Config(_) => false,
        }
    }

    /// Whether the error is a transient swapchain condition
    pub fn is_swapchain_out_of_date(&self) -> bool {
        matches!(
            self,
            Self::SwapchainOutOfDate
                | Self::Device { code: vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR, .. }
        )
    }
}

/// Attach `call` to a swapchain result, lifting OUT_OF_DATE to
/// [`RalError::SwapchainOutOfDate`]
pub fn swapchain_status<T>(call: &'static str, result: Result<T, vk::Result>) -> RalResult<T> {
    match result {
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RalError::SwapchainOutOfDate),
        other => other.call(call),
    }
}

/// Classify native result codes that cannot be recovered locally
pub fn is_fatal_code(code: vk::Result) -> bool {
    matches!(
        code,
        vk::Result::ERROR_DEVICE_LOST
            | vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_INITIALIZATION_FAILED
            | vk::Result::ERROR_SURFACE_LOST_KHR
    )
}

/// Extension for turning native results into [`RalError::Device`]
pub trait VkResultExt<T> {
    /// Attach the failing call name to a native error
    fn call(self, call: &'static str) -> RalResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn call(self, call: &'static str) -> RalResult<T> {
        self.map_err(|code| RalError::device(call, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_is_fatal() {
        let err = RalError::device("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("vkQueueSubmit"));
        assert!(err.to_string().contains("ERROR_DEVICE_LOST"));
    }

    #[test]
    fn test_device_memory_exhaustion_is_not_fatal() {
        let err = RalError::device("vmaCreateBuffer", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_out_of_date_classification() {
        assert!(RalError::SwapchainOutOfDate.is_swapchain_out_of_date());
        assert!(RalError::device("vkQueuePresentKHR", vk::Result::SUBOPTIMAL_KHR).is_swapchain_out_of_date());
        assert!(!RalError::device("vkQueuePresentKHR", vk::Result::ERROR_DEVICE_LOST).is_swapchain_out_of_date());
    }

    #[test]
    fn test_swapchain_status_lifts_out_of_date() {
        let stale: Result<u32, vk::Result> = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(matches!(
            swapchain_status("vkAcquireNextImageKHR", stale),
            Err(RalError::SwapchainOutOfDate)
        ));

        let lost: Result<bool, vk::Result> = Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        let err = swapchain_status("vkQueuePresentKHR", lost).unwrap_err();
        assert!(!err.is_swapchain_out_of_date());
        assert!(matches!(err, RalError::Device { call: "vkQueuePresentKHR", .. }));

        assert!(swapchain_status("vkQueuePresentKHR", Ok(true)).unwrap());
    }

    #[test]
    fn test_invalid_handle_is_not_fatal() {
        let err = RalError::InvalidHandle { kind: "buffer", index: 3, generation: 1 };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Invalid buffer handle (index 3, generation 1)");
    }
}
