//! Backend-agnostic rendering contracts
//!
//! Handles, slot allocation, deferred deletion, frame pacing and the
//! [`Device`] / [`CommandBuffer`] traits. Nothing here touches a native API.

pub mod handle;
pub mod resource_manager;
pub mod resources_database;
pub mod deletion_queue;
pub mod frame;
pub mod types;
pub mod descriptions;
pub mod device;
pub mod command_buffer;

pub use handle::{
    Handle, ResourceKind, SENTINEL,
    BufferHandle, TextureHandle, ShaderHandle, PipelineHandle,
    DescriptorSetHandle, DescriptorSetLayoutHandle, SamplerHandle,
};
pub use resource_manager::ResourceManager;
pub use resources_database::{ResourcesDatabase, ResourceTypes};
pub use deletion_queue::DeletionQueue;
pub use frame::{FrameRing, FrameState};
pub use types::*;
pub use descriptions::*;
pub use device::{create_device, creation_outcome, staged_upload, Device, DeviceExt, RecordFn};
pub use command_buffer::{CommandBuffer, CommandBufferExt};
