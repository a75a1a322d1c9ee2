//! Shaders, pipelines, render passes and command recording

pub mod command_buffer;
pub mod pipeline;
pub mod render_pass;
pub mod shader;

pub use command_buffer::VulkanCommandBuffer;
pub use pipeline::VulkanPipeline;
pub use render_pass::{create_framebuffer, AttachmentKey, RenderPassCache, RenderPassKey};
pub use shader::VulkanShader;
