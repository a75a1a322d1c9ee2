//! Render pass cache and transient framebuffers
//!
//! The RAL has no render pass objects; `begin_render_pass` describes its
//! attachments inline. Native render passes are created on first use and
//! cached by attachment signature. Pipelines ask the same cache for a
//! compatible pass built from their attachment formats.

use std::collections::HashMap;

use ash::{vk, Device};

use crate::render::error::{RalResult, VkResultExt};

/// Attachment properties that make two render passes incompatible or different
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentKey {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl AttachmentKey {
    /// Cleared color attachment left in attachment layout
    pub fn color(format: vk::Format) -> Self {
        Self {
            format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }

    /// Cleared depth attachment left in attachment layout
    pub fn depth(format: vk::Format) -> Self {
        Self {
            format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }
}

/// Cache key of one single-subpass render pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassKey {
    pub colors: Vec<AttachmentKey>,
    pub depth: Option<AttachmentKey>,
}

impl RenderPassKey {
    /// Key for a pass compatible with a pipeline's attachment formats
    pub fn for_pipeline(color_formats: &[vk::Format], depth_format: Option<vk::Format>) -> Self {
        Self {
            colors: color_formats.iter().copied().map(AttachmentKey::color).collect(),
            depth: depth_format.map(AttachmentKey::depth),
        }
    }

    fn attachment_descriptions(&self) -> Vec<vk::AttachmentDescription> {
        let color = self.colors.iter().map(|key| {
            vk::AttachmentDescription::builder()
                .format(key.format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(key.load_op)
                .store_op(key.store_op)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(key.initial_layout)
                .final_layout(key.final_layout)
                .build()
        });
        let depth = self.depth.iter().map(|key| {
            vk::AttachmentDescription::builder()
                .format(key.format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(key.load_op)
                .store_op(key.store_op)
                .stencil_load_op(key.load_op)
                .stencil_store_op(key.store_op)
                .initial_layout(key.initial_layout)
                .final_layout(key.final_layout)
                .build()
        });
        color.chain(depth).collect()
    }
}

fn create_render_pass(device: &Device, key: &RenderPassKey) -> RalResult<vk::RenderPass> {
    let attachments = key.attachment_descriptions();

    let color_refs: Vec<vk::AttachmentReference> = (0..key.colors.len() as u32)
        .map(|attachment| vk::AttachmentReference {
            attachment,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        })
        .collect();
    let depth_ref = vk::AttachmentReference {
        attachment: key.colors.len() as u32,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let mut subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if key.depth.is_some() {
        subpass = subpass.depth_stencil_attachment(&depth_ref);
    }
    let subpasses = [subpass.build()];

    // Orders the layout transition after the previous use of the attachments
    let dependencies = [vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .build()];

    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&create_info, None) }.call("vkCreateRenderPass")
}

/// Render passes by attachment signature, alive until the device is dropped
pub struct RenderPassCache {
    device: Device,
    passes: HashMap<RenderPassKey, vk::RenderPass>,
}

impl RenderPassCache {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            passes: HashMap::new(),
        }
    }

    /// Cached pass for `key`, created on first request
    pub fn get_or_create(&mut self, key: &RenderPassKey) -> RalResult<vk::RenderPass> {
        if let Some(&pass) = self.passes.get(key) {
            return Ok(pass);
        }

        let pass = create_render_pass(&self.device, key)?;
        log::debug!(
            "Render pass {pass:?} created for {} color attachment(s), depth: {}",
            key.colors.len(),
            key.depth.is_some()
        );
        self.passes.insert(key.clone(), pass);
        Ok(pass)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Destroy every cached pass; the device must be idle
    pub fn clear(&mut self) {
        unsafe {
            for (_, pass) in self.passes.drain() {
                self.device.destroy_render_pass(pass, None);
            }
        }
    }
}

impl Drop for RenderPassCache {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Framebuffer for one render pass instance
///
/// Lives until the frame that used it retires.
pub fn create_framebuffer(
    device: &Device,
    render_pass: vk::RenderPass,
    views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> RalResult<vk::Framebuffer> {
    let create_info = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(views)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    unsafe { device.create_framebuffer(&create_info, None) }.call("vkCreateFramebuffer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_pipeline_key_attachment_order() {
        let key = RenderPassKey::for_pipeline(
            &[vk::Format::B8G8R8A8_SRGB, vk::Format::R16G16B16A16_SFLOAT],
            Some(vk::Format::D32_SFLOAT),
        );
        let descriptions = key.attachment_descriptions();
        assert_eq!(descriptions.len(), 3);
        assert_eq!(descriptions[1].format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(descriptions[2].final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_keys_distinguish_final_layout() {
        let mut present = AttachmentKey::color(vk::Format::B8G8R8A8_SRGB);
        present.final_layout = vk::ImageLayout::PRESENT_SRC_KHR;
        let offscreen = AttachmentKey::color(vk::Format::B8G8R8A8_SRGB);

        let keys: HashSet<RenderPassKey> = [
            RenderPassKey { colors: vec![present], depth: None },
            RenderPassKey { colors: vec![offscreen], depth: None },
            RenderPassKey { colors: vec![offscreen], depth: None },
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 2);
    }
}
