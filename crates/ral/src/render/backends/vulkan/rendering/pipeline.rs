//! Graphics and compute pipelines
//!
//! Viewport and scissor are always dynamic. Graphics pipelines are built
//! against a cached render pass whose attachment formats match the
//! description, which makes them compatible with any `begin_render_pass`
//! using the same formats.

use ash::{vk, Device};

use crate::render::api::descriptions::PipelineDescription;
use crate::render::api::handle::DescriptorSetLayoutHandle;
use crate::render::api::resources_database::ResourcesDatabase;
use crate::render::api::types::{PipelineBindPoint, ShaderStages};
use crate::render::backends::vulkan::conversions::IntoVk;
use crate::render::backends::vulkan::resources::{NativeResource, VulkanResources};
use crate::render::error::{RalError, RalResult, VkResultExt};

use super::render_pass::{RenderPassCache, RenderPassKey};

pub struct VulkanPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub bind_point: PipelineBindPoint,
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    pub push_constant_stages: ShaderStages,
    pub push_constant_end: u32,
    pub color_attachments: usize,
    pub depth_attachment: bool,
}

impl VulkanPipeline {
    pub fn new(
        device: &Device,
        resources: &ResourcesDatabase<VulkanResources>,
        render_passes: &mut RenderPassCache,
        description: &PipelineDescription,
    ) -> RalResult<Self> {
        description.validate()?;

        let mut stages = ShaderStages::empty();
        let mut stage_infos = Vec::with_capacity(description.shaders.len());
        for &handle in &description.shaders {
            let shader = resources.get_shader(handle)?;
            if stages.intersects(shader.stage) {
                return Err(RalError::ResourceCreation(format!(
                    "pipeline has more than one {:?} shader",
                    shader.stage
                )));
            }
            stages |= shader.stage;
            stage_infos.push(shader.stage_info());
        }

        let bind_point = if stages.contains(ShaderStages::COMPUTE) {
            if description.shaders.len() != 1 {
                return Err(RalError::ResourceCreation(
                    "a compute pipeline takes exactly one shader".to_string(),
                ));
            }
            PipelineBindPoint::Compute
        } else {
            if !stages.contains(ShaderStages::VERTEX) {
                return Err(RalError::ResourceCreation("graphics pipeline has no vertex shader".to_string()));
            }
            PipelineBindPoint::Graphics
        };

        let set_layouts = description
            .descriptor_set_layouts
            .iter()
            .map(|&handle| resources.get_descriptor_set_layout(handle).map(|layout| layout.layout))
            .collect::<RalResult<Vec<_>>>()?;
        let push_constant_ranges: Vec<vk::PushConstantRange> = description
            .push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: range.stages.into_vk(),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }.call("vkCreatePipelineLayout")?;

        let created = match bind_point {
            PipelineBindPoint::Compute => create_compute(device, layout, stage_infos[0]),
            PipelineBindPoint::Graphics => {
                create_graphics(device, layout, render_passes, description, &stage_infos)
            }
        };
        let pipeline = match created {
            Ok(pipeline) => pipeline,
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(err);
            }
        };

        log::debug!("Created {bind_point:?} pipeline {pipeline:?} with {} stage(s)", stage_infos.len());

        Ok(Self {
            pipeline,
            layout,
            bind_point,
            set_layouts: description.descriptor_set_layouts.clone(),
            push_constant_stages: description
                .push_constant_ranges
                .iter()
                .fold(ShaderStages::empty(), |acc, range| acc | range.stages),
            push_constant_end: description
                .push_constant_ranges
                .iter()
                .map(|range| range.offset + range.size)
                .max()
                .unwrap_or(0),
            color_attachments: description.color_formats.len(),
            depth_attachment: description.depth_format.is_some(),
        })
    }
}

fn create_compute(
    device: &Device,
    layout: vk::PipelineLayout,
    stage: vk::PipelineShaderStageCreateInfo,
) -> RalResult<vk::Pipeline> {
    let create_info = vk::ComputePipelineCreateInfo::builder().stage(stage).layout(layout);
    let pipelines = unsafe { device.create_compute_pipelines(vk::PipelineCache::null(), &[create_info.build()], None) }
        .map_err(|(_, code)| RalError::device("vkCreateComputePipelines", code))?;
    Ok(pipelines[0])
}

fn create_graphics(
    device: &Device,
    layout: vk::PipelineLayout,
    render_passes: &mut RenderPassCache,
    description: &PipelineDescription,
    stages: &[vk::PipelineShaderStageCreateInfo],
) -> RalResult<vk::Pipeline> {
    let color_formats: Vec<vk::Format> = description.color_formats.iter().map(|&f| f.into_vk()).collect();
    let depth_format = description.depth_format.map(IntoVk::<vk::Format>::into_vk);
    let render_pass = render_passes.get_or_create(&RenderPassKey::for_pipeline(&color_formats, depth_format))?;

    let bindings: Vec<vk::VertexInputBindingDescription> = description
        .vertex_layout
        .bindings
        .iter()
        .map(|binding| vk::VertexInputBindingDescription {
            binding: binding.binding,
            stride: binding.stride,
            input_rate: binding.input_rate.into_vk(),
        })
        .collect();
    let attributes: Vec<vk::VertexInputAttributeDescription> = description
        .vertex_layout
        .attributes
        .iter()
        .map(|attribute| vk::VertexInputAttributeDescription {
            location: attribute.location,
            binding: attribute.binding,
            format: attribute.format.into_vk(),
            offset: attribute.offset,
        })
        .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(description.topology.into_vk())
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

    let raster = &description.raster;
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(raster.polygon_mode.into_vk())
        .line_width(raster.line_width)
        .cull_mode(raster.cull_mode.into_vk())
        .front_face(raster.front_face.into_vk())
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(description.depth.test_enable)
        .depth_write_enable(description.depth.write_enable)
        .depth_compare_op(description.depth.compare_op.into_vk())
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let blend = &description.blend;
    let blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(blend.enabled)
        .src_color_blend_factor(blend.src_color.into_vk())
        .dst_color_blend_factor(blend.dst_color.into_vk())
        .color_blend_op(blend.color_op.into_vk())
        .src_alpha_blend_factor(blend.src_alpha.into_vk())
        .dst_alpha_blend_factor(blend.dst_alpha.into_vk())
        .alpha_blend_op(blend.alpha_op.into_vk())
        .build();
    let blend_attachments = vec![blend_attachment; color_formats.len()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let pipelines =
        unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None) }
            .map_err(|(_, code)| RalError::device("vkCreateGraphicsPipelines", code))?;
    Ok(pipelines[0])
}

impl NativeResource for VulkanPipeline {
    const LABEL: &'static str = "pipeline";

    unsafe fn destroy(self, device: &Device, _allocator: &vk_mem::Allocator) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}
