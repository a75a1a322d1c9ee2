//! Shared fixtures for the integration tests

#![allow(dead_code)]

use ral::prelude::*;
use ral::render::backends::headless::HeadlessDevice;

/// Headless device with `frames` frames in flight
pub fn headless(frames: usize) -> HeadlessDevice {
    logging::init_for_tests();
    HeadlessDevice::new(
        &RalConfig::new("integration")
            .with_graphics_api(GraphicsApi::Headless)
            .with_frames_in_flight(frames),
    )
}

/// Smallest module the headless backend accepts: header words only
pub fn spirv_stub() -> Vec<u8> {
    [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
}

/// Resources for an indexed triangle drawn into the swapchain
pub struct Triangle {
    pub vertices: BufferHandle,
    pub indices: BufferHandle,
    pub pipeline: PipelineHandle,
}

pub fn triangle(device: &mut dyn Device) -> Triangle {
    let vertices = device
        .create_buffer(&BufferDescription::new(
            3 * 8,
            BufferUsage::VERTEX_BUFFER | BufferUsage::TRANSFER_DST,
            MemoryUsage::CpuToGpu,
        ))
        .unwrap();
    let indices = device
        .create_buffer(&BufferDescription::new(
            3 * 2,
            BufferUsage::INDEX_BUFFER,
            MemoryUsage::CpuToGpu,
        ))
        .unwrap();
    device
        .upload_buffer(indices, 0, bytemuck::cast_slice(&[0u16, 1, 2]))
        .unwrap();

    let vertex_shader = device
        .create_shader(&ShaderDescription::from_spirv_bytes(ShaderStages::VERTEX, &spirv_stub()).unwrap())
        .unwrap();
    let fragment_shader = device
        .create_shader(&ShaderDescription::from_spirv_bytes(ShaderStages::FRAGMENT, &spirv_stub()).unwrap())
        .unwrap();
    let color_format = device.swapchain_format();
    let pipeline = device
        .create_pipeline(
            &PipelineDescription::graphics(vec![vertex_shader, fragment_shader], color_format)
                .with_vertex_layout(VertexLayout::interleaved(&[Format::Rg32Float])),
        )
        .unwrap();
    assert!(device.is_valid_pipeline(pipeline));

    Triangle {
        vertices,
        indices,
        pipeline,
    }
}

/// One frame drawing the triangle with `draw_indexed(3, 1, 0, 0, 0)`
pub fn draw_frame(device: &mut dyn Device, triangle: &Triangle) {
    let mut cmd = device.begin_frame().unwrap().expect("frame skipped");
    cmd.begin_render_pass(&RenderPassDescription::swapchain([0.0, 0.0, 0.0, 1.0]))
        .unwrap();
    cmd.bind_pipeline(triangle.pipeline).unwrap();
    cmd.bind_vertex_buffer(0, triangle.vertices, 0).unwrap();
    cmd.bind_index_buffer(triangle.indices, 0, IndexType::U16).unwrap();
    cmd.draw_indexed(3, 1, 0, 0, 0).unwrap();
    cmd.end_render_pass().unwrap();
    device.end_frame(cmd).unwrap();
}

/// Frame that records nothing
pub fn empty_frame(device: &mut dyn Device) {
    let cmd = device.begin_frame().unwrap().expect("frame skipped");
    device.end_frame(cmd).unwrap();
}
