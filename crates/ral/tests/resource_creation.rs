//! Creation failures produce the invalid handle; uploads reach memory

mod common;

use common::{headless, spirv_stub};
use ral::prelude::*;

#[test]
fn test_bad_spirv_gives_invalid_shader() {
    let mut device = headless(2);
    let handle = device
        .create_shader(&ShaderDescription {
            stage: ShaderStages::VERTEX,
            code: vec![0xdead_beef, 0],
            entry_point: "main".to_string(),
        })
        .unwrap();
    assert!(handle.is_sentinel());
    assert!(!device.is_valid_shader(handle));
    assert!(matches!(
        device.get_buffer(BufferHandle::INVALID),
        Err(RalError::InvalidHandle { .. })
    ));
}

#[test]
fn test_pipeline_with_stale_shader_is_invalid() {
    let mut device = headless(2);
    let shader = device
        .create_shader(&ShaderDescription::from_spirv_bytes(ShaderStages::VERTEX, &spirv_stub()).unwrap())
        .unwrap();
    device.destroy_shader(shader);

    let pipeline = device
        .create_pipeline(&PipelineDescription::graphics(vec![shader], Format::Bgra8Srgb))
        .unwrap();
    assert!(pipeline.is_sentinel());
}

#[test]
fn test_compute_pipeline_takes_one_shader() {
    let mut device = headless(2);
    let compute = device
        .create_shader(&ShaderDescription::from_spirv_bytes(ShaderStages::COMPUTE, &spirv_stub()).unwrap())
        .unwrap();
    let vertex = device
        .create_shader(&ShaderDescription::from_spirv_bytes(ShaderStages::VERTEX, &spirv_stub()).unwrap())
        .unwrap();

    let mut description = PipelineDescription::compute(compute);
    let pipeline = device.create_pipeline(&description).unwrap();
    assert!(device.is_valid_pipeline(pipeline));

    description.shaders.push(vertex);
    assert!(device.create_pipeline(&description).unwrap().is_sentinel());
}

#[test]
fn test_descriptor_writes_are_checked() {
    let mut device = headless(2);
    let uniforms = device
        .create_buffer(&BufferDescription::new(64, BufferUsage::UNIFORM_BUFFER, MemoryUsage::CpuToGpu))
        .unwrap();
    let sampler = device.create_sampler(&SamplerDescription::default()).unwrap();
    let layout = device
        .create_descriptor_set_layout(&DescriptorSetLayoutDescription {
            bindings: vec![DescriptorBinding::new(0, DescriptorType::UniformBuffer, ShaderStages::VERTEX)],
        })
        .unwrap();

    let buffer_write = DescriptorWrite {
        binding: 0,
        resource: DescriptorResource::Buffer {
            buffer: uniforms,
            offset: 0,
            range: None,
        },
    };
    let set = device
        .create_descriptor_set(&DescriptorSetDescription {
            layout,
            writes: vec![buffer_write],
        })
        .unwrap();
    assert!(device.is_valid_descriptor_set(set));

    let sampler_write = DescriptorWrite {
        binding: 0,
        resource: DescriptorResource::Sampler(sampler),
    };
    assert!(device.update_descriptor_set(set, &[sampler_write]).is_err());
    assert!(device
        .create_descriptor_set(&DescriptorSetDescription {
            layout,
            writes: vec![sampler_write],
        })
        .unwrap()
        .is_sentinel());
}

#[test]
fn test_duplicate_layout_binding_is_invalid() {
    let mut device = headless(2);
    let binding = DescriptorBinding::new(1, DescriptorType::StorageBuffer, ShaderStages::COMPUTE);
    let layout = device
        .create_descriptor_set_layout(&DescriptorSetLayoutDescription {
            bindings: vec![binding, binding],
        })
        .unwrap();
    assert!(layout.is_sentinel());
}

#[test]
fn test_gpu_only_upload_goes_through_staging() {
    let mut device = headless(2);
    let buffer = device
        .create_buffer(&BufferDescription::new(
            16,
            BufferUsage::STORAGE_BUFFER | BufferUsage::TRANSFER_DST,
            MemoryUsage::GpuOnly,
        ))
        .unwrap();
    let data: Vec<u8> = (0..8).collect();

    device.upload_buffer(buffer, 8, &data).unwrap();
    let contents = device.read_buffer(buffer).unwrap();
    assert_eq!(&contents[8..], data.as_slice());
    assert_eq!(device.stats().immediate_submissions, 1);
}

#[test]
fn test_texture_upload_through_immediate_submit() {
    let mut device = headless(2);
    let description = TextureDescription::texture_2d(
        2,
        2,
        Format::Rgba8Unorm,
        TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
    );
    let texture = device.create_texture(&description).unwrap();
    let staging = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::TRANSFER_SRC, MemoryUsage::CpuOnly))
        .unwrap();
    let texels: Vec<u8> = (100..116).collect();
    device.upload_buffer(staging, 0, &texels).unwrap();

    device
        .immediate_submit(&mut |cmd: &mut dyn CommandBuffer| {
            cmd.pipeline_barrier(
                &PipelineBarrier::memory(
                    PipelineStage::TOP_OF_PIPE,
                    Access::empty(),
                    PipelineStage::TRANSFER,
                    Access::TRANSFER_WRITE,
                )
                .with_transition(texture, ImageLayout::Undefined, ImageLayout::TransferDst),
            )?;
            cmd.copy_buffer_to_texture(staging, texture, &BufferTextureCopy::whole(&description))
        })
        .unwrap();

    assert_eq!(device.read_texture(texture).unwrap(), texels);
    assert_eq!(device.stats().barriers, 1);
}

fn transfer_buffer(device: &mut dyn Device, size: u64) -> BufferHandle {
    device
        .create_buffer(&BufferDescription::new(
            size,
            BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
            MemoryUsage::CpuToGpu,
        ))
        .unwrap()
}

#[test]
fn test_overflowing_buffer_copy_is_rejected() {
    let mut device = headless(2);
    let src = transfer_buffer(&mut device, 16);
    let dst = transfer_buffer(&mut device, 16);
    device.upload_buffer(src, 0, &[7; 16]).unwrap();

    for region in [
        BufferCopy { src_offset: 1, dst_offset: 0, size: u64::MAX },
        BufferCopy { src_offset: 0, dst_offset: u64::MAX, size: 1 },
        BufferCopy { src_offset: u64::MAX, dst_offset: u64::MAX, size: u64::MAX },
        BufferCopy { src_offset: 8, dst_offset: 0, size: 9 },
    ] {
        let result = device.immediate_submit(&mut |cmd: &mut dyn CommandBuffer| cmd.copy_buffer(src, dst, &region));
        assert!(matches!(result, Err(RalError::InvalidOperation { .. })), "{region:?}");
    }

    assert_eq!(device.stats().immediate_submissions, 0);
    assert_eq!(device.read_buffer(dst).unwrap(), vec![0; 16]);
}

#[test]
fn test_overflowing_texture_copy_is_rejected() {
    let mut device = headless(2);
    let description = TextureDescription::texture_2d(4, 4, Format::Rgba8Unorm, TextureUsage::TRANSFER_DST);
    let texture = device.create_texture(&description).unwrap();
    let staging = transfer_buffer(&mut device, 64);

    let whole = BufferTextureCopy::whole(&description);
    for region in [
        BufferTextureCopy { texture_offset: [i32::MAX, 0, 0], extent: [u32::MAX, 1, 1], ..whole },
        BufferTextureCopy { texture_offset: [-1, 0, 0], ..whole },
        BufferTextureCopy { buffer_offset: u64::MAX, ..whole },
        BufferTextureCopy { extent: [u32::MAX, u32::MAX, u32::MAX], ..whole },
    ] {
        let result = device.immediate_submit(&mut |cmd: &mut dyn CommandBuffer| {
            cmd.copy_buffer_to_texture(staging, texture, &region)
        });
        assert!(matches!(result, Err(RalError::InvalidOperation { .. })), "{region:?}");
    }
    assert_eq!(device.stats().immediate_submissions, 0);
}

#[test]
fn test_overflowing_upload_is_rejected() {
    let mut device = headless(2);
    let mapped = transfer_buffer(&mut device, 16);
    let gpu_only = device
        .create_buffer(&BufferDescription::new(16, BufferUsage::TRANSFER_DST, MemoryUsage::GpuOnly))
        .unwrap();

    for buffer in [mapped, gpu_only] {
        let result = device.upload_buffer(buffer, u64::MAX, &[1, 2]);
        assert!(matches!(result, Err(RalError::InvalidOperation { .. })));
    }
    assert_eq!(device.stats().immediate_submissions, 0);
}
