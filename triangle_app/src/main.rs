//! Triangle demo application
//!
//! Opens a window and draws one spinning, vertex-colored triangle through the
//! RAL device interface, following window resizes and minimization.
//!
//! `--headless` runs a fixed number of frames on the GPU-less backend,
//! including one resize, without opening a window.

use std::path::{Path, PathBuf};
use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use ral::prelude::*;
use ral::render::WindowError;

const CONFIG_PATH: &str = "triangle.toml";
const HEADLESS_FRAMES: usize = 240;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

const VERTICES: [Vertex; 3] = [
    Vertex { position: [0.0, -0.6], color: [1.0, 0.2, 0.2] },
    Vertex { position: [0.55, 0.45], color: [0.2, 1.0, 0.2] },
    Vertex { position: [-0.55, 0.45], color: [0.2, 0.4, 1.0] },
];

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PushConstants {
    angle: f32,
    aspect: f32,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Ral(#[from] RalError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read shader {path:?}: {source}")]
    Shader {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0} could not be created, see the log for the cause")]
    Creation(&'static str),
}

/// Everything the triangle needs on the device
struct Scene {
    vertex_buffer: BufferHandle,
    vertex_shader: ShaderHandle,
    fragment_shader: ShaderHandle,
    pipeline: PipelineHandle,
    color_format: Format,
}

impl Scene {
    fn create(device: &mut dyn Device, shader_dir: &Path) -> Result<Self, AppError> {
        let vertex_buffer = device.create_buffer_with_data(
            BufferUsage::VERTEX_BUFFER,
            MemoryUsage::GpuOnly,
            &VERTICES,
        )?;
        if vertex_buffer.is_sentinel() {
            return Err(AppError::Creation("vertex buffer"));
        }

        let vertex_shader = load_shader(device, shader_dir, "triangle.vert.spv", ShaderStages::VERTEX)?;
        let fragment_shader = load_shader(device, shader_dir, "triangle.frag.spv", ShaderStages::FRAGMENT)?;

        let mut scene = Self {
            vertex_buffer,
            vertex_shader,
            fragment_shader,
            pipeline: PipelineHandle::INVALID,
            color_format: Format::Undefined,
        };
        scene.rebuild_pipeline(device)?;
        Ok(scene)
    }

    /// (Re)create the pipeline for the current swapchain format
    fn rebuild_pipeline(&mut self, device: &mut dyn Device) -> Result<(), AppError> {
        let color_format = device.swapchain_format();
        let pipeline = device.create_pipeline(
            &PipelineDescription::graphics(vec![self.vertex_shader, self.fragment_shader], color_format)
                .with_vertex_layout(VertexLayout::interleaved(&[Format::Rg32Float, Format::Rgb32Float]))
                .with_push_constants(PushConstantRange {
                    stages: ShaderStages::VERTEX,
                    offset: 0,
                    size: std::mem::size_of::<PushConstants>() as u32,
                }),
        )?;
        if pipeline.is_sentinel() {
            return Err(AppError::Creation("pipeline"));
        }

        if !self.pipeline.is_sentinel() {
            device.destroy_pipeline(self.pipeline);
        }
        self.pipeline = pipeline;
        self.color_format = color_format;
        log::info!("Pipeline ready for {color_format:?}");
        Ok(())
    }

    fn record(&self, cmd: &mut dyn CommandBuffer, push: &PushConstants) -> RalResult<()> {
        cmd.begin_render_pass(&RenderPassDescription::swapchain([0.02, 0.02, 0.05, 1.0]))?;
        cmd.bind_pipeline(self.pipeline)?;
        cmd.bind_vertex_buffer(0, self.vertex_buffer, 0)?;
        cmd.push_constants_typed(ShaderStages::VERTEX, 0, push)?;
        cmd.draw(VERTICES.len() as u32, 1, 0, 0)?;
        cmd.end_render_pass()
    }

    fn destroy(self, device: &mut dyn Device) {
        device.destroy_pipeline(self.pipeline);
        device.destroy_shader(self.fragment_shader);
        device.destroy_shader(self.vertex_shader);
        device.destroy_buffer(self.vertex_buffer);
    }
}

fn load_shader(
    device: &mut dyn Device,
    shader_dir: &Path,
    file_name: &str,
    stage: ShaderStages,
) -> Result<ShaderHandle, AppError> {
    let path = shader_dir.join(file_name);
    let bytes = std::fs::read(&path).map_err(|source| AppError::Shader { path, source })?;
    let handle = device.create_shader(&ShaderDescription::from_spirv_bytes(stage, &bytes)?)?;
    if handle.is_sentinel() {
        return Err(AppError::Creation("shader"));
    }
    Ok(handle)
}

fn load_config(headless: bool) -> Result<RalConfig, AppError> {
    let mut config = if Path::new(CONFIG_PATH).exists() {
        log::info!("Loading configuration from {CONFIG_PATH}");
        RalConfig::load_from_file(CONFIG_PATH)?
    } else {
        RalConfig::new("RAL Triangle")
    };
    if headless {
        config.graphics_api = GraphicsApi::Headless;
    }
    config.validate()?;
    Ok(config)
}

fn push_constants(start: Instant, extent: Extent2D) -> PushConstants {
    PushConstants {
        angle: start.elapsed().as_secs_f32(),
        aspect: extent.width.max(1) as f32 / extent.height.max(1) as f32,
    }
}

fn run_windowed(config: &RalConfig, shader_dir: &Path) -> Result<(), AppError> {
    let mut window = Window::new(
        &config.application_name,
        config.swapchain.width,
        config.swapchain.height,
    )?;
    let mut device = create_device(config, Some(&mut window))?;
    let mut scene = Scene::create(device.as_mut(), shader_dir)?;

    let start = Instant::now();
    let mut frames = 0u64;
    let mut minimized = false;

    while !window.should_close() {
        for event in window.poll_events() {
            match event {
                WindowEvent::Resized(extent) => {
                    log::debug!("Framebuffer resized to {}x{}", extent.width, extent.height);
                    minimized = extent.width == 0 || extent.height == 0;
                    device.resize(extent.width, extent.height);
                }
                WindowEvent::CloseRequested => window.set_should_close(true),
            }
        }

        let Some(mut cmd) = device.begin_frame()? else {
            if minimized {
                window.wait_events();
            }
            continue;
        };
        if device.swapchain_format() != scene.color_format {
            // submit the empty frame first so the old pipeline retires with it
            device.end_frame(cmd)?;
            scene.rebuild_pipeline(device.as_mut())?;
            continue;
        }

        let push = push_constants(start, device.swapchain_extent());
        scene.record(cmd.as_mut(), &push)?;
        device.end_frame(cmd)?;
        frames += 1;
    }

    let elapsed = start.elapsed().as_secs_f64();
    log::info!(
        "Rendered {frames} frames in {elapsed:.1}s ({:.1} fps)",
        frames as f64 / elapsed.max(f64::EPSILON)
    );

    device.wait_idle()?;
    scene.destroy(device.as_mut());
    Ok(())
}

fn run_headless(config: &RalConfig, shader_dir: &Path) -> Result<(), AppError> {
    let mut device = create_device(config, None)?;
    let scene = Scene::create(device.as_mut(), shader_dir)?;
    let start = Instant::now();

    for frame in 0..HEADLESS_FRAMES {
        // exercise recreation halfway through
        if frame == HEADLESS_FRAMES / 2 {
            device.resize(config.swapchain.width / 2, config.swapchain.height / 2);
        }
        let Some(mut cmd) = device.begin_frame()? else {
            continue;
        };
        let push = push_constants(start, device.swapchain_extent());
        scene.record(cmd.as_mut(), &push)?;
        device.end_frame(cmd)?;
    }

    device.wait_idle()?;
    scene.destroy(device.as_mut());
    log::info!(
        "Headless run finished: {HEADLESS_FRAMES} frames, final extent {:?}",
        device.swapchain_extent()
    );
    Ok(())
}

fn main() -> Result<(), AppError> {
    let headless = std::env::args().any(|arg| arg == "--headless");
    let config = load_config(headless)?;
    logging::init(&config.logging);

    log::info!("Starting {} on {:?}", config.application_name, config.graphics_api);
    let shader_dir = PathBuf::from(env!("TRIANGLE_SHADER_DIR"));

    let result = match config.graphics_api {
        GraphicsApi::Vulkan => run_windowed(&config, &shader_dir),
        GraphicsApi::Headless => run_headless(&config, &shader_dir),
    };
    if let Err(err) = &result {
        log::error!("Triangle demo failed: {err}");
    }
    result
}
