//! Shared state of the headless backend
//!
//! Native objects are numbered, host memory stands in for device memory and
//! the GPU is a serial counter that only advances when the CPU waits on a
//! fence (or a test explicitly lets it catch up).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::render::api::descriptions::{
    BufferDescription, BufferTextureCopy, DescriptorSetLayoutDescription, DescriptorWrite,
    SamplerDescription, TextureDescription,
};
use crate::render::api::handle::DescriptorSetLayoutHandle;
use crate::render::api::resources_database::{ResourceTypes, ResourcesDatabase};
use crate::render::api::types::{ImageLayout, PipelineBindPoint, ShaderStages};

/// Identifier of a simulated native object
pub type NativeId = u64;

/// Host memory standing in for a device allocation
pub type Memory = Rc<RefCell<Vec<u8>>>;

#[derive(Debug)]
pub struct HeadlessBuffer {
    pub id: NativeId,
    pub description: BufferDescription,
    pub memory: Memory,
    pub mapped: bool,
}

#[derive(Debug)]
pub struct HeadlessTexture {
    pub id: NativeId,
    pub description: TextureDescription,
    pub memory: Memory,
}

#[derive(Debug)]
pub struct HeadlessShader {
    pub id: NativeId,
    pub stage: ShaderStages,
}

#[derive(Debug)]
pub struct HeadlessPipeline {
    pub id: NativeId,
    pub bind_point: PipelineBindPoint,
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    pub push_constant_stages: ShaderStages,
    pub push_constant_end: u32,
    pub depth_attachment: bool,
    pub color_attachments: usize,
}

#[derive(Debug)]
pub struct HeadlessDescriptorSetLayout {
    pub id: NativeId,
    pub description: DescriptorSetLayoutDescription,
}

#[derive(Debug)]
pub struct HeadlessDescriptorSet {
    pub id: NativeId,
    pub layout: DescriptorSetLayoutHandle,
    pub writes: Vec<DescriptorWrite>,
}

#[derive(Debug)]
pub struct HeadlessSampler {
    pub id: NativeId,
    pub description: SamplerDescription,
}

/// Native representation of every kind in the headless backend
pub struct HeadlessResources;

impl ResourceTypes for HeadlessResources {
    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;
    type Shader = HeadlessShader;
    type Pipeline = HeadlessPipeline;
    type DescriptorSet = HeadlessDescriptorSet;
    type DescriptorSetLayout = HeadlessDescriptorSetLayout;
    type Sampler = HeadlessSampler;
}

/// Work executed by the simulated GPU when a submission runs
#[derive(Debug)]
pub enum GpuOp {
    CopyBuffer {
        src: Memory,
        dst: Memory,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        src: Memory,
        dst: Memory,
        region: BufferTextureCopy,
        texture: TextureDescription,
    },
    Draw,
    Dispatch,
    Barrier {
        transition: Option<(NativeId, ImageLayout, ImageLayout)>,
    },
}

/// Commands handed over by a command buffer at `end`
#[derive(Debug, Default)]
pub struct RecordedCommands {
    pub ops: Vec<GpuOp>,
    /// Every native object the commands reference
    pub used: Vec<NativeId>,
}

/// One native destruction observed by the simulated driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRecord {
    pub kind: &'static str,
    pub native_id: NativeId,
    /// Last submission serial known complete when the object was freed
    pub completed_serial: u64,
    /// Last submission serial that referenced the object
    pub last_use_serial: Option<u64>,
}

/// Counters that make pacing and deferral observable
#[derive(Debug, Clone, Default)]
pub struct HeadlessStats {
    /// Fence waits issued by `begin_frame`
    pub fence_waits: usize,
    /// Fence waits that found the fence unsignaled and had to block
    pub blocking_fence_waits: usize,
    pub submissions: usize,
    pub immediate_submissions: usize,
    pub presents: usize,
    pub skipped_frames: usize,
    pub swapchain_recreations: usize,
    pub draw_calls: usize,
    pub dispatches: usize,
    pub barriers: usize,
    pub deletions: Vec<DeletionRecord>,
    /// Objects freed while a submission referencing them had not retired
    pub premature_deletions: usize,
    /// Submissions that referenced an already freed object
    pub use_after_free: usize,
}

impl HeadlessStats {
    /// Deletions of one kind
    pub fn deletions_of(&self, kind: &str) -> usize {
        self.deletions.iter().filter(|d| d.kind == kind).count()
    }
}

/// Simulated queue timeline
#[derive(Debug, Default)]
pub struct GpuTimeline {
    pub last_submitted: u64,
    pub completed: u64,
}

impl GpuTimeline {
    /// Allocate the serial of a new submission
    pub fn submit(&mut self) -> u64 {
        self.last_submitted += 1;
        self.last_submitted
    }

    /// Complete everything up to `serial`; returns whether that required waiting
    pub fn wait(&mut self, serial: u64) -> bool {
        let blocked = serial > self.completed;
        self.completed = self.completed.max(serial);
        blocked
    }

    /// Let the GPU finish all submitted work
    pub fn catch_up(&mut self) {
        self.completed = self.last_submitted;
    }
}

/// State shared by the headless device and its command buffers
pub struct HeadlessShared {
    pub resources: ResourcesDatabase<HeadlessResources>,
    pub timeline: GpuTimeline,
    pub stats: HeadlessStats,
    pub recorded: Option<RecordedCommands>,
    live: HashSet<NativeId>,
    last_use: HashMap<NativeId, u64>,
    next_id: NativeId,
}

impl HeadlessShared {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            resources: ResourcesDatabase::new(),
            timeline: GpuTimeline::default(),
            stats: HeadlessStats::default(),
            recorded: None,
            live: HashSet::new(),
            last_use: HashMap::new(),
            next_id: 1,
        }))
    }

    /// Create a simulated native object
    pub fn allocate_native(&mut self) -> NativeId {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        id
    }

    /// Number of native objects not yet freed
    pub fn live_natives(&self) -> usize {
        self.live.len()
    }

    /// Free a native object, checking it is no longer referenced by pending work
    pub fn free_native(&mut self, kind: &'static str, id: NativeId) {
        let last_use_serial = self.last_use.remove(&id);
        if let Some(serial) = last_use_serial {
            if serial > self.timeline.completed {
                log::error!(
                    "{kind} #{id} freed while submission {serial} is still executing (completed {})",
                    self.timeline.completed
                );
                self.stats.premature_deletions += 1;
            }
        }

        self.live.remove(&id);
        self.stats.deletions.push(DeletionRecord {
            kind,
            native_id: id,
            completed_serial: self.timeline.completed,
            last_use_serial,
        });
    }

    /// Run recorded work as submission `serial`
    pub fn execute(&mut self, serial: u64, commands: RecordedCommands) {
        for id in commands.used {
            if !self.live.contains(&id) {
                log::error!("Submission {serial} references freed native object #{id}");
                self.stats.use_after_free += 1;
            }
            self.last_use.insert(id, serial);
        }

        for op in commands.ops {
            match op {
                GpuOp::CopyBuffer { src, dst, src_offset, dst_offset, size } => {
                    let (src_offset, dst_offset, size) =
                        (src_offset as usize, dst_offset as usize, size as usize);
                    if Rc::ptr_eq(&src, &dst) {
                        src.borrow_mut().copy_within(src_offset..src_offset + size, dst_offset);
                    } else {
                        dst.borrow_mut()[dst_offset..dst_offset + size]
                            .copy_from_slice(&src.borrow()[src_offset..src_offset + size]);
                    }
                }
                GpuOp::CopyBufferToTexture { src, dst, region, texture } => {
                    copy_texels(&src.borrow(), &mut dst.borrow_mut(), &region, &texture);
                }
                GpuOp::Draw => self.stats.draw_calls += 1,
                GpuOp::Dispatch => self.stats.dispatches += 1,
                GpuOp::Barrier { .. } => self.stats.barriers += 1,
            }
        }
    }
}

/// Copy tightly packed rows into the base-mip image memory
fn copy_texels(src: &[u8], dst: &mut [u8], region: &BufferTextureCopy, texture: &TextureDescription) {
    let texel = texture.format.texel_size() as usize;
    let [width, height, _] = [texture.width as usize, texture.height as usize, texture.depth as usize];
    let [x, y, z] = region.texture_offset.map(|o| o.max(0) as usize);
    let [w, h, d] = region.extent.map(|e| e as usize);

    let mut src_offset = region.buffer_offset as usize;
    for layer in 0..d {
        for row in 0..h {
            let dst_offset = (((z + layer) * height + y + row) * width + x) * texel;
            let len = w * texel;
            dst[dst_offset..dst_offset + len].copy_from_slice(&src[src_offset..src_offset + len]);
            src_offset += len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_wait_blocks_only_when_behind() {
        let mut timeline = GpuTimeline::default();
        let first = timeline.submit();
        let second = timeline.submit();
        assert!(timeline.wait(first));
        assert!(!timeline.wait(first));
        timeline.catch_up();
        assert!(!timeline.wait(second));
    }

    #[test]
    fn test_premature_free_is_detected() {
        let shared = HeadlessShared::new();
        let mut shared = shared.borrow_mut();
        let id = shared.allocate_native();
        let serial = shared.timeline.submit();
        shared.execute(serial, RecordedCommands { ops: Vec::new(), used: vec![id] });

        shared.free_native("buffer", id);
        assert_eq!(shared.stats.premature_deletions, 1);
        assert_eq!(shared.live_natives(), 0);
    }

    #[test]
    fn test_use_after_free_is_detected() {
        let shared = HeadlessShared::new();
        let mut shared = shared.borrow_mut();
        let id = shared.allocate_native();
        shared.free_native("buffer", id);
        let serial = shared.timeline.submit();
        shared.execute(serial, RecordedCommands { ops: Vec::new(), used: vec![id] });
        assert_eq!(shared.stats.use_after_free, 1);
    }
}
