/// VulkanRenderContext - RenderContext over one recording command buffer
///
/// Binds only update CPU-side state. Each draw flushes what changed:
/// 1. pipeline (looked up in the cache when shader, scope, mode or face changed)
/// 2. set 0 with dynamic offsets of constant slots 1..=4 copied into the ring
/// 3. set 1 (textures) when texture bindings changed
/// 4. slot 0 as push constants
/// 5. geometry, then the draw itself
///
/// Render mode and face are pending until the next pipeline (re)bind, which
/// happens on `bind_shader` and on every scope begin/end.

use ash::vk;
use glam::Mat4;
use std::sync::Arc;
use tetra_render::layout::{
    FrameConstants, ObjectConstants, MAX_CONSTANT_SLOTS, MAX_TEXTURE_SLOTS, MAX_VERTEX_STREAMS, SHADOW_MAP_SLOT,
    SLOT_CAMERA, SLOT_TRANSFORM,
};
use tetra_render::resource::WHITE_PIXEL;
use tetra_render::{
    Buffer, BufferDesc, BufferRef, BufferUsage, DirtyFlags, Error, GpuResource, PassKind, PipelineState,
    RenderContext, RenderFace, RenderMode, ResourceId, ResourceTracker, Result, ScopeStack, Shader, ShaderDesc,
    ShaderRef, Texture, TextureDesc, TextureFormat, TextureKind, TextureRef, TextureData,
};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::{index_type_to_vk, vk_err};
use crate::vulkan_descriptors::{create_uniform_pool, DescriptorAllocator};
use crate::vulkan_pipeline::{
    PipelineCache, PipelineFeatures, PipelineKey, PipelineLayouts, TargetKind, MAX_UNIFORM_RANGE, TEXTURE_BINDINGS,
    UNIFORM_RANGES,
};
use crate::vulkan_sampler::{SamplerCache, SamplerKind};
use crate::vulkan_shader::VulkanShader;
use crate::vulkan_texture::VulkanTexture;
use crate::vulkan_uniform_ring::UniformRing;

const SOURCE: &str = "tetra::vulkan::context";

const CONSTANT_SLOTS: usize = MAX_CONSTANT_SLOTS as usize;
const TEXTURE_SLOTS: usize = MAX_TEXTURE_SLOTS as usize;

/// Command buffer and pass currently being recorded
#[derive(Debug, Clone, Copy)]
pub(crate) struct Recording {
    pub command_buffer: vk::CommandBuffer,
    pub slot: usize,
    pub target: TargetKind,
    pub render_pass: vk::RenderPass,
    pub samples: u32,
}

/// Per frame-in-flight resources, reused once the slot's fence was waited
struct FrameResources {
    ring: UniformRing,
    uniform_set: vk::DescriptorSet,
    texture_sets: DescriptorAllocator,
}

/// Everything a scope snapshots and restores
#[derive(Clone, Default)]
struct BoundState {
    shader: Option<ShaderRef>,
    constant_buffers: [Option<BufferRef>; CONSTANT_SLOTS],
    textures: [Option<TextureRef>; TEXTURE_SLOTS],
    /// Vertex stream 1; stream 0 comes with each draw
    extra_stream: Option<BufferRef>,
    index_buffer: Option<BufferRef>,
    pipeline: PipelineState,
}

/// Ring copy of a constant buffer made earlier this frame
#[derive(Debug, Clone, Copy)]
struct RingEntry {
    buffer: ResourceId,
    generation: u64,
    offset: u32,
}

/// Per-frame counters merged into `RendererStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub draw_calls: u32,
    pub pipeline_binds: u32,
    pub descriptor_allocations: u32,
    pub shadow_draws: u32,
}

pub struct VulkanRenderContext {
    gpu: Arc<GpuContext>,
    tracker: ResourceTracker,
    layouts: PipelineLayouts,
    pipelines: PipelineCache,
    samplers: SamplerCache,
    features: PipelineFeatures,

    uniform_pool: vk::DescriptorPool,
    frames: Vec<FrameResources>,
    fallback_texture: Option<Arc<VulkanTexture>>,
    shadow_view: vk::ImageView,

    recording: Option<Recording>,
    state: BoundState,
    scopes: ScopeStack<BoundState>,

    requested_mode: RenderMode,
    requested_face: RenderFace,
    mode: RenderMode,
    face: RenderFace,
    dirty: DirtyFlags,
    bound_pipeline: vk::Pipeline,

    /// Ring offset of the light camera block while the shadow pass records
    camera_override: Option<u32>,
    ring_cache: [Option<RingEntry>; CONSTANT_SLOTS],
    stats: DrawStats,
}

impl VulkanRenderContext {
    pub(crate) fn new(gpu: Arc<GpuContext>, features: PipelineFeatures) -> Result<Self> {
        let layouts = PipelineLayouts::create(&gpu.device)?;
        Ok(Self {
            gpu,
            tracker: ResourceTracker::new(),
            layouts,
            pipelines: PipelineCache::new(),
            samplers: SamplerCache::new(),
            features,
            uniform_pool: vk::DescriptorPool::null(),
            frames: Vec::new(),
            fallback_texture: None,
            shadow_view: vk::ImageView::null(),
            recording: None,
            state: BoundState::default(),
            scopes: ScopeStack::new(),
            requested_mode: RenderMode::Solid,
            requested_face: RenderFace::Front,
            mode: RenderMode::Solid,
            face: RenderFace::Front,
            dirty: DirtyFlags::all(),
            bound_pipeline: vk::Pipeline::null(),
            camera_override: None,
            ring_cache: [None; CONSTANT_SLOTS],
            stats: DrawStats::default(),
        })
    }

    // ===== SETUP (renderer only) =====

    /// Rings, descriptor pools and fallback texture; called from `initialize`
    pub(crate) fn init_frame_resources(&mut self, frames_in_flight: usize, ring_size: u64) -> Result<()> {
        let device = &self.gpu.device;
        self.uniform_pool = create_uniform_pool(device, frames_in_flight as u32, MAX_CONSTANT_SLOTS - 1)?;

        for slot in 0..frames_in_flight {
            let ring = UniformRing::create(&self.gpu, &format!("uniform ring {}", slot), ring_size, MAX_UNIFORM_RANGE)?;
            let layouts = [self.layouts.uniform_set];
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(self.uniform_pool)
                .set_layouts(&layouts);
            let uniform_set = match unsafe { device.allocate_descriptor_sets(&allocate_info) } {
                Ok(sets) => sets[0],
                Err(e) => {
                    let mut ring = ring;
                    ring.destroy(&self.gpu);
                    return Err(vk_err(SOURCE, "Failed to allocate uniform descriptor set", e));
                }
            };

            let buffer_infos: Vec<vk::DescriptorBufferInfo> = UNIFORM_RANGES
                .iter()
                .map(|&range| vk::DescriptorBufferInfo::default().buffer(ring.buffer).offset(0).range(range))
                .collect();
            let writes: Vec<vk::WriteDescriptorSet> = buffer_infos
                .iter()
                .enumerate()
                .map(|(index, info)| {
                    vk::WriteDescriptorSet::default()
                        .dst_set(uniform_set)
                        .dst_binding(index as u32 + 1)
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                        .buffer_info(std::slice::from_ref(info))
                })
                .collect();
            unsafe { device.update_descriptor_sets(&writes, &[]) };

            let texture_sets = match DescriptorAllocator::new(device, TEXTURE_BINDINGS) {
                Ok(allocator) => allocator,
                Err(e) => {
                    let mut ring = ring;
                    ring.destroy(&self.gpu);
                    return Err(e);
                }
            };
            self.frames.push(FrameResources { ring, uniform_set, texture_sets });
        }

        let white = TextureDesc {
            label: "fallback white".to_string(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            data: TextureData::Single(WHITE_PIXEL.to_vec()),
        };
        self.fallback_texture = Some(VulkanTexture::create(&self.gpu, &white, TextureKind::Texture2D)?);

        tetra_render::render_debug!(
            SOURCE,
            "{} frame slots, {} byte uniform rings",
            frames_in_flight, ring_size
        );
        Ok(())
    }

    /// Depth view sampled at texture slot 4
    pub(crate) fn set_shadow_map(&mut self, view: vk::ImageView) {
        self.shadow_view = view;
        self.dirty |= DirtyFlags::TEXTURES;
    }

    /// Drop cached pipelines (render pass or sample count changed)
    pub(crate) fn clear_pipelines(&mut self) {
        self.pipelines.clear(&self.gpu.device);
        self.bound_pipeline = vk::Pipeline::null();
        self.dirty |= DirtyFlags::PIPELINE;
    }

    pub(crate) fn cached_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    // ===== FRAME =====

    /// Start recording into `command_buffer` for frame slot `slot`
    pub(crate) fn begin_frame(&mut self, command_buffer: vk::CommandBuffer, slot: usize) -> Result<()> {
        let frame = self
            .frames
            .get_mut(slot)
            .ok_or_else(|| Error::InvalidState(format!("Frame slot {} has no resources", slot)))?;
        frame.ring.reset();
        frame.texture_sets.reset(&self.gpu.device)?;

        self.recording = Some(Recording {
            command_buffer,
            slot,
            target: TargetKind::Main,
            render_pass: vk::RenderPass::null(),
            samples: 1,
        });
        self.state = BoundState::default();
        self.scopes.clear();
        self.camera_override = None;
        self.ring_cache = [None; CONSTANT_SLOTS];
        self.bound_pipeline = vk::Pipeline::null();
        self.dirty = DirtyFlags::all();
        self.stats = DrawStats::default();
        Ok(())
    }

    /// Switch recording to the depth-only pass; draws use `shader`'s vertex
    /// stage and see the light matrix as their camera
    pub(crate) fn begin_shadow_pass(
        &mut self,
        render_pass: vk::RenderPass,
        shader: &ShaderRef,
        light_view_projection: Mat4,
    ) -> Result<()> {
        VulkanShader::from_handle(shader)?;
        let recording = self.require_recording("begin_shadow_pass")?;
        let constants = FrameConstants::for_light(light_view_projection);
        let offset = self.frames[recording.slot].ring.write(bytemuck::bytes_of(&constants))?;

        self.open_scope(PassKind::Shadow);
        self.state.shader = Some(Arc::clone(shader));
        self.camera_override = Some(offset as u32);
        self.set_target(TargetKind::Shadow, render_pass, 1);
        Ok(())
    }

    pub(crate) fn end_shadow_pass(&mut self) -> Result<()> {
        self.close_scope(PassKind::Shadow)?;
        self.camera_override = None;
        Ok(())
    }

    /// Main color pass begins; textures see the freshly rendered shadow map
    pub(crate) fn begin_main_pass(&mut self, render_pass: vk::RenderPass, samples: u32) {
        self.set_target(TargetKind::Main, render_pass, samples);
    }

    /// Stop recording; returns this frame's counters
    pub(crate) fn end_frame(&mut self) -> DrawStats {
        let leaked = self.scopes.clear();
        if leaked > 0 {
            tetra_render::render_warn!(SOURCE, "{} pass scope(s) left open at frame end", leaked);
        }
        self.recording = None;
        self.camera_override = None;
        self.stats.descriptor_allocations = self
            .frames
            .iter_mut()
            .map(|frame| frame.texture_sets.take_allocations())
            .sum();
        self.stats
    }

    /// Forget the recording after a failed frame
    pub(crate) fn abandon_frame(&mut self) {
        self.scopes.clear();
        self.recording = None;
        self.camera_override = None;
    }

    fn set_target(&mut self, target: TargetKind, render_pass: vk::RenderPass, samples: u32) {
        if let Some(recording) = self.recording.as_mut() {
            recording.target = target;
            recording.render_pass = render_pass;
            recording.samples = samples;
        }
        self.bound_pipeline = vk::Pipeline::null();
        self.dirty = DirtyFlags::all();
    }

    fn require_recording(&self, operation: &str) -> Result<Recording> {
        self.recording.ok_or_else(|| {
            Error::InvalidState(format!("{} outside begin_render/end_render", operation))
        })
    }

    // ===== SCOPES =====

    fn apply_pending_raster(&mut self) {
        if self.dirty.contains(DirtyFlags::RASTER_PENDING) {
            self.mode = self.requested_mode;
            self.face = self.requested_face;
            self.dirty.remove(DirtyFlags::RASTER_PENDING);
        }
        self.dirty |= DirtyFlags::PIPELINE;
    }

    fn open_scope(&mut self, kind: PassKind) {
        self.scopes.push(kind, self.state.clone());
        self.state.pipeline = PipelineState::for_pass(kind);
        self.apply_pending_raster();
        self.dirty = DirtyFlags::all() - DirtyFlags::RASTER_PENDING;
    }

    fn close_scope(&mut self, kind: PassKind) -> Result<()> {
        self.state = self.scopes.pop(kind)?;
        self.apply_pending_raster();
        self.dirty = DirtyFlags::all() - DirtyFlags::RASTER_PENDING;
        Ok(())
    }

    // ===== DRAW =====

    fn flush_pipeline(&mut self, recording: &Recording, shader_ref: &ShaderRef) -> Result<()> {
        if !self.dirty.contains(DirtyFlags::PIPELINE) && self.bound_pipeline != vk::Pipeline::null() {
            return Ok(());
        }
        let shader = VulkanShader::from_handle(shader_ref)?;
        let key = PipelineKey {
            shader: shader.id,
            raster: self.state.pipeline.raster_key(self.mode, self.face, shader.layout()),
            target: recording.target,
            samples: recording.samples,
        };
        let pipeline = self.pipelines.get_or_create(
            &self.gpu.device,
            key,
            shader,
            self.layouts.layout,
            recording.render_pass,
            &self.features,
        )?;
        if pipeline != self.bound_pipeline {
            unsafe {
                self.gpu
                    .device
                    .cmd_bind_pipeline(recording.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
            }
            self.bound_pipeline = pipeline;
            self.stats.pipeline_binds += 1;
        }
        self.dirty.remove(DirtyFlags::PIPELINE);
        Ok(())
    }

    /// Ring offset of constant slot `slot` (1..=4); the zero page when unbound
    fn constant_offset(&mut self, slot: usize, frame: usize) -> Result<u32> {
        if slot == SLOT_CAMERA as usize {
            if let Some(offset) = self.camera_override {
                return Ok(offset);
            }
        }
        let Some(handle) = self.state.constant_buffers[slot].clone() else {
            return Ok(0);
        };
        if !handle.is_alive() {
            return Ok(0);
        }
        let buffer = VulkanBuffer::from_handle(&handle, BufferUsage::Constant)?;
        let host = buffer
            .host_data()
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "Constant buffer '{}' has no host copy", handle.label()))?;

        let generation = host.generation();
        if let Some(entry) = self.ring_cache[slot] {
            if entry.buffer == buffer.id && entry.generation == generation {
                return Ok(entry.offset);
            }
        }
        let offset = self.frames[frame].ring.copy_host(host, UNIFORM_RANGES[slot - 1])? as u32;
        self.ring_cache[slot] = Some(RingEntry { buffer: buffer.id, generation, offset });
        Ok(offset)
    }

    fn flush_constants(&mut self, recording: &Recording) -> Result<()> {
        let mut offsets = [0u32; CONSTANT_SLOTS - 1];
        for slot in 1..CONSTANT_SLOTS {
            offsets[slot - 1] = self.constant_offset(slot, recording.slot)?;
        }

        let mut push = ObjectConstants::default();
        if let Some(handle) = &self.state.constant_buffers[SLOT_TRANSFORM as usize] {
            if handle.is_alive() {
                if let Some(host) = VulkanBuffer::from_handle(handle, BufferUsage::Constant)?.host_data() {
                    host.copy_into(bytemuck::bytes_of_mut(&mut push));
                }
            }
        }

        let device = &self.gpu.device;
        unsafe {
            device.cmd_bind_descriptor_sets(
                recording.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.layouts.layout,
                0,
                &[self.frames[recording.slot].uniform_set],
                &offsets,
            );
            device.cmd_push_constants(
                recording.command_buffer,
                self.layouts.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push),
            );
        }
        self.dirty.remove(DirtyFlags::CONSTANTS);
        Ok(())
    }

    fn flush_textures(&mut self, recording: &Recording) -> Result<()> {
        if recording.target != TargetKind::Main || !self.dirty.contains(DirtyFlags::TEXTURES) {
            return Ok(());
        }
        let fallback = self
            .fallback_texture
            .clone()
            .ok_or_else(|| Error::InvalidState("Fallback texture missing; renderer not initialized".to_string()))?;
        let gpu = Arc::clone(&self.gpu);

        let bound = self.state.textures.clone();
        let mut image_infos = Vec::with_capacity(TEXTURE_BINDINGS as usize);
        for texture in &bound {
            let (view, kind) = match texture {
                Some(handle) if handle.is_alive() => {
                    let texture = VulkanTexture::from_handle(handle)?;
                    (texture.view, texture.kind())
                }
                _ => (fallback.view, TextureKind::Texture2D),
            };
            image_infos.push(
                vk::DescriptorImageInfo::default()
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .image_view(view)
                    .sampler(self.samplers.get(&gpu, SamplerKind::for_texture(kind))?),
            );
        }
        image_infos.push(
            vk::DescriptorImageInfo::default()
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
                .image_view(self.shadow_view)
                .sampler(self.samplers.get(&gpu, SamplerKind::Shadow)?),
        );

        let set = self.frames[recording.slot].texture_sets.allocate(&gpu.device, self.layouts.texture_set)?;
        let writes: Vec<vk::WriteDescriptorSet> = image_infos
            .iter()
            .enumerate()
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info))
            })
            .collect();
        unsafe {
            gpu.device.update_descriptor_sets(&writes, &[]);
            gpu.device.cmd_bind_descriptor_sets(
                recording.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.layouts.layout,
                1,
                &[set],
                &[],
            );
        }
        self.dirty.remove(DirtyFlags::TEXTURES);
        Ok(())
    }

    fn issue_draw(
        &mut self,
        vertex_buffer: &BufferRef,
        index_buffer: Option<&BufferRef>,
        count: u32,
        instances: u32,
    ) -> Result<()> {
        let recording = self.require_recording("draw")?;
        let vertices = VulkanBuffer::from_handle(vertex_buffer, BufferUsage::Vertex)?;
        let indices = index_buffer
            .map(|buffer| VulkanBuffer::from_handle(buffer, BufferUsage::Index))
            .transpose()?;
        let shader = self
            .state
            .shader
            .clone()
            .ok_or_else(|| Error::InvalidState("Draw without a bound shader".to_string()))?;

        if self.state.index_buffer.as_ref().is_some_and(|b| !b.is_alive()) {
            self.state.index_buffer = None;
        }

        self.flush_pipeline(&recording, &shader)?;
        self.flush_constants(&recording)?;
        self.flush_textures(&recording)?;

        let device = &self.gpu.device;
        let command_buffer = recording.command_buffer;
        let vk_vertices = vertices
            .vk_buffer()
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "Vertex buffer '{}' has no GPU storage", vertices.label()))?;

        unsafe {
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[vk_vertices], &[0]);
            if let Some(extra) = self.state.extra_stream.as_ref().filter(|b| b.is_alive()) {
                if let Some(vk_extra) = VulkanBuffer::from_handle(extra, BufferUsage::Vertex)?.vk_buffer() {
                    device.cmd_bind_vertex_buffers(command_buffer, 1, &[vk_extra], &[0]);
                }
            }

            match indices {
                Some(indices) => {
                    let format = indices.index_format().ok_or_else(|| {
                        tetra_render::render_warn_err!(
                            SOURCE,
                            "Index buffer '{}' has stride {}, expected 2 or 4",
                            indices.label(), indices.stride()
                        )
                    })?;
                    let vk_indices = indices.vk_buffer().ok_or_else(|| {
                        tetra_render::render_err!(SOURCE, "Index buffer '{}' has no GPU storage", indices.label())
                    })?;
                    device.cmd_bind_index_buffer(command_buffer, vk_indices, 0, index_type_to_vk(format));
                    device.cmd_draw_indexed(command_buffer, count, instances, 0, 0, 0);
                }
                None => device.cmd_draw(command_buffer, count, instances, 0, 0),
            }
        }

        self.stats.draw_calls += 1;
        if recording.target == TargetKind::Shadow {
            self.stats.shadow_draws += 1;
        }
        tetra_render::render_trace!(SOURCE, "draw {} x{} ({:?})", count, instances, recording.target);
        Ok(())
    }

    // ===== TEARDOWN (renderer only) =====

    /// Release every GPU object the context owns; device must be idle
    pub(crate) fn destroy(&mut self) {
        let device = &self.gpu.device;
        for mut frame in self.frames.drain(..) {
            frame.texture_sets.destroy(device);
            frame.ring.destroy(&self.gpu);
        }
        if self.uniform_pool != vk::DescriptorPool::null() {
            unsafe { device.destroy_descriptor_pool(self.uniform_pool, None) };
            self.uniform_pool = vk::DescriptorPool::null();
        }
        self.pipelines.clear(device);
        self.layouts.destroy(device);
        self.samplers.shutdown(&self.gpu);
        if let Some(texture) = self.fallback_texture.take() {
            texture.cleanup();
        }
        let released = self.tracker.cleanup_all();
        if released > 0 {
            tetra_render::render_info!(SOURCE, "Released {} resource(s) still held by the application", released);
        }
        self.state = BoundState::default();
        self.scopes.clear();
    }
}

impl RenderContext for VulkanRenderContext {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferRef> {
        let buffer = VulkanBuffer::create(&self.gpu, desc)?;
        self.tracker.track(&buffer);
        Ok(buffer)
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderRef> {
        let shader = VulkanShader::create(&self.gpu, desc)?;
        self.tracker.track(&shader);
        Ok(shader)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef> {
        let texture = VulkanTexture::create(&self.gpu, desc, TextureKind::Texture2D)?;
        self.tracker.track(&texture);
        Ok(texture)
    }

    fn create_cubemap_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef> {
        let texture = VulkanTexture::create(&self.gpu, desc, TextureKind::Cubemap)?;
        self.tracker.track(&texture);
        Ok(texture)
    }

    fn bind_vertex_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        VulkanBuffer::from_handle(buffer, BufferUsage::Vertex)?;
        match slot {
            0 => {
                tetra_render::render_trace!(SOURCE, "Stream 0 is supplied by each draw; bind of '{}' ignored", buffer.label());
            }
            s if s < MAX_VERTEX_STREAMS => {
                self.state.extra_stream = Some(Arc::clone(buffer));
                self.dirty |= DirtyFlags::VERTEX_STREAMS;
            }
            _ => {
                return Err(tetra_render::render_warn_err!(SOURCE, "Vertex stream {} out of range", slot));
            }
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        VulkanBuffer::from_handle(buffer, BufferUsage::Index)?;
        if slot != 0 {
            return Err(tetra_render::render_warn_err!(SOURCE, "Index buffer slot {} out of range", slot));
        }
        self.state.index_buffer = Some(Arc::clone(buffer));
        Ok(())
    }

    fn bind_constant_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        VulkanBuffer::from_handle(buffer, BufferUsage::Constant)?;
        let entry = self
            .state
            .constant_buffers
            .get_mut(slot as usize)
            .ok_or_else(|| tetra_render::render_warn_err!(SOURCE, "Constant buffer slot {} out of range", slot))?;
        *entry = Some(Arc::clone(buffer));
        self.dirty |= DirtyFlags::CONSTANTS;
        Ok(())
    }

    fn bind_texture(&mut self, texture: &TextureRef, slot: u32) -> Result<()> {
        VulkanTexture::from_handle(texture)?;
        if slot == SHADOW_MAP_SLOT {
            return Err(tetra_render::render_warn_err!(SOURCE, "Texture slot {} is reserved for the shadow map", slot));
        }
        let entry = self
            .state
            .textures
            .get_mut(slot as usize)
            .ok_or_else(|| tetra_render::render_warn_err!(SOURCE, "Texture slot {} out of range", slot))?;
        *entry = Some(Arc::clone(texture));
        self.dirty |= DirtyFlags::TEXTURES;
        Ok(())
    }

    fn bind_shader(&mut self, shader: &ShaderRef) -> Result<()> {
        VulkanShader::from_handle(shader)?;
        self.state.shader = Some(Arc::clone(shader));
        self.apply_pending_raster();
        Ok(())
    }

    fn update_constant_buffer(&mut self, buffer: &BufferRef, data: &[u8]) -> Result<()> {
        VulkanBuffer::from_handle(buffer, BufferUsage::Constant)?;
        buffer.update(0, data)
    }

    fn set_render_mode(&mut self, mode: RenderMode) {
        self.requested_mode = mode;
        self.dirty |= DirtyFlags::RASTER_PENDING;
    }

    fn set_render_face(&mut self, face: RenderFace) {
        self.requested_face = face;
        self.dirty |= DirtyFlags::RASTER_PENDING;
    }

    fn draw(&mut self, vertex_buffer: &BufferRef, vertex_count: u32) -> Result<()> {
        self.issue_draw(vertex_buffer, None, vertex_count, 1)
    }

    fn draw_indexed(&mut self, vertex_buffer: &BufferRef, index_buffer: &BufferRef, index_count: u32) -> Result<()> {
        self.issue_draw(vertex_buffer, Some(index_buffer), index_count, 1)
    }

    fn draw_instanced(&mut self, vertex_buffer: &BufferRef, vertex_count: u32, instance_count: u32) -> Result<()> {
        self.issue_draw(vertex_buffer, None, vertex_count, instance_count)
    }

    fn draw_indexed_instanced(
        &mut self,
        vertex_buffer: &BufferRef,
        index_buffer: &BufferRef,
        index_count: u32,
        instance_count: u32,
    ) -> Result<()> {
        self.issue_draw(vertex_buffer, Some(index_buffer), index_count, instance_count)
    }

    fn begin_skybox_pass(&mut self) -> Result<()> {
        self.open_scope(PassKind::Skybox);
        Ok(())
    }

    fn end_skybox_pass(&mut self) -> Result<()> {
        self.close_scope(PassKind::Skybox)
    }

    fn begin_skinned_pass(&mut self) -> Result<()> {
        self.open_scope(PassKind::Skinned);
        Ok(())
    }

    fn end_skinned_pass(&mut self) -> Result<()> {
        self.close_scope(PassKind::Skinned)
    }

    fn begin_debug_line_pass(&mut self) -> Result<()> {
        self.open_scope(PassKind::DebugLine);
        Ok(())
    }

    fn end_debug_line_pass(&mut self) -> Result<()> {
        self.close_scope(PassKind::DebugLine)
    }
}
