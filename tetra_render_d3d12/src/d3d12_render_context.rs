/// Dx12RenderContext - RenderContext over one open graphics command list
///
/// Binds only update CPU-side state. Each draw flushes what changed:
/// 1. PSO and primitive topology (cache lookup when shader, scope, mode or face changed)
/// 2. root CBVs of constant slots 1..=4, copied into the frame's constant ring
/// 3. SRV table when texture bindings changed (main target only)
/// 4. slot 0 as root constants
/// 5. vertex/index buffer views, then the draw
///
/// Render mode and face are pending until the next pipeline (re)bind, which
/// happens on `bind_shader` and on every scope begin/end.

use glam::Mat4;
use std::sync::Arc;
use tetra_render::layout::{
    FrameConstants, ObjectConstants, MAX_CONSTANT_SLOTS, MAX_TEXTURE_SLOTS, MAX_VERTEX_STREAMS, SHADOW_MAP_SLOT,
    SLOT_CAMERA, SLOT_TRANSFORM,
};
use tetra_render::resource::WHITE_PIXEL;
use tetra_render::{
    Buffer, BufferDesc, BufferRef, BufferUsage, DirtyFlags, Error, GpuResource, PassKind, PipelineState,
    PrimitiveTopology, RenderContext, RenderFace, RenderMode, ResourceId, ResourceTracker, Result, ScopeStack,
    Shader, ShaderDesc, ShaderRef, TextureData, TextureDesc, TextureFormat, TextureKind, TextureRef,
};

use crate::d3d12_buffer::Dx12Buffer;
use crate::d3d12_constant_ring::ConstantRing;
use crate::d3d12_context::GpuContext;
use crate::d3d12_convert::{hr_init_err, index_format_to_dxgi, primitive_topology_to_d3d};
use crate::d3d12_pipeline::{
    root_signature_desc, PipelineCache, PipelineKey, TargetKind, CBV_SIZES, MAX_CBV_SIZE, ROOT_OBJECT_CONSTANTS,
    ROOT_TEXTURE_TABLE,
};
use crate::d3d12_shader::Dx12Shader;
use crate::d3d12_texture::Dx12Texture;
use crate::device::{ListCommand, NativeHandle};

const SOURCE: &str = "tetra::d3d12::context";

const CONSTANT_SLOTS: usize = MAX_CONSTANT_SLOTS as usize;
const TEXTURE_SLOTS: usize = MAX_TEXTURE_SLOTS as usize;

/// Command list and target currently being recorded
#[derive(Debug, Clone, Copy)]
struct Recording {
    pub list: NativeHandle,
    pub slot: usize,
    pub target: TargetKind,
    pub samples: u32,
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
    offset: u64,
}

/// Per-frame counters merged into `RendererStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub draw_calls: u32,
    pub pipeline_binds: u32,
    /// SRV tables written
    pub descriptor_allocations: u32,
    pub shadow_draws: u32,
}

pub struct Dx12RenderContext {
    gpu: Arc<GpuContext>,
    tracker: ResourceTracker,
    root_signature: NativeHandle,
    pipelines: PipelineCache,
    depth_bias: (f32, f32),

    rings: Vec<ConstantRing>,
    fallback_texture: Option<Arc<Dx12Texture>>,
    shadow_srv: NativeHandle,

    recording: Option<Recording>,
    state: BoundState,
    scopes: ScopeStack<BoundState>,

    requested_mode: RenderMode,
    requested_face: RenderFace,
    mode: RenderMode,
    face: RenderFace,
    dirty: DirtyFlags,
    bound_pipeline: NativeHandle,
    bound_topology: Option<PrimitiveTopology>,

    /// Ring offset of the light camera block while the shadow pass records
    camera_override: Option<u64>,
    ring_cache: [Option<RingEntry>; CONSTANT_SLOTS],
    stats: DrawStats,
}

impl Dx12RenderContext {
    pub(crate) fn new(gpu: Arc<GpuContext>, depth_bias: (f32, f32)) -> Result<Self> {
        let root_signature = gpu
            .device
            .create_root_signature(&root_signature_desc())
            .map_err(|hr| hr_init_err(SOURCE, "Failed to create root signature", hr))?;
        Ok(Self {
            gpu,
            tracker: ResourceTracker::new(),
            root_signature,
            pipelines: PipelineCache::new(),
            depth_bias,
            rings: Vec::new(),
            fallback_texture: None,
            shadow_srv: NativeHandle::NULL,
            recording: None,
            state: BoundState::default(),
            scopes: ScopeStack::new(),
            requested_mode: RenderMode::Solid,
            requested_face: RenderFace::Front,
            mode: RenderMode::Solid,
            face: RenderFace::Front,
            dirty: DirtyFlags::all(),
            bound_pipeline: NativeHandle::NULL,
            bound_topology: None,
            camera_override: None,
            ring_cache: [None; CONSTANT_SLOTS],
            stats: DrawStats::default(),
        })
    }

    // ===== SETUP (renderer only) =====

    /// Constant rings and fallback texture; called from `initialize`
    pub(crate) fn init_frame_resources(&mut self, frames_in_flight: usize, ring_size: u64) -> Result<()> {
        for slot in 0..frames_in_flight {
            let ring = ConstantRing::create(&self.gpu.device, &format!("constant ring {}", slot), ring_size, MAX_CBV_SIZE)?;
            self.rings.push(ring);
        }

        let white = TextureDesc {
            label: "fallback white".to_string(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            data: TextureData::Single(WHITE_PIXEL.to_vec()),
        };
        self.fallback_texture = Some(Dx12Texture::create(&self.gpu, &white, TextureKind::Texture2D)?);

        tetra_render::render_debug!(SOURCE, "{} frame slots, {} byte constant rings", frames_in_flight, ring_size);
        Ok(())
    }

    /// SRV of the depth map sampled at texture slot 4
    pub(crate) fn set_shadow_map(&mut self, srv: NativeHandle) {
        self.shadow_srv = srv;
        self.dirty |= DirtyFlags::TEXTURES;
    }

    pub(crate) fn cached_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    /// Resources created through this context
    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    // ===== FRAME =====

    /// Start recording into `list` for frame slot `slot`
    pub(crate) fn begin_frame(&mut self, list: NativeHandle, slot: usize) -> Result<()> {
        let ring = self
            .rings
            .get_mut(slot)
            .ok_or_else(|| Error::InvalidState(format!("Frame slot {} has no resources", slot)))?;
        ring.reset();
        self.gpu.device.record(list, ListCommand::SetGraphicsRootSignature(self.root_signature));

        self.recording = Some(Recording { list, slot, target: TargetKind::Main, samples: 1 });
        self.state = BoundState::default();
        self.scopes.clear();
        self.camera_override = None;
        self.ring_cache = [None; CONSTANT_SLOTS];
        self.bound_pipeline = NativeHandle::NULL;
        self.bound_topology = None;
        self.dirty = DirtyFlags::all();
        self.stats = DrawStats::default();
        Ok(())
    }

    /// Switch recording to the depth-only target; draws use `shader`'s vertex
    /// stage and see the light matrix as their camera
    pub(crate) fn begin_shadow_pass(&mut self, shader: &ShaderRef, light_view_projection: Mat4) -> Result<()> {
        Dx12Shader::from_handle(shader)?;
        let recording = self.require_recording("begin_shadow_pass")?;
        let constants = FrameConstants::for_light(light_view_projection);
        let offset = self.rings[recording.slot].write(bytemuck::bytes_of(&constants))?;

        self.open_scope(PassKind::Shadow);
        self.state.shader = Some(Arc::clone(shader));
        self.camera_override = Some(offset);
        self.set_target(TargetKind::Shadow, 1);
        Ok(())
    }

    pub(crate) fn end_shadow_pass(&mut self) -> Result<()> {
        self.close_scope(PassKind::Shadow)?;
        self.camera_override = None;
        Ok(())
    }

    /// Main color target begins; textures see the freshly rendered shadow map
    pub(crate) fn begin_main_pass(&mut self, samples: u32) {
        self.set_target(TargetKind::Main, samples);
    }

    /// Stop recording; returns this frame's counters
    pub(crate) fn end_frame(&mut self) -> DrawStats {
        let leaked = self.scopes.clear();
        if leaked > 0 {
            tetra_render::render_warn!(SOURCE, "{} pass scope(s) left open at frame end", leaked);
        }
        self.recording = None;
        self.camera_override = None;
        self.stats
    }

    /// Forget the recording after a failed frame
    pub(crate) fn abandon_frame(&mut self) {
        self.scopes.clear();
        self.recording = None;
        self.camera_override = None;
    }

    fn set_target(&mut self, target: TargetKind, samples: u32) {
        if let Some(recording) = self.recording.as_mut() {
            recording.target = target;
            recording.samples = samples;
        }
        self.bound_pipeline = NativeHandle::NULL;
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
        if !self.dirty.contains(DirtyFlags::PIPELINE) && !self.bound_pipeline.is_null() {
            return Ok(());
        }
        let shader = Dx12Shader::from_handle(shader_ref)?;
        let raster = self.state.pipeline.raster_key(self.mode, self.face, shader.layout());
        let key = PipelineKey { shader: shader.id, raster, target: recording.target, samples: recording.samples };
        let pipeline = self.pipelines.get_or_create(
            self.gpu.device.as_ref(),
            key,
            shader,
            self.root_signature,
            self.depth_bias,
        )?;

        let device = self.gpu.device.as_ref();
        if pipeline != self.bound_pipeline {
            device.record(recording.list, ListCommand::SetPipelineState(pipeline));
            self.bound_pipeline = pipeline;
            self.stats.pipeline_binds += 1;
        }
        if self.bound_topology != Some(raster.topology) {
            device.record(recording.list, ListCommand::SetPrimitiveTopology(primitive_topology_to_d3d(raster.topology)));
            self.bound_topology = Some(raster.topology);
        }
        self.dirty.remove(DirtyFlags::PIPELINE);
        Ok(())
    }

    /// Ring offset of constant slot `slot` (1..=4); the zero page when unbound
    fn constant_offset(&mut self, slot: usize, frame: usize) -> Result<u64> {
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
        let buffer = Dx12Buffer::from_handle(&handle, BufferUsage::Constant)?;
        let host = buffer
            .host_data()
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "Constant buffer '{}' has no host copy", handle.label()))?;

        let generation = host.generation();
        if let Some(entry) = self.ring_cache[slot] {
            if entry.buffer == buffer.id && entry.generation == generation {
                return Ok(entry.offset);
            }
        }
        let offset = self.rings[frame].copy_host(host, CBV_SIZES[slot - 1])?;
        self.ring_cache[slot] = Some(RingEntry { buffer: buffer.id, generation, offset });
        Ok(offset)
    }

    fn flush_constants(&mut self, recording: &Recording) -> Result<()> {
        let ring = self.rings[recording.slot].resource;
        for slot in 1..CONSTANT_SLOTS {
            let offset = self.constant_offset(slot, recording.slot)?;
            self.gpu.device.record(
                recording.list,
                ListCommand::SetGraphicsRootConstantBufferView { parameter: slot as u32, resource: ring, offset },
            );
        }

        let mut object = ObjectConstants::default();
        if let Some(handle) = &self.state.constant_buffers[SLOT_TRANSFORM as usize] {
            if handle.is_alive() {
                if let Some(host) = Dx12Buffer::from_handle(handle, BufferUsage::Constant)?.host_data() {
                    host.copy_into(bytemuck::bytes_of_mut(&mut object));
                }
            }
        }
        self.gpu.device.record(
            recording.list,
            ListCommand::SetGraphicsRoot32BitConstants {
                parameter: ROOT_OBJECT_CONSTANTS,
                data: bytemuck::bytes_of(&object).to_vec(),
            },
        );
        self.dirty.remove(DirtyFlags::CONSTANTS);
        Ok(())
    }

    fn flush_textures(&mut self, recording: &Recording) -> Result<()> {
        if recording.target != TargetKind::Main || !self.dirty.contains(DirtyFlags::TEXTURES) {
            return Ok(());
        }
        let fallback = self
            .fallback_texture
            .as_ref()
            .map(|texture| texture.srv)
            .ok_or_else(|| Error::InvalidState("Fallback texture missing; renderer not initialized".to_string()))?;

        let mut views = Vec::with_capacity(TEXTURE_SLOTS + 1);
        for texture in &self.state.textures {
            let view = match texture {
                Some(handle) if handle.is_alive() => Dx12Texture::from_handle(handle)?.srv,
                _ => fallback,
            };
            views.push(view);
        }
        views.push(if self.shadow_srv.is_null() { fallback } else { self.shadow_srv });

        self.gpu.device.record(
            recording.list,
            ListCommand::SetGraphicsRootDescriptorTable { parameter: ROOT_TEXTURE_TABLE, views },
        );
        self.stats.descriptor_allocations += 1;
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
        let vertices = Dx12Buffer::from_handle(vertex_buffer, BufferUsage::Vertex)?;
        let indices = index_buffer
            .map(|buffer| Dx12Buffer::from_handle(buffer, BufferUsage::Index))
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

        let device = self.gpu.device.as_ref();
        let list = recording.list;
        let native_vertices = vertices
            .resource()
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "Vertex buffer '{}' has no GPU storage", vertices.label()))?;
        device.record(
            list,
            ListCommand::SetVertexBuffer { slot: 0, buffer: native_vertices, stride: vertices.stride(), size: vertices.size() },
        );
        if let Some(extra) = self.state.extra_stream.as_ref().filter(|b| b.is_alive()) {
            let extra = Dx12Buffer::from_handle(extra, BufferUsage::Vertex)?;
            if let Some(native) = extra.resource() {
                device.record(
                    list,
                    ListCommand::SetVertexBuffer { slot: 1, buffer: native, stride: extra.stride(), size: extra.size() },
                );
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
                let native_indices = indices.resource().ok_or_else(|| {
                    tetra_render::render_err!(SOURCE, "Index buffer '{}' has no GPU storage", indices.label())
                })?;
                device.record(
                    list,
                    ListCommand::SetIndexBuffer {
                        buffer: native_indices,
                        format: index_format_to_dxgi(format),
                        size: indices.size(),
                    },
                );
                device.record(list, ListCommand::DrawIndexedInstanced { index_count: count, instance_count: instances });
            }
            None => device.record(list, ListCommand::DrawInstanced { vertex_count: count, instance_count: instances }),
        }

        self.stats.draw_calls += 1;
        if recording.target == TargetKind::Shadow {
            self.stats.shadow_draws += 1;
        }
        tetra_render::render_trace!(SOURCE, "draw {} x{} ({:?})", count, instances, recording.target);
        Ok(())
    }

    // ===== TEARDOWN (renderer only) =====

    /// Release every native object the context owns; GPU must be idle
    pub(crate) fn destroy(&mut self) {
        for mut ring in self.rings.drain(..) {
            ring.destroy();
        }
        self.pipelines.clear(self.gpu.device.as_ref());
        if !self.root_signature.is_null() {
            self.gpu.device.release(self.root_signature);
            self.root_signature = NativeHandle::NULL;
        }
        if let Some(texture) = self.fallback_texture.take() {
            texture.cleanup();
        }
        let released = self.tracker.cleanup_all();
        if released > 0 {
            tetra_render::render_info!(SOURCE, "Released {} resource(s) still held by the application", released);
        }
        self.shadow_srv = NativeHandle::NULL;
        self.state = BoundState::default();
        self.scopes.clear();
    }
}

impl RenderContext for Dx12RenderContext {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferRef> {
        let buffer = Dx12Buffer::create(&self.gpu, desc)?;
        self.tracker.track(&buffer);
        Ok(buffer)
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderRef> {
        self.gpu.require_alive("create_shader")?;
        let shader = Arc::new(Dx12Shader::create(desc)?);
        self.tracker.track(&shader);
        Ok(shader)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef> {
        let texture = Dx12Texture::create(&self.gpu, desc, TextureKind::Texture2D)?;
        self.tracker.track(&texture);
        Ok(texture)
    }

    fn create_cubemap_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef> {
        let texture = Dx12Texture::create(&self.gpu, desc, TextureKind::Cubemap)?;
        self.tracker.track(&texture);
        Ok(texture)
    }

    fn bind_vertex_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        Dx12Buffer::from_handle(buffer, BufferUsage::Vertex)?;
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
        Dx12Buffer::from_handle(buffer, BufferUsage::Index)?;
        if slot != 0 {
            return Err(tetra_render::render_warn_err!(SOURCE, "Index buffer slot {} out of range", slot));
        }
        self.state.index_buffer = Some(Arc::clone(buffer));
        Ok(())
    }

    fn bind_constant_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        Dx12Buffer::from_handle(buffer, BufferUsage::Constant)?;
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
        Dx12Texture::from_handle(texture)?;
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
        Dx12Shader::from_handle(shader)?;
        self.state.shader = Some(Arc::clone(shader));
        self.apply_pending_raster();
        Ok(())
    }

    fn update_constant_buffer(&mut self, buffer: &BufferRef, data: &[u8]) -> Result<()> {
        Dx12Buffer::from_handle(buffer, BufferUsage::Constant)?;
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
