/// Dx11RenderContext - RenderContext over the D3D11 immediate context
///
/// Every bind reaches the device as it happens: constant buffers to VS and
/// PS, textures as SRVs, render mode and face as a cached rasterizer state.
/// Scopes swap the fixed-function state on begin and rebind the restored
/// snapshot on end. Outside a frame binds only update CPU-side state; the
/// next `begin_frame` sends all of it.
///
/// Handles that expire after being bound are dropped from the bindings at
/// the next draw: constant slots are unbound and texture slots fall back to
/// the white texture.

use std::sync::Arc;
use tetra_render::layout::{MAX_CONSTANT_SLOTS, MAX_TEXTURE_SLOTS, MAX_VERTEX_STREAMS, SHADOW_MAP_SLOT};
use tetra_render::resource::WHITE_PIXEL;
use tetra_render::{
    Buffer, BufferDesc, BufferRef, BufferUsage, Error, GpuResource, PassKind, PipelineState, PrimitiveTopology,
    RenderContext, RenderFace, RenderMode, ResourceTracker, Result, ScopeStack, Shader, ShaderDesc, ShaderRef, TextureData,
    TextureDesc, TextureFormat, TextureKind, TextureRef,
};

use crate::d3d11_buffer::Dx11Buffer;
use crate::d3d11_context::GpuContext;
use crate::d3d11_convert::{index_format_to_dxgi, topology_to_d3d11};
use crate::d3d11_shader::Dx11Shader;
use crate::d3d11_state::StateCache;
use crate::d3d11_texture::Dx11Texture;
use crate::device::{ContextCall, NativeHandle, SamplerKind};

const SOURCE: &str = "tetra::d3d11::context";

const CONSTANT_SLOTS: usize = MAX_CONSTANT_SLOTS as usize;
const TEXTURE_SLOTS: usize = MAX_TEXTURE_SLOTS as usize;

/// Everything a scope snapshots and restores
#[derive(Clone, Default)]
struct BoundState {
    shader: Option<ShaderRef>,
    constant_buffers: [Option<BufferRef>; CONSTANT_SLOTS],
    textures: [Option<TextureRef>; TEXTURE_SLOTS],
    extra_stream: Option<BufferRef>,
    index_buffer: Option<BufferRef>,
    pipeline: PipelineState,
}

/// Native objects last sent to the immediate context
#[derive(Debug, Clone, Copy, Default)]
struct AppliedState {
    vertex_shader: Option<NativeHandle>,
    pixel_shader: Option<NativeHandle>,
    input_layout: Option<NativeHandle>,
    rasterizer: Option<NativeHandle>,
    depth: Option<NativeHandle>,
    topology: Option<PrimitiveTopology>,
}

/// Per-frame counters merged into `RendererStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub draw_calls: u32,
    /// Applications of shader or fixed-function state that changed something
    pub pipeline_binds: u32,
    /// SRV table rebinds
    pub descriptor_allocations: u32,
}

pub struct Dx11RenderContext {
    gpu: Arc<GpuContext>,
    tracker: ResourceTracker,
    states: StateCache,
    fallback_texture: Option<Arc<Dx11Texture>>,
    samplers: Vec<NativeHandle>,

    in_frame: bool,
    state: BoundState,
    scopes: ScopeStack<BoundState>,
    mode: RenderMode,
    face: RenderFace,
    applied: AppliedState,
    stats: DrawStats,
}

impl Dx11RenderContext {
    pub(crate) fn new(gpu: Arc<GpuContext>) -> Self {
        Self {
            gpu,
            tracker: ResourceTracker::new(),
            states: StateCache::new(),
            fallback_texture: None,
            samplers: Vec::new(),
            in_frame: false,
            state: BoundState::default(),
            scopes: ScopeStack::new(),
            mode: RenderMode::Solid,
            face: RenderFace::Front,
            applied: AppliedState::default(),
            stats: DrawStats::default(),
        }
    }

    // ===== SETUP (renderer only) =====

    /// Fallback texture and the shared samplers; called from `initialize`
    pub(crate) fn init_frame_resources(&mut self, samples: u32) -> Result<()> {
        self.states.set_multisample(samples > 1);

        let white = TextureDesc {
            label: "fallback white".to_string(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            data: TextureData::Single(WHITE_PIXEL.to_vec()),
        };
        self.fallback_texture = Some(Dx11Texture::create(&self.gpu, &white, TextureKind::Texture2D)?);

        for kind in [SamplerKind::LinearWrap, SamplerKind::ShadowCompare] {
            let sampler = self
                .gpu
                .device
                .create_sampler_state(kind)
                .map_err(|hr| crate::d3d11_convert::hr_err(SOURCE, &format!("Failed to create {:?} sampler", kind), hr))?;
            self.samplers.push(sampler);
        }
        Ok(())
    }

    pub(crate) fn cached_states(&self) -> usize {
        self.states.len()
    }

    /// Resources created through this context
    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    // ===== FRAME =====

    /// Output targets are set; send the whole binding state
    pub(crate) fn begin_frame(&mut self) -> Result<()> {
        self.in_frame = true;
        self.state = BoundState::default();
        self.scopes.clear();
        self.applied = AppliedState::default();
        self.stats = DrawStats::default();
        self.gpu.device.call(ContextCall::PSSetSamplers { start_slot: 0, samplers: self.samplers.clone() });
        self.rebind_all()
    }

    pub(crate) fn end_frame(&mut self) -> DrawStats {
        let leaked = self.scopes.clear();
        if leaked > 0 {
            tetra_render::render_warn!(SOURCE, "{} pass scope(s) left open at frame end", leaked);
        }
        self.in_frame = false;
        self.stats
    }

    pub(crate) fn abandon_frame(&mut self) {
        self.scopes.clear();
        self.in_frame = false;
    }

    fn fallback_srv(&self) -> Result<NativeHandle> {
        self.fallback_texture
            .as_ref()
            .map(|texture| texture.srv)
            .ok_or_else(|| Error::InvalidState("Fallback texture missing; renderer not initialized".to_string()))
    }

    // ===== NATIVE BINDING =====

    fn bind_constant_slot(&self, slot: u32, buffer: Option<NativeHandle>) {
        let device = self.gpu.device.as_ref();
        device.call(ContextCall::VSSetConstantBuffer { slot, buffer });
        device.call(ContextCall::PSSetConstantBuffer { slot, buffer });
    }

    fn bind_extra_stream(&self, buffer: Option<&Dx11Buffer>) {
        self.gpu.device.call(ContextCall::IASetVertexBuffer {
            slot: 1,
            buffer: buffer.map(|b| b.resource),
            stride: buffer.map_or(0, |b| b.stride()),
        });
    }

    /// Shader, input layout and fixed-function state for the current scope
    fn apply_pipeline(&mut self) -> Result<()> {
        if !self.in_frame {
            return Ok(());
        }
        let pipeline = self.state.pipeline;
        let device = self.gpu.device.as_ref();
        let before = self.applied;

        let rasterizer = self.states.rasterizer_state(device, self.mode, pipeline.cull_mode(self.face))?;
        if self.applied.rasterizer != Some(rasterizer) {
            device.call(ContextCall::RSSetState(rasterizer));
            self.applied.rasterizer = Some(rasterizer);
        }
        let depth = self.states.depth_state(device, pipeline.depth)?;
        if self.applied.depth != Some(depth) {
            device.call(ContextCall::OMSetDepthStencilState(depth));
            self.applied.depth = Some(depth);
        }
        if self.applied.topology != Some(pipeline.topology) {
            device.call(ContextCall::IASetPrimitiveTopology(topology_to_d3d11(pipeline.topology)));
            self.applied.topology = Some(pipeline.topology);
        }

        if let Some(handle) = self.state.shader.clone().filter(|s| s.is_alive()) {
            let shader = Dx11Shader::from_handle(&handle)?;
            let layout = self.states.input_layout(device, shader, pipeline.vertex_layout(shader.layout()))?;
            if self.applied.vertex_shader != Some(shader.vertex_shader) {
                device.call(ContextCall::VSSetShader(shader.vertex_shader));
                self.applied.vertex_shader = Some(shader.vertex_shader);
            }
            if self.applied.pixel_shader != Some(shader.pixel_shader) {
                device.call(ContextCall::PSSetShader(Some(shader.pixel_shader)));
                self.applied.pixel_shader = Some(shader.pixel_shader);
            }
            if self.applied.input_layout != Some(layout) {
                device.call(ContextCall::IASetInputLayout(layout));
                self.applied.input_layout = Some(layout);
            }
        }

        let changed = before.rasterizer != self.applied.rasterizer
            || before.depth != self.applied.depth
            || before.topology != self.applied.topology
            || before.vertex_shader != self.applied.vertex_shader
            || before.pixel_shader != self.applied.pixel_shader
            || before.input_layout != self.applied.input_layout;
        if changed {
            self.stats.pipeline_binds += 1;
        }
        Ok(())
    }

    /// Send every binding of `self.state`; expired handles are left unbound
    fn rebind_all(&mut self) -> Result<()> {
        if !self.in_frame {
            return Ok(());
        }
        for slot in 0..CONSTANT_SLOTS {
            let native = match &self.state.constant_buffers[slot] {
                Some(handle) if handle.is_alive() => Some(Dx11Buffer::from_handle(handle, BufferUsage::Constant)?.resource),
                _ => None,
            };
            self.bind_constant_slot(slot as u32, native);
        }

        let fallback = self.fallback_srv()?;
        let mut views = Vec::with_capacity(TEXTURE_SLOTS + 1);
        for texture in &self.state.textures {
            views.push(match texture {
                Some(handle) if handle.is_alive() => Dx11Texture::from_handle(handle)?.srv,
                _ => fallback,
            });
        }
        // No shadow pass on this backend: the map slot reads as fully lit
        views.push(fallback);
        self.gpu.device.call(ContextCall::PSSetShaderResources { start_slot: 0, views });
        self.stats.descriptor_allocations += 1;

        let extra = match &self.state.extra_stream {
            Some(handle) if handle.is_alive() => Some(Dx11Buffer::from_handle(handle, BufferUsage::Vertex)?),
            _ => None,
        };
        self.bind_extra_stream(extra);

        self.apply_pipeline()
    }

    /// Unbind handles that expired since they were bound
    fn drop_expired_bindings(&mut self) -> Result<()> {
        for slot in 0..CONSTANT_SLOTS {
            if self.state.constant_buffers[slot].as_ref().is_some_and(|b| !b.is_alive()) {
                self.state.constant_buffers[slot] = None;
                self.bind_constant_slot(slot as u32, None);
                tetra_render::render_debug!(SOURCE, "Constant slot {} expired; unbound", slot);
            }
        }
        for slot in 0..TEXTURE_SLOTS {
            if self.state.textures[slot].as_ref().is_some_and(|t| !t.is_alive()) {
                self.state.textures[slot] = None;
                let fallback = self.fallback_srv()?;
                self.gpu.device.call(ContextCall::PSSetShaderResources { start_slot: slot as u32, views: vec![fallback] });
                tetra_render::render_debug!(SOURCE, "Texture slot {} expired; fallback bound", slot);
            }
        }
        if self.state.index_buffer.as_ref().is_some_and(|b| !b.is_alive()) {
            self.state.index_buffer = None;
        }
        if self.state.extra_stream.as_ref().is_some_and(|b| !b.is_alive()) {
            self.state.extra_stream = None;
            self.bind_extra_stream(None);
        }
        Ok(())
    }

    // ===== SCOPES =====

    fn open_scope(&mut self, kind: PassKind) -> Result<()> {
        self.scopes.push(kind, self.state.clone());
        self.state.pipeline = PipelineState::for_pass(kind);
        self.apply_pipeline()
    }

    fn close_scope(&mut self, kind: PassKind) -> Result<()> {
        self.state = self.scopes.pop(kind)?;
        self.rebind_all()
    }

    // ===== DRAW =====

    fn issue_draw(
        &mut self,
        vertex_buffer: &BufferRef,
        index_buffer: Option<&BufferRef>,
        count: u32,
        instances: u32,
    ) -> Result<()> {
        if !self.in_frame {
            return Err(Error::InvalidState("draw outside begin_render/end_render".to_string()));
        }
        let vertices = Dx11Buffer::from_handle(vertex_buffer, BufferUsage::Vertex)?;
        let indices = index_buffer
            .map(|buffer| Dx11Buffer::from_handle(buffer, BufferUsage::Index))
            .transpose()?;
        let shader = self
            .state
            .shader
            .clone()
            .ok_or_else(|| Error::InvalidState("Draw without a bound shader".to_string()))?;
        Dx11Shader::from_handle(&shader)?;

        self.drop_expired_bindings()?;
        self.apply_pipeline()?;

        let device = self.gpu.device.as_ref();
        device.call(ContextCall::IASetVertexBuffer {
            slot: 0,
            buffer: Some(vertices.resource),
            stride: vertices.stride(),
        });
        match indices {
            Some(indices) => {
                let format = indices.index_format().ok_or_else(|| {
                    tetra_render::render_warn_err!(
                        SOURCE,
                        "Index buffer '{}' has stride {}, expected 2 or 4",
                        indices.label(), indices.stride()
                    )
                })?;
                device.call(ContextCall::IASetIndexBuffer { buffer: indices.resource, format: index_format_to_dxgi(format) });
                device.call(ContextCall::DrawIndexedInstanced { index_count: count, instance_count: instances });
            }
            None => device.call(ContextCall::DrawInstanced { vertex_count: count, instance_count: instances }),
        }

        self.stats.draw_calls += 1;
        tetra_render::render_trace!(SOURCE, "draw {} x{}", count, instances);
        Ok(())
    }

    // ===== TEARDOWN (renderer only) =====

    /// Release every native object the context owns
    pub(crate) fn destroy(&mut self) {
        let device = self.gpu.device.as_ref();
        self.states.clear(device);
        for sampler in self.samplers.drain(..) {
            device.release(sampler);
        }
        if let Some(texture) = self.fallback_texture.take() {
            texture.cleanup();
        }
        let released = self.tracker.cleanup_all();
        if released > 0 {
            tetra_render::render_info!(SOURCE, "Released {} resource(s) still held by the application", released);
        }
        self.state = BoundState::default();
        self.scopes.clear();
        self.in_frame = false;
    }
}

impl RenderContext for Dx11RenderContext {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferRef> {
        let buffer = Dx11Buffer::create(&self.gpu, desc)?;
        self.tracker.track(&buffer);
        Ok(buffer)
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderRef> {
        let shader = Dx11Shader::create(&self.gpu, desc)?;
        self.tracker.track(&shader);
        Ok(shader)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef> {
        let texture = Dx11Texture::create(&self.gpu, desc, TextureKind::Texture2D)?;
        self.tracker.track(&texture);
        Ok(texture)
    }

    fn create_cubemap_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef> {
        let texture = Dx11Texture::create(&self.gpu, desc, TextureKind::Cubemap)?;
        self.tracker.track(&texture);
        Ok(texture)
    }

    fn bind_vertex_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        let native = Dx11Buffer::from_handle(buffer, BufferUsage::Vertex)?;
        match slot {
            0 => {
                tetra_render::render_trace!(SOURCE, "Stream 0 is supplied by each draw; bind of '{}' ignored", buffer.label());
            }
            s if s < MAX_VERTEX_STREAMS => {
                if self.in_frame {
                    self.bind_extra_stream(Some(native));
                }
                self.state.extra_stream = Some(Arc::clone(buffer));
            }
            _ => {
                return Err(tetra_render::render_warn_err!(SOURCE, "Vertex stream {} out of range", slot));
            }
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        Dx11Buffer::from_handle(buffer, BufferUsage::Index)?;
        if slot != 0 {
            return Err(tetra_render::render_warn_err!(SOURCE, "Index buffer slot {} out of range", slot));
        }
        self.state.index_buffer = Some(Arc::clone(buffer));
        Ok(())
    }

    fn bind_constant_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        let native = Dx11Buffer::from_handle(buffer, BufferUsage::Constant)?.resource;
        let entry = self
            .state
            .constant_buffers
            .get_mut(slot as usize)
            .ok_or_else(|| tetra_render::render_warn_err!(SOURCE, "Constant buffer slot {} out of range", slot))?;
        *entry = Some(Arc::clone(buffer));
        if self.in_frame {
            self.bind_constant_slot(slot, Some(native));
        }
        Ok(())
    }

    fn bind_texture(&mut self, texture: &TextureRef, slot: u32) -> Result<()> {
        let srv = Dx11Texture::from_handle(texture)?.srv;
        if slot == SHADOW_MAP_SLOT {
            return Err(tetra_render::render_warn_err!(SOURCE, "Texture slot {} is reserved for the shadow map", slot));
        }
        let entry = self
            .state
            .textures
            .get_mut(slot as usize)
            .ok_or_else(|| tetra_render::render_warn_err!(SOURCE, "Texture slot {} out of range", slot))?;
        *entry = Some(Arc::clone(texture));
        if self.in_frame {
            self.gpu.device.call(ContextCall::PSSetShaderResources { start_slot: slot, views: vec![srv] });
            self.stats.descriptor_allocations += 1;
        }
        Ok(())
    }

    fn bind_shader(&mut self, shader: &ShaderRef) -> Result<()> {
        Dx11Shader::from_handle(shader)?;
        self.state.shader = Some(Arc::clone(shader));
        self.apply_pipeline()
    }

    fn update_constant_buffer(&mut self, buffer: &BufferRef, data: &[u8]) -> Result<()> {
        Dx11Buffer::from_handle(buffer, BufferUsage::Constant)?;
        buffer.update(0, data)
    }

    fn set_render_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
        if let Err(e) = self.apply_pipeline() {
            tetra_render::render_warn!(SOURCE, "Render mode {:?} not applied: {}", mode, e);
        }
    }

    fn set_render_face(&mut self, face: RenderFace) {
        self.face = face;
        if let Err(e) = self.apply_pipeline() {
            tetra_render::render_warn!(SOURCE, "Render face {:?} not applied: {}", face, e);
        }
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
        self.open_scope(PassKind::Skybox)
    }

    fn end_skybox_pass(&mut self) -> Result<()> {
        self.close_scope(PassKind::Skybox)
    }

    fn begin_skinned_pass(&mut self) -> Result<()> {
        self.open_scope(PassKind::Skinned)
    }

    fn end_skinned_pass(&mut self) -> Result<()> {
        self.close_scope(PassKind::Skinned)
    }

    fn begin_debug_line_pass(&mut self) -> Result<()> {
        self.open_scope(PassKind::DebugLine)
    }

    fn end_debug_line_pass(&mut self) -> Result<()> {
        self.close_scope(PassKind::DebugLine)
    }
}
