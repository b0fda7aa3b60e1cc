/// GlRenderContext - RenderContext over the current GL context
///
/// Binds reach GL as they happen: constant buffers as uniform-buffer binding
/// points, textures on texture units, render mode and face as polygon mode and
/// cull state. Vertex formats come from one cached VAO per layout; the draw
/// attaches its buffers to that VAO just before issuing.
///
/// Outside a frame binds only update CPU-side state; `begin_frame` sends all
/// of it. Expired handles are dropped from the bindings at the next draw.

use std::sync::Arc;
use tetra_render::layout::{MAX_CONSTANT_SLOTS, MAX_TEXTURE_SLOTS, MAX_VERTEX_STREAMS, SHADOW_MAP_SLOT};
use tetra_render::resource::WHITE_PIXEL;
use tetra_render::{
    Buffer, BufferDesc, BufferRef, BufferUsage, DepthState, Error, GpuResource, PassKind, PipelineState,
    PrimitiveTopology, RenderContext, RenderFace, RenderMode, ResourceTracker, Result, ScopeStack, Shader, ShaderDesc,
    ShaderRef, TextureData, TextureDesc, TextureFormat, TextureKind, TextureRef,
};

use crate::api::{GlEnum, GlName};
use crate::gl_buffer::GlBuffer;
use crate::gl_context::GpuContext;
use crate::gl_convert::*;
use crate::gl_shader::GlShader;
use crate::gl_texture::GlTexture;
use crate::gl_vertex_array::VertexArrayCache;

const SOURCE: &str = "tetra::gl::context";

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

/// GL state last sent by this context
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct AppliedState {
    program: Option<GlName>,
    vertex_array: Option<GlName>,
    polygon_mode: Option<GlEnum>,
    /// Some(None) is "culling disabled"
    cull: Option<Option<GlEnum>>,
    depth: Option<DepthState>,
    topology: Option<PrimitiveTopology>,
}

/// Per-frame counters merged into `RendererStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub draw_calls: u32,
    /// Applications of program, VAO or fixed-function state that changed something
    pub pipeline_binds: u32,
    /// Texture unit table rebinds
    pub descriptor_allocations: u32,
}

pub struct GlRenderContext {
    gpu: Arc<GpuContext>,
    tracker: ResourceTracker,
    vertex_arrays: VertexArrayCache,
    fallback_texture: Option<Arc<GlTexture>>,
    linear_sampler: GlName,
    shadow_sampler: GlName,

    in_frame: bool,
    state: BoundState,
    scopes: ScopeStack<BoundState>,
    mode: RenderMode,
    face: RenderFace,
    applied: AppliedState,
    stats: DrawStats,
}

impl GlRenderContext {
    pub(crate) fn new(gpu: Arc<GpuContext>) -> Self {
        Self {
            gpu,
            tracker: ResourceTracker::new(),
            vertex_arrays: VertexArrayCache::new(),
            fallback_texture: None,
            linear_sampler: 0,
            shadow_sampler: 0,
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

    /// Fallback texture and the two shared samplers; called from `initialize`
    pub(crate) fn init_frame_resources(&mut self) -> Result<()> {
        let white = TextureDesc {
            label: "fallback white".to_string(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            data: TextureData::Single(WHITE_PIXEL.to_vec()),
        };
        self.fallback_texture = Some(GlTexture::create(&self.gpu, &white, TextureKind::Texture2D)?);

        let api = self.gpu.api.as_ref();
        self.linear_sampler = api.create_sampler();
        for (pname, value) in [
            (GL_TEXTURE_MIN_FILTER, GL_LINEAR),
            (GL_TEXTURE_MAG_FILTER, GL_LINEAR),
            (GL_TEXTURE_WRAP_S, GL_REPEAT),
            (GL_TEXTURE_WRAP_T, GL_REPEAT),
        ] {
            api.sampler_parameter(self.linear_sampler, pname, value);
        }
        self.shadow_sampler = api.create_sampler();
        for (pname, value) in [
            (GL_TEXTURE_MIN_FILTER, GL_LINEAR),
            (GL_TEXTURE_MAG_FILTER, GL_LINEAR),
            (GL_TEXTURE_WRAP_S, GL_CLAMP_TO_EDGE),
            (GL_TEXTURE_WRAP_T, GL_CLAMP_TO_EDGE),
            (GL_TEXTURE_COMPARE_MODE, GL_COMPARE_REF_TO_TEXTURE),
            (GL_TEXTURE_COMPARE_FUNC, GL_LEQUAL),
        ] {
            api.sampler_parameter(self.shadow_sampler, pname, value);
        }
        check_error(api, SOURCE, "Failed to create samplers")
    }

    pub(crate) fn cached_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    /// Resources created through this context
    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    // ===== FRAME =====

    /// Framebuffer is bound and cleared; send the whole binding state
    pub(crate) fn begin_frame(&mut self) -> Result<()> {
        self.in_frame = true;
        self.state = BoundState::default();
        self.scopes.clear();
        self.applied = AppliedState::default();
        self.stats = DrawStats::default();

        let api = self.gpu.api.as_ref();
        for unit in 0..MAX_TEXTURE_SLOTS {
            api.bind_sampler(unit, self.linear_sampler);
        }
        api.bind_sampler(SHADOW_MAP_SLOT, self.shadow_sampler);
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

    fn fallback(&self) -> Result<&GlTexture> {
        self.fallback_texture
            .as_deref()
            .ok_or_else(|| Error::InvalidState("Fallback texture missing; renderer not initialized".to_string()))
    }

    // ===== NATIVE BINDING =====

    fn bind_uniform_slot(&self, slot: u32, buffer: GlName) {
        self.gpu.api.bind_buffer_base(GL_UNIFORM_BUFFER, slot, buffer);
    }

    fn bind_texture_unit(&self, unit: u32, texture: &GlTexture) {
        let api = self.gpu.api.as_ref();
        api.active_texture(GL_TEXTURE0 + unit);
        api.bind_texture(texture.target, texture.name);
    }

    /// Program, VAO and fixed-function state for the current scope
    fn apply_pipeline(&mut self) -> Result<()> {
        if !self.in_frame {
            return Ok(());
        }
        let pipeline = self.state.pipeline;
        let api = self.gpu.api.as_ref();
        let before = self.applied;

        let polygon_mode = polygon_mode_to_gl(self.mode);
        if self.applied.polygon_mode != Some(polygon_mode) {
            api.polygon_mode(GL_FRONT_AND_BACK, polygon_mode);
            self.applied.polygon_mode = Some(polygon_mode);
        }
        let cull = cull_face_to_gl(pipeline.cull_mode(self.face));
        if self.applied.cull != Some(cull) {
            match cull {
                Some(face) => {
                    api.enable(GL_CULL_FACE);
                    api.cull_face(face);
                }
                None => api.disable(GL_CULL_FACE),
            }
            self.applied.cull = Some(cull);
        }
        if self.applied.depth != Some(pipeline.depth) {
            if pipeline.depth.test {
                api.enable(GL_DEPTH_TEST);
            } else {
                api.disable(GL_DEPTH_TEST);
            }
            api.depth_mask(pipeline.depth.write);
            api.depth_func(compare_op_to_gl(pipeline.depth.compare));
            self.applied.depth = Some(pipeline.depth);
        }
        self.applied.topology = Some(pipeline.topology);

        if let Some(handle) = self.state.shader.clone().filter(|s| s.is_alive()) {
            let shader = GlShader::from_handle(&handle)?;
            let vao = self.vertex_arrays.get_or_create(api, pipeline.vertex_layout(shader.layout()))?;
            if self.applied.program != Some(shader.program) {
                api.use_program(shader.program);
                self.applied.program = Some(shader.program);
            }
            if self.applied.vertex_array != Some(vao) {
                api.bind_vertex_array(vao);
                self.applied.vertex_array = Some(vao);
            }
        }

        if before != self.applied {
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
            let name = match &self.state.constant_buffers[slot] {
                Some(handle) if handle.is_alive() => GlBuffer::from_handle(handle, BufferUsage::Constant)?.name,
                _ => 0,
            };
            self.bind_uniform_slot(slot as u32, name);
        }

        let fallback = self.fallback()?;
        for (unit, texture) in self.state.textures.iter().enumerate() {
            let texture = match texture {
                Some(handle) if handle.is_alive() => GlTexture::from_handle(handle)?,
                _ => fallback,
            };
            self.bind_texture_unit(unit as u32, texture);
        }
        // No shadow pass on this backend: the map unit reads as fully lit
        self.bind_texture_unit(SHADOW_MAP_SLOT, fallback);
        self.stats.descriptor_allocations += 1;

        self.apply_pipeline()
    }

    /// Unbind handles that expired since they were bound
    fn drop_expired_bindings(&mut self) -> Result<()> {
        for slot in 0..CONSTANT_SLOTS {
            if self.state.constant_buffers[slot].as_ref().is_some_and(|b| !b.is_alive()) {
                self.state.constant_buffers[slot] = None;
                self.bind_uniform_slot(slot as u32, 0);
                tetra_render::render_debug!(SOURCE, "Uniform binding {} expired; unbound", slot);
            }
        }
        for slot in 0..TEXTURE_SLOTS {
            if self.state.textures[slot].as_ref().is_some_and(|t| !t.is_alive()) {
                self.state.textures[slot] = None;
                self.bind_texture_unit(slot as u32, self.fallback()?);
                tetra_render::render_debug!(SOURCE, "Texture unit {} expired; fallback bound", slot);
            }
        }
        if self.state.index_buffer.as_ref().is_some_and(|b| !b.is_alive()) {
            self.state.index_buffer = None;
        }
        if self.state.extra_stream.as_ref().is_some_and(|b| !b.is_alive()) {
            self.state.extra_stream = None;
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
        let vertices = GlBuffer::from_handle(vertex_buffer, BufferUsage::Vertex)?;
        let indices = index_buffer
            .map(|buffer| GlBuffer::from_handle(buffer, BufferUsage::Index))
            .transpose()?;
        let shader = self
            .state
            .shader
            .clone()
            .ok_or_else(|| Error::InvalidState("Draw without a bound shader".to_string()))?;
        GlShader::from_handle(&shader)?;

        self.drop_expired_bindings()?;
        self.apply_pipeline()?;

        let vao = self
            .applied
            .vertex_array
            .ok_or_else(|| Error::InvalidState("No vertex array bound for draw".to_string()))?;
        let extra = match &self.state.extra_stream {
            Some(handle) => Some(GlBuffer::from_handle(handle, BufferUsage::Vertex)?),
            None => None,
        };
        let api = self.gpu.api.as_ref();
        api.vertex_array_vertex_buffer(vao, 0, vertices.name, vertices.stride());
        api.vertex_array_vertex_buffer(vao, 1, extra.map_or(0, |b| b.name), extra.map_or(0, |b| b.stride()));

        let mode = topology_to_gl(self.state.pipeline.topology);
        match indices {
            Some(indices) => {
                let format = indices.index_format().ok_or_else(|| {
                    tetra_render::render_warn_err!(
                        SOURCE,
                        "Index buffer '{}' has stride {}, expected 2 or 4",
                        indices.label(), indices.stride()
                    )
                })?;
                api.vertex_array_element_buffer(vao, indices.name);
                api.draw_elements_instanced(mode, count, index_format_to_gl(format), instances);
            }
            None => api.draw_arrays_instanced(mode, 0, count, instances),
        }

        self.stats.draw_calls += 1;
        tetra_render::render_trace!(SOURCE, "draw {} x{}", count, instances);
        Ok(())
    }

    // ===== TEARDOWN (renderer only) =====

    /// Delete every GL object the context owns
    pub(crate) fn destroy(&mut self) {
        let api = self.gpu.api.as_ref();
        api.use_program(0);
        api.bind_vertex_array(0);
        self.vertex_arrays.clear(api);
        for sampler in [std::mem::take(&mut self.linear_sampler), std::mem::take(&mut self.shadow_sampler)] {
            api.delete_sampler(sampler);
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

impl RenderContext for GlRenderContext {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferRef> {
        let buffer = GlBuffer::create(&self.gpu, desc)?;
        self.tracker.track(&buffer);
        Ok(buffer)
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderRef> {
        let shader = GlShader::create(&self.gpu, desc)?;
        self.tracker.track(&shader);
        Ok(shader)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef> {
        let texture = GlTexture::create(&self.gpu, desc, TextureKind::Texture2D)?;
        self.tracker.track(&texture);
        Ok(texture)
    }

    fn create_cubemap_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef> {
        let texture = GlTexture::create(&self.gpu, desc, TextureKind::Cubemap)?;
        self.tracker.track(&texture);
        Ok(texture)
    }

    fn bind_vertex_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        GlBuffer::from_handle(buffer, BufferUsage::Vertex)?;
        match slot {
            0 => {
                tetra_render::render_trace!(SOURCE, "Stream 0 is supplied by each draw; bind of '{}' ignored", buffer.label());
            }
            s if s < MAX_VERTEX_STREAMS => self.state.extra_stream = Some(Arc::clone(buffer)),
            _ => {
                return Err(tetra_render::render_warn_err!(SOURCE, "Vertex stream {} out of range", slot));
            }
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        GlBuffer::from_handle(buffer, BufferUsage::Index)?;
        if slot != 0 {
            return Err(tetra_render::render_warn_err!(SOURCE, "Index buffer slot {} out of range", slot));
        }
        self.state.index_buffer = Some(Arc::clone(buffer));
        Ok(())
    }

    fn bind_constant_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        let name = GlBuffer::from_handle(buffer, BufferUsage::Constant)?.name;
        let entry = self
            .state
            .constant_buffers
            .get_mut(slot as usize)
            .ok_or_else(|| tetra_render::render_warn_err!(SOURCE, "Constant buffer slot {} out of range", slot))?;
        *entry = Some(Arc::clone(buffer));
        if self.in_frame {
            self.bind_uniform_slot(slot, name);
        }
        Ok(())
    }

    fn bind_texture(&mut self, texture: &TextureRef, slot: u32) -> Result<()> {
        GlTexture::from_handle(texture)?;
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
            self.bind_texture_unit(slot, GlTexture::from_handle(texture)?);
            self.stats.descriptor_allocations += 1;
        }
        Ok(())
    }

    fn bind_shader(&mut self, shader: &ShaderRef) -> Result<()> {
        GlShader::from_handle(shader)?;
        self.state.shader = Some(Arc::clone(shader));
        self.apply_pipeline()
    }

    fn update_constant_buffer(&mut self, buffer: &BufferRef, data: &[u8]) -> Result<()> {
        GlBuffer::from_handle(buffer, BufferUsage::Constant)?;
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
