/// Mock render context and renderer (no GPU required)
///
/// `MockContext` follows the RenderContext contract and records every
/// accepted call as a `MockCall`; rejected calls (expired handles, usage
/// mismatch, draw without shader) are not recorded. `MockRenderer` wraps it
/// with the lifecycle state machine so the frame loop can be tested.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use crate::command::RenderCommandQueue;
use crate::context::*;
use crate::error::{Error, Result};
use crate::renderer::*;
use crate::resource::*;

// ============================================================================
// Mock resources
// ============================================================================

pub struct MockBuffer {
    pub id: ResourceId,
    pub label: String,
    pub usage: BufferUsage,
    pub size: u64,
    pub stride: u32,
    pub contents: Mutex<Vec<u8>>,
    alive: AliveFlag,
}

impl MockBuffer {
    pub fn new(label: &str, usage: BufferUsage, size: u64, stride: u32) -> Arc<Self> {
        Arc::new(Self {
            id: ResourceId::next(),
            label: label.to_string(),
            usage,
            size,
            stride,
            contents: Mutex::new(vec![0; size as usize]),
            alive: AliveFlag::new(),
        })
    }

    pub fn from_desc(desc: &BufferDesc) -> Arc<Self> {
        let buffer = Self::new(&desc.label, desc.usage, desc.size, desc.stride);
        if let Some(data) = &desc.data {
            *buffer.contents.lock().unwrap_or_else(PoisonError::into_inner) = data.clone();
        }
        buffer
    }
}

impl GpuResource for MockBuffer {
    fn label(&self) -> &str {
        &self.label
    }
    fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }
    fn cleanup(&self) {
        self.alive.retire();
    }
}

impl Buffer for MockBuffer {
    fn usage(&self) -> BufferUsage {
        self.usage
    }
    fn size(&self) -> u64 {
        self.size
    }
    fn stride(&self) -> u32 {
        self.stride
    }
    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::InvalidResource(format!("buffer '{}' expired", self.label)));
        }
        check_update_range(&self.label, self.size, offset, data.len())?;
        let mut contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        let start = offset as usize;
        contents[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockTexture {
    pub id: ResourceId,
    pub label: String,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    alive: AliveFlag,
}

impl MockTexture {
    pub fn new(label: &str, kind: TextureKind, width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            id: ResourceId::next(),
            label: label.to_string(),
            kind,
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            alive: AliveFlag::new(),
        })
    }
}

impl GpuResource for MockTexture {
    fn label(&self) -> &str {
        &self.label
    }
    fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }
    fn cleanup(&self) {
        self.alive.retire();
    }
}

impl Texture for MockTexture {
    fn kind(&self) -> TextureKind {
        self.kind
    }
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn format(&self) -> TextureFormat {
        self.format
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockShader {
    pub id: ResourceId,
    pub label: String,
    pub layout: VertexLayout,
    alive: AliveFlag,
}

impl MockShader {
    pub fn new(label: &str, layout: VertexLayout) -> Arc<Self> {
        Arc::new(Self { id: ResourceId::next(), label: label.to_string(), layout, alive: AliveFlag::new() })
    }
}

impl GpuResource for MockShader {
    fn label(&self) -> &str {
        &self.label
    }
    fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }
    fn cleanup(&self) {
        self.alive.retire();
    }
}

impl Shader for MockShader {
    fn layout(&self) -> VertexLayout {
        self.layout
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Id of a mock buffer handle (0 for foreign handles)
pub fn buffer_id(buffer: &BufferRef) -> u64 {
    buffer.as_any().downcast_ref::<MockBuffer>().map_or(0, |b| b.id.0)
}

pub fn texture_id(texture: &TextureRef) -> u64 {
    texture.as_any().downcast_ref::<MockTexture>().map_or(0, |t| t.id.0)
}

pub fn shader_id(shader: &ShaderRef) -> u64 {
    shader.as_any().downcast_ref::<MockShader>().map_or(0, |s| s.id.0)
}

// ============================================================================
// Mock context
// ============================================================================

/// One accepted context call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateBuffer(String),
    CreateShader(String),
    CreateTexture(String),
    CreateCubemap(String),
    BindVertexBuffer { buffer: u64, slot: u32 },
    BindIndexBuffer { buffer: u64, slot: u32 },
    BindConstantBuffer { buffer: u64, slot: u32 },
    BindTexture { texture: u64, slot: u32 },
    BindShader { shader: u64 },
    UpdateConstantBuffer { buffer: u64, len: usize },
    SetRenderMode(RenderMode),
    SetRenderFace(RenderFace),
    Draw { vertex_buffer: u64, vertex_count: u32, instances: u32 },
    DrawIndexed { vertex_buffer: u64, index_buffer: u64, index_count: u32, instances: u32 },
    BeginPass(PassKind),
    EndPass(PassKind),
}

/// Bound state, snapshotted by pass scopes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockState {
    pub shader: Option<u64>,
    pub constant_buffers: [Option<u64>; crate::layout::MAX_CONSTANT_SLOTS as usize],
    pub textures: [Option<u64>; (crate::layout::MAX_TEXTURE_SLOTS + 1) as usize],
    pub index_buffer: Option<u64>,
    pub pipeline: PipelineState,
}

#[derive(Default)]
pub struct MockContext {
    pub calls: Vec<MockCall>,
    pub state: MockState,
    pub mode: RenderMode,
    pub face: RenderFace,
    scopes: ScopeStack<MockState>,
}

impl MockContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_calls(&mut self) -> Vec<MockCall> {
        std::mem::take(&mut self.calls)
    }

    /// Draw calls recorded so far
    pub fn draw_calls(&self) -> Vec<&MockCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c, MockCall::Draw { .. } | MockCall::DrawIndexed { .. }))
            .collect()
    }

    /// Open an internal pass (used by MockRenderer for the shadow replay)
    pub fn enter_pass(&mut self, kind: PassKind) {
        self.scopes.push(kind, self.state.clone());
        self.state.pipeline = PipelineState::for_pass(kind);
        self.calls.push(MockCall::BeginPass(kind));
    }

    pub fn exit_pass(&mut self, kind: PassKind) -> Result<()> {
        self.state = self.scopes.pop(kind)?;
        self.calls.push(MockCall::EndPass(kind));
        Ok(())
    }

    pub fn open_scopes(&self) -> usize {
        self.scopes.depth()
    }

    fn check_buffer(buffer: &BufferRef, usage: BufferUsage) -> Result<()> {
        if !buffer.is_alive() {
            return Err(Error::InvalidResource(format!("buffer '{}' expired", buffer.label())));
        }
        if buffer.usage() != usage {
            return Err(Error::InvalidResource(format!(
                "buffer '{}' is {:?}, expected {:?}", buffer.label(), buffer.usage(), usage
            )));
        }
        Ok(())
    }

    fn check_draw(&self, vertex_buffer: &BufferRef) -> Result<()> {
        Self::check_buffer(vertex_buffer, BufferUsage::Vertex)?;
        if self.state.shader.is_none() {
            return Err(Error::InvalidState("draw without a bound shader".to_string()));
        }
        Ok(())
    }
}

impl RenderContext for MockContext {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferRef> {
        desc.validate()?;
        self.calls.push(MockCall::CreateBuffer(desc.label.clone()));
        Ok(MockBuffer::from_desc(desc))
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderRef> {
        desc.validate()?;
        self.calls.push(MockCall::CreateShader(desc.label.clone()));
        Ok(MockShader::new(&desc.label, desc.layout))
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef> {
        desc.validate(TextureKind::Texture2D)?;
        self.calls.push(MockCall::CreateTexture(desc.label.clone()));
        Ok(MockTexture::new(&desc.label, TextureKind::Texture2D, desc.width, desc.height))
    }

    fn create_cubemap_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef> {
        desc.validate(TextureKind::Cubemap)?;
        self.calls.push(MockCall::CreateCubemap(desc.label.clone()));
        Ok(MockTexture::new(&desc.label, TextureKind::Cubemap, desc.width, desc.height))
    }

    fn bind_vertex_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        Self::check_buffer(buffer, BufferUsage::Vertex)?;
        if slot >= crate::layout::MAX_VERTEX_STREAMS {
            return Err(Error::InvalidResource(format!("vertex stream {} out of range", slot)));
        }
        self.calls.push(MockCall::BindVertexBuffer { buffer: buffer_id(buffer), slot });
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        Self::check_buffer(buffer, BufferUsage::Index)?;
        if slot != 0 {
            return Err(Error::InvalidResource(format!("index slot {} out of range", slot)));
        }
        self.state.index_buffer = Some(buffer_id(buffer));
        self.calls.push(MockCall::BindIndexBuffer { buffer: buffer_id(buffer), slot });
        Ok(())
    }

    fn bind_constant_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()> {
        Self::check_buffer(buffer, BufferUsage::Constant)?;
        let entry = self
            .state
            .constant_buffers
            .get_mut(slot as usize)
            .ok_or_else(|| Error::InvalidResource(format!("constant slot {} out of range", slot)))?;
        *entry = Some(buffer_id(buffer));
        self.calls.push(MockCall::BindConstantBuffer { buffer: buffer_id(buffer), slot });
        Ok(())
    }

    fn bind_texture(&mut self, texture: &TextureRef, slot: u32) -> Result<()> {
        if !texture.is_alive() {
            return Err(Error::InvalidResource(format!("texture '{}' expired", texture.label())));
        }
        let entry = self
            .state
            .textures
            .get_mut(slot as usize)
            .ok_or_else(|| Error::InvalidResource(format!("texture slot {} out of range", slot)))?;
        *entry = Some(texture_id(texture));
        self.calls.push(MockCall::BindTexture { texture: texture_id(texture), slot });
        Ok(())
    }

    fn bind_shader(&mut self, shader: &ShaderRef) -> Result<()> {
        if !shader.is_alive() {
            return Err(Error::InvalidResource(format!("shader '{}' expired", shader.label())));
        }
        self.state.shader = Some(shader_id(shader));
        self.calls.push(MockCall::BindShader { shader: shader_id(shader) });
        Ok(())
    }

    fn update_constant_buffer(&mut self, buffer: &BufferRef, data: &[u8]) -> Result<()> {
        Self::check_buffer(buffer, BufferUsage::Constant)?;
        buffer.update(0, data)?;
        self.calls.push(MockCall::UpdateConstantBuffer { buffer: buffer_id(buffer), len: data.len() });
        Ok(())
    }

    fn set_render_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
        self.calls.push(MockCall::SetRenderMode(mode));
    }

    fn set_render_face(&mut self, face: RenderFace) {
        self.face = face;
        self.calls.push(MockCall::SetRenderFace(face));
    }

    fn draw(&mut self, vertex_buffer: &BufferRef, vertex_count: u32) -> Result<()> {
        self.draw_instanced(vertex_buffer, vertex_count, 1)
    }

    fn draw_indexed(&mut self, vertex_buffer: &BufferRef, index_buffer: &BufferRef, index_count: u32) -> Result<()> {
        self.draw_indexed_instanced(vertex_buffer, index_buffer, index_count, 1)
    }

    fn draw_instanced(&mut self, vertex_buffer: &BufferRef, vertex_count: u32, instance_count: u32) -> Result<()> {
        self.check_draw(vertex_buffer)?;
        self.calls.push(MockCall::Draw {
            vertex_buffer: buffer_id(vertex_buffer),
            vertex_count,
            instances: instance_count,
        });
        Ok(())
    }

    fn draw_indexed_instanced(
        &mut self,
        vertex_buffer: &BufferRef,
        index_buffer: &BufferRef,
        index_count: u32,
        instance_count: u32,
    ) -> Result<()> {
        self.check_draw(vertex_buffer)?;
        Self::check_buffer(index_buffer, BufferUsage::Index)?;
        self.calls.push(MockCall::DrawIndexed {
            vertex_buffer: buffer_id(vertex_buffer),
            index_buffer: buffer_id(index_buffer),
            index_count,
            instances: instance_count,
        });
        Ok(())
    }

    fn begin_skybox_pass(&mut self) -> Result<()> {
        self.enter_pass(PassKind::Skybox);
        Ok(())
    }

    fn end_skybox_pass(&mut self) -> Result<()> {
        self.exit_pass(PassKind::Skybox)
    }

    fn begin_skinned_pass(&mut self) -> Result<()> {
        self.enter_pass(PassKind::Skinned);
        Ok(())
    }

    fn end_skinned_pass(&mut self) -> Result<()> {
        self.exit_pass(PassKind::Skinned)
    }

    fn begin_debug_line_pass(&mut self) -> Result<()> {
        self.enter_pass(PassKind::DebugLine);
        Ok(())
    }

    fn end_debug_line_pass(&mut self) -> Result<()> {
        self.exit_pass(PassKind::DebugLine)
    }
}

// ============================================================================
// Mock renderer
// ============================================================================

pub struct MockRenderer {
    pub context: MockContext,
    pub shadows_enabled: bool,
    /// Forces the next begin_render to report this skip
    pub skip_next: Option<SkipReason>,
    pub resizes: Vec<(u32, u32)>,
    lifecycle: Lifecycle,
    timing: FrameTiming,
    stats: RendererStats,
    minimized: bool,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self {
            context: MockContext::new(),
            shadows_enabled: false,
            skip_next: None,
            resizes: Vec::new(),
            lifecycle: Lifecycle::new(),
            timing: FrameTiming::new(),
            stats: RendererStats::default(),
            minimized: false,
        }
    }
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for MockRenderer {
    fn backend(&self) -> BackendKind {
        BackendKind::platform_default()
    }

    fn initialize(&mut self) -> Result<()> {
        self.lifecycle.initialized()
    }

    fn begin_render(&mut self, queue: &RenderCommandQueue) -> Result<FrameStatus> {
        self.lifecycle.begin()?;
        self.stats.reset_frame();
        let skip = if self.minimized { Some(SkipReason::Minimized) } else { self.skip_next.take() };
        if let Some(reason) = skip {
            self.lifecycle.abandon_frame();
            self.stats.skipped_frames += 1;
            return Ok(FrameStatus::Skipped(reason));
        }
        if self.shadows_enabled {
            self.context.enter_pass(PassKind::Shadow);
            self.stats.shadow_draws = queue.execute_shadow_pass(&mut self.context) as u32;
            self.context.exit_pass(PassKind::Shadow)?;
        }
        Ok(FrameStatus::Ready)
    }

    fn end_render(&mut self) -> Result<FrameStatus> {
        self.lifecycle.end()?;
        let leaked = self.context.scopes.clear();
        if leaked > 0 {
            crate::render_warn!("tetra::mock", "{} pass scopes left open at frame end", leaked);
        }
        self.stats.draw_calls = self.context.draw_calls().len() as u32;
        self.stats.presented_frames += 1;
        self.timing.tick();
        Ok(FrameStatus::Ready)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.lifecycle.require_initialized("resize")?;
        self.resizes.push((width, height));
        self.minimized = width == 0 || height == 0;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.lifecycle.cleaned_up();
    }

    fn context(&mut self) -> &mut dyn RenderContext {
        &mut self.context
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    fn stats(&self) -> RendererStats {
        self.stats
    }

    fn wait_idle(&mut self) -> Result<()> {
        Ok(())
    }
}
