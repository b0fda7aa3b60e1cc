/// RenderContext - state changes, resource creation and draw submission
/// for the current frame
///
/// Handles passed in are shared resources owned elsewhere (mesh, material);
/// the context only borrows them for the duration of one call.
///
/// Contract every backend follows:
/// - `bind_*` takes effect for every subsequent draw until the slot is
///   rebound or the frame ends.
/// - `create_*` is synchronous: a ready handle or an error. Backends with
///   asynchronous uploads block internally.
/// - `set_render_mode` / `set_render_face` are global rasterizer state.
///   Immediate backends apply them at once; baked-pipeline backends keep them
///   pending until the next pipeline (re)bind (`bind_shader` or a pass
///   begin/end).
/// - `begin_*_pass` / `end_*_pass` restore the exact pre-scope state on end,
///   even when no draw happened inside the scope.
/// - Expired handles are rejected with `Error::InvalidResource` and change no
///   state.

use crate::error::Result;
use crate::resource::{BufferDesc, BufferRef, ShaderDesc, ShaderRef, TextureDesc, TextureRef};

/// Polygon fill mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    #[default]
    Solid,
    Wireframe,
}

/// Which faces are drawn
///
/// `Front` culls back faces, `Back` culls front faces, `Both` disables culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderFace {
    #[default]
    Front,
    Back,
    Both,
}

impl RenderFace {
    /// Native cull mode realizing this face selection
    pub fn cull_mode(self) -> CullMode {
        match self {
            RenderFace::Front => CullMode::Back,
            RenderFace::Back => CullMode::Front,
            RenderFace::Both => CullMode::None,
        }
    }
}

/// Faces removed by the rasterizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    LineList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Less,
    LessOrEqual,
    Always,
}

/// Depth test/write configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: CompareOp,
}

impl DepthState {
    pub const DEFAULT: DepthState = DepthState { test: true, write: true, compare: CompareOp::Less };
}

impl Default for DepthState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The per-frame rendering interface every backend implements
pub trait RenderContext {
    // ===== RESOURCE CREATION =====

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferRef>;

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<ShaderRef>;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef>;

    fn create_cubemap_texture(&mut self, desc: &TextureDesc) -> Result<TextureRef>;

    // ===== BINDING =====

    /// Bind an extra vertex stream (stream 0 is supplied by each draw)
    fn bind_vertex_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()>;

    fn bind_index_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()>;

    fn bind_constant_buffer(&mut self, buffer: &BufferRef, slot: u32) -> Result<()>;

    fn bind_texture(&mut self, texture: &TextureRef, slot: u32) -> Result<()>;

    fn bind_shader(&mut self, shader: &ShaderRef) -> Result<()>;

    /// Replace the whole contents of a constant buffer
    fn update_constant_buffer(&mut self, buffer: &BufferRef, data: &[u8]) -> Result<()>;

    // ===== RASTERIZER STATE =====

    fn set_render_mode(&mut self, mode: RenderMode);

    fn set_render_face(&mut self, face: RenderFace);

    // ===== DRAWS =====

    fn draw(&mut self, vertex_buffer: &BufferRef, vertex_count: u32) -> Result<()>;

    fn draw_indexed(&mut self, vertex_buffer: &BufferRef, index_buffer: &BufferRef, index_count: u32) -> Result<()>;

    fn draw_instanced(&mut self, vertex_buffer: &BufferRef, vertex_count: u32, instance_count: u32) -> Result<()>;

    fn draw_indexed_instanced(
        &mut self,
        vertex_buffer: &BufferRef,
        index_buffer: &BufferRef,
        index_count: u32,
        instance_count: u32,
    ) -> Result<()>;

    // ===== SCOPED PIPELINE OVERRIDES =====

    fn begin_skybox_pass(&mut self) -> Result<()>;

    fn end_skybox_pass(&mut self) -> Result<()>;

    fn begin_skinned_pass(&mut self) -> Result<()>;

    fn end_skinned_pass(&mut self) -> Result<()>;

    fn begin_debug_line_pass(&mut self) -> Result<()>;

    fn end_debug_line_pass(&mut self) -> Result<()>;
}
