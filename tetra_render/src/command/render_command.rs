/// RenderCommand - one replayable RenderContext operation
///
/// A command carries everything it needs to replay itself: shared handles
/// (which keep the resources alive until the command runs), counts, slots and
/// copied payload bytes. Nothing refers back to the submitter's stack.
///
/// Expired handles make the affected sub-operation a no-op: the context call
/// is skipped and `execute` reports `Error::InvalidResource` for the queue to
/// log. A skipped material texture does not cancel the draw that uses it.

use std::fmt;
use crate::context::{RenderContext, RenderFace, RenderMode};
use crate::error::{Error, Result};
use crate::resource::{BufferRef, ShaderRef, TextureRef};

const SOURCE: &str = "tetra::command";

/// Scene object that submitted a command (for diagnostics)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type tag of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Draw,
    DrawIndexed,
    UpdateConstantBuffer,
    BindConstantBuffer,
    BindTexture,
    BindShader,
    SetRenderMode,
    SetRenderFace,
    Custom,
}

// ============================================================================
// Concrete commands
// ============================================================================

/// Non-indexed draw
#[derive(Clone)]
pub struct DrawCommand {
    pub vertex_buffer: BufferRef,
    pub vertex_count: u32,
    pub instance_count: u32,
    /// Constant buffers this draw reads; kept alive until execution and
    /// required to still be alive for the draw to be issued
    pub constant_buffers: Vec<BufferRef>,
    /// Material textures as (slot, texture); skipped by the shadow replay
    pub textures: Vec<(u32, TextureRef)>,
}

impl DrawCommand {
    pub fn new(vertex_buffer: BufferRef, vertex_count: u32) -> Self {
        Self {
            vertex_buffer,
            vertex_count,
            instance_count: 1,
            constant_buffers: Vec::new(),
            textures: Vec::new(),
        }
    }

    pub fn with_constant_buffers(mut self, buffers: Vec<BufferRef>) -> Self {
        self.constant_buffers = buffers;
        self
    }

    pub fn with_textures(mut self, textures: Vec<(u32, TextureRef)>) -> Self {
        self.textures = textures;
        self
    }

    pub fn instanced(mut self, instance_count: u32) -> Self {
        self.instance_count = instance_count;
        self
    }

    fn check_geometry(&self) -> Result<()> {
        check_alive_buffer(&self.vertex_buffer, "vertex")?;
        check_constant_buffers(&self.constant_buffers)
    }

    fn issue(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        if self.instance_count > 1 {
            ctx.draw_instanced(&self.vertex_buffer, self.vertex_count, self.instance_count)
        } else {
            ctx.draw(&self.vertex_buffer, self.vertex_count)
        }
    }

    pub fn execute(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        self.check_geometry()?;
        let textures = bind_material_textures(ctx, &self.textures);
        self.issue(ctx)?;
        textures
    }

    /// Depth-only replay: geometry only, transform already bound at slot 0
    pub fn execute_shadow(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        self.check_geometry()?;
        self.issue(ctx)
    }
}

/// Indexed draw
#[derive(Clone)]
pub struct DrawIndexedCommand {
    pub vertex_buffer: BufferRef,
    pub index_buffer: BufferRef,
    pub index_count: u32,
    pub instance_count: u32,
    pub constant_buffers: Vec<BufferRef>,
    pub textures: Vec<(u32, TextureRef)>,
}

impl DrawIndexedCommand {
    pub fn new(vertex_buffer: BufferRef, index_buffer: BufferRef, index_count: u32) -> Self {
        Self {
            vertex_buffer,
            index_buffer,
            index_count,
            instance_count: 1,
            constant_buffers: Vec::new(),
            textures: Vec::new(),
        }
    }

    pub fn with_constant_buffers(mut self, buffers: Vec<BufferRef>) -> Self {
        self.constant_buffers = buffers;
        self
    }

    pub fn with_textures(mut self, textures: Vec<(u32, TextureRef)>) -> Self {
        self.textures = textures;
        self
    }

    pub fn instanced(mut self, instance_count: u32) -> Self {
        self.instance_count = instance_count;
        self
    }

    fn check_geometry(&self) -> Result<()> {
        check_alive_buffer(&self.vertex_buffer, "vertex")?;
        check_alive_buffer(&self.index_buffer, "index")?;
        check_constant_buffers(&self.constant_buffers)
    }

    fn issue(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        if self.instance_count > 1 {
            ctx.draw_indexed_instanced(&self.vertex_buffer, &self.index_buffer, self.index_count, self.instance_count)
        } else {
            ctx.draw_indexed(&self.vertex_buffer, &self.index_buffer, self.index_count)
        }
    }

    pub fn execute(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        self.check_geometry()?;
        let textures = bind_material_textures(ctx, &self.textures);
        self.issue(ctx)?;
        textures
    }

    pub fn execute_shadow(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        self.check_geometry()?;
        self.issue(ctx)
    }
}

/// Overwrite a constant buffer with bytes copied at submission time
#[derive(Clone)]
pub struct UpdateConstantBufferCommand {
    pub buffer: BufferRef,
    pub data: Vec<u8>,
}

impl UpdateConstantBufferCommand {
    pub fn execute(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        check_alive_buffer(&self.buffer, "constant")?;
        ctx.update_constant_buffer(&self.buffer, &self.data)
    }
}

#[derive(Clone)]
pub struct BindConstantBufferCommand {
    pub buffer: BufferRef,
    pub slot: u32,
}

impl BindConstantBufferCommand {
    pub fn execute(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        check_alive_buffer(&self.buffer, "constant")?;
        ctx.bind_constant_buffer(&self.buffer, self.slot)
    }
}

#[derive(Clone)]
pub struct BindTextureCommand {
    pub texture: TextureRef,
    pub slot: u32,
}

impl BindTextureCommand {
    pub fn execute(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        if !self.texture.is_alive() {
            return Err(expired("texture", self.texture.label()));
        }
        ctx.bind_texture(&self.texture, self.slot)
    }
}

#[derive(Clone)]
pub struct BindShaderCommand {
    pub shader: ShaderRef,
}

impl BindShaderCommand {
    pub fn execute(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        if !self.shader.is_alive() {
            return Err(expired("shader", self.shader.label()));
        }
        ctx.bind_shader(&self.shader)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetRenderModeCommand {
    pub mode: RenderMode,
}

#[derive(Debug, Clone, Copy)]
pub struct SetRenderFaceCommand {
    pub face: RenderFace,
}

/// Arbitrary context work, run in queue order
pub struct CustomCommand {
    pub label: String,
    pub func: Box<dyn FnMut(&mut dyn RenderContext) -> Result<()> + Send>,
}

impl CustomCommand {
    pub fn new<F>(label: &str, func: F) -> Self
    where
        F: FnMut(&mut dyn RenderContext) -> Result<()> + Send + 'static,
    {
        Self { label: label.to_string(), func: Box::new(func) }
    }
}

// ============================================================================
// Tagged command
// ============================================================================

/// Payload of a queued command
pub enum CommandPayload {
    Draw(DrawCommand),
    DrawIndexed(DrawIndexedCommand),
    UpdateConstantBuffer(UpdateConstantBufferCommand),
    BindConstantBuffer(BindConstantBufferCommand),
    BindTexture(BindTextureCommand),
    BindShader(BindShaderCommand),
    SetRenderMode(SetRenderModeCommand),
    SetRenderFace(SetRenderFaceCommand),
    Custom(CustomCommand),
}

/// One queued command: optional owner plus payload
pub struct RenderCommand {
    pub owner: Option<OwnerId>,
    pub payload: CommandPayload,
}

impl RenderCommand {
    pub fn new(owner: Option<OwnerId>, payload: CommandPayload) -> Self {
        Self { owner, payload }
    }

    pub fn kind(&self) -> CommandKind {
        match &self.payload {
            CommandPayload::Draw(_) => CommandKind::Draw,
            CommandPayload::DrawIndexed(_) => CommandKind::DrawIndexed,
            CommandPayload::UpdateConstantBuffer(_) => CommandKind::UpdateConstantBuffer,
            CommandPayload::BindConstantBuffer(_) => CommandKind::BindConstantBuffer,
            CommandPayload::BindTexture(_) => CommandKind::BindTexture,
            CommandPayload::BindShader(_) => CommandKind::BindShader,
            CommandPayload::SetRenderMode(_) => CommandKind::SetRenderMode,
            CommandPayload::SetRenderFace(_) => CommandKind::SetRenderFace,
            CommandPayload::Custom(_) => CommandKind::Custom,
        }
    }

    /// True for Draw and DrawIndexed
    pub fn is_draw(&self) -> bool {
        matches!(self.payload, CommandPayload::Draw(_) | CommandPayload::DrawIndexed(_))
    }

    /// Replay against the normal pass
    pub fn execute(&mut self, ctx: &mut dyn RenderContext) -> Result<()> {
        match &mut self.payload {
            CommandPayload::Draw(cmd) => cmd.execute(ctx),
            CommandPayload::DrawIndexed(cmd) => cmd.execute(ctx),
            CommandPayload::UpdateConstantBuffer(cmd) => cmd.execute(ctx),
            CommandPayload::BindConstantBuffer(cmd) => cmd.execute(ctx),
            CommandPayload::BindTexture(cmd) => cmd.execute(ctx),
            CommandPayload::BindShader(cmd) => cmd.execute(ctx),
            CommandPayload::SetRenderMode(cmd) => {
                ctx.set_render_mode(cmd.mode);
                Ok(())
            }
            CommandPayload::SetRenderFace(cmd) => {
                ctx.set_render_face(cmd.face);
                Ok(())
            }
            CommandPayload::Custom(cmd) => (cmd.func)(ctx),
        }
    }

    /// Replay against a depth-only pass; non-draw commands are no-ops
    pub fn execute_shadow(&self, ctx: &mut dyn RenderContext) -> Result<()> {
        match &self.payload {
            CommandPayload::Draw(cmd) => cmd.execute_shadow(ctx),
            CommandPayload::DrawIndexed(cmd) => cmd.execute_shadow(ctx),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for RenderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCommand")
            .field("kind", &self.kind())
            .field("owner", &self.owner)
            .finish()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn expired(what: &str, label: &str) -> Error {
    Error::InvalidResource(format!("{} '{}' expired before execution", what, label))
}

fn check_alive_buffer(buffer: &BufferRef, what: &str) -> Result<()> {
    if buffer.is_alive() {
        Ok(())
    } else {
        Err(expired(what, buffer.label()))
    }
}

fn check_constant_buffers(buffers: &[BufferRef]) -> Result<()> {
    buffers.iter().try_for_each(|buffer| check_alive_buffer(buffer, "constant"))
}

/// Bind every live material texture; expired ones are skipped and reported
fn bind_material_textures(ctx: &mut dyn RenderContext, textures: &[(u32, TextureRef)]) -> Result<()> {
    let mut outcome = Ok(());
    for (slot, texture) in textures {
        let result = if texture.is_alive() {
            ctx.bind_texture(texture, *slot)
        } else {
            Err(expired("texture", texture.label()))
        };
        if let Err(err) = result {
            crate::render_warn!(SOURCE, "Material texture at slot {} skipped: {}", slot, err);
            outcome = Err(err);
        }
    }
    outcome
}
