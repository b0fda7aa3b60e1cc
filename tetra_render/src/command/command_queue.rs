/// RenderCommandQueue - per-frame FIFO between scene traversal and the GPU
///
/// Producers call `submit_*` during scene update; the render thread drains
/// the queue once per frame with `execute_commands`. The two phases never
/// overlap, so a plain mutex guards the pending list. The queue is an
/// ordinary value: build one and hand it to the frame loop.
///
/// Each drain also rebuilds the shadow-draw cache: every Draw/DrawIndexed
/// paired with the live slot-0 (transform) buffer bound most recently before it.
/// The cache survives the drain so `execute_shadow_pass` can replay the same
/// geometry into a depth-only target.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use rustc_hash::FxHashMap;
use crate::command::render_command::*;
use crate::context::{RenderContext, RenderFace, RenderMode};
use crate::layout::SLOT_TRANSFORM;
use crate::resource::{BufferRef, ShaderRef, TextureRef};

const SOURCE: &str = "tetra::queue";

/// Outcome of one `execute_commands` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Commands that ran without error
    pub executed: usize,
    /// Commands whose execution reported an error (logged, frame continued)
    pub failed: usize,
    /// Entries in the rebuilt shadow-draw cache
    pub shadow_draws: usize,
    /// Failures per command kind
    pub failed_by_kind: FxHashMap<CommandKind, usize>,
}

/// Draw retained for the shadow replay
#[derive(Clone)]
pub struct ShadowDraw {
    pub draw: ShadowGeometry,
    /// Transform bound at slot 0 before the draw, if any
    pub transform: Option<BufferRef>,
}

#[derive(Clone)]
pub enum ShadowGeometry {
    Draw(DrawCommand),
    DrawIndexed(DrawIndexedCommand),
}

impl ShadowGeometry {
    fn execute_shadow(&self, ctx: &mut dyn RenderContext) -> crate::Result<()> {
        match self {
            ShadowGeometry::Draw(cmd) => cmd.execute_shadow(ctx),
            ShadowGeometry::DrawIndexed(cmd) => cmd.execute_shadow(ctx),
        }
    }
}

#[derive(Default)]
pub struct RenderCommandQueue {
    pending: Mutex<VecDeque<RenderCommand>>,
    shadow_cache: Mutex<Vec<ShadowDraw>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RenderCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== SUBMISSION =====

    /// Enqueue one command
    pub fn submit(&self, command: RenderCommand) {
        lock(&self.pending).push_back(command);
    }

    pub fn submit_draw(&self, owner: Option<OwnerId>, draw: DrawCommand) {
        self.submit(RenderCommand::new(owner, CommandPayload::Draw(draw)));
    }

    pub fn submit_draw_indexed(&self, owner: Option<OwnerId>, draw: DrawIndexedCommand) {
        self.submit(RenderCommand::new(owner, CommandPayload::DrawIndexed(draw)));
    }

    /// The bytes are copied now; the caller may reuse `data` immediately
    pub fn submit_update_constant_buffer(&self, owner: Option<OwnerId>, buffer: BufferRef, data: &[u8]) {
        self.submit(RenderCommand::new(
            owner,
            CommandPayload::UpdateConstantBuffer(UpdateConstantBufferCommand { buffer, data: data.to_vec() }),
        ));
    }

    pub fn submit_bind_constant_buffer(&self, owner: Option<OwnerId>, buffer: BufferRef, slot: u32) {
        self.submit(RenderCommand::new(
            owner,
            CommandPayload::BindConstantBuffer(BindConstantBufferCommand { buffer, slot }),
        ));
    }

    pub fn submit_bind_texture(&self, owner: Option<OwnerId>, texture: TextureRef, slot: u32) {
        self.submit(RenderCommand::new(
            owner,
            CommandPayload::BindTexture(BindTextureCommand { texture, slot }),
        ));
    }

    pub fn submit_bind_shader(&self, owner: Option<OwnerId>, shader: ShaderRef) {
        self.submit(RenderCommand::new(owner, CommandPayload::BindShader(BindShaderCommand { shader })));
    }

    pub fn submit_set_render_mode(&self, owner: Option<OwnerId>, mode: RenderMode) {
        self.submit(RenderCommand::new(owner, CommandPayload::SetRenderMode(SetRenderModeCommand { mode })));
    }

    pub fn submit_set_render_face(&self, owner: Option<OwnerId>, face: RenderFace) {
        self.submit(RenderCommand::new(owner, CommandPayload::SetRenderFace(SetRenderFaceCommand { face })));
    }

    pub fn submit_custom<F>(&self, owner: Option<OwnerId>, label: &str, func: F)
    where
        F: FnMut(&mut dyn RenderContext) -> crate::Result<()> + Send + 'static,
    {
        self.submit(RenderCommand::new(owner, CommandPayload::Custom(CustomCommand::new(label, func))));
    }

    // ===== EXECUTION =====

    /// Build the shadow cache, then drain every pending command in FIFO order
    ///
    /// A failing command is logged and counted; the drain continues. The
    /// pending list is taken out of the lock before execution, so commands
    /// submitted from inside a custom command land in the next frame.
    pub fn execute_commands(&self, ctx: &mut dyn RenderContext) -> DrainReport {
        let mut commands = std::mem::take(&mut *lock(&self.pending));

        let cache = Self::build_shadow_cache(&commands);
        let mut report = DrainReport { shadow_draws: cache.len(), ..DrainReport::default() };
        *lock(&self.shadow_cache) = cache;

        while let Some(mut command) = commands.pop_front() {
            match command.execute(ctx) {
                Ok(()) => report.executed += 1,
                Err(err) => {
                    let kind = command.kind();
                    match command.owner {
                        Some(owner) => crate::render_warn!(SOURCE, "{:?} from {} failed: {}", kind, owner, err),
                        None => crate::render_warn!(SOURCE, "{:?} failed: {}", kind, err),
                    }
                    report.failed += 1;
                    *report.failed_by_kind.entry(kind).or_insert(0) += 1;
                }
            }
        }

        crate::render_trace!(
            SOURCE,
            "Drained {} commands ({} failed), {} shadow draws cached",
            report.executed + report.failed, report.failed, report.shadow_draws
        );
        report
    }

    /// Replay the cached draws, rebinding each one's transform at slot 0 first
    ///
    /// Returns the number of draws replayed successfully.
    pub fn execute_shadow_pass(&self, ctx: &mut dyn RenderContext) -> usize {
        let entries = lock(&self.shadow_cache).clone();
        let mut replayed = 0;
        for entry in &entries {
            if let Some(transform) = &entry.transform {
                if let Err(err) = ctx.bind_constant_buffer(transform, SLOT_TRANSFORM) {
                    crate::render_warn!(SOURCE, "Shadow draw skipped, transform rebind failed: {}", err);
                    continue;
                }
            }
            match entry.draw.execute_shadow(ctx) {
                Ok(()) => replayed += 1,
                Err(err) => crate::render_warn!(SOURCE, "Shadow draw failed: {}", err),
            }
        }
        replayed
    }

    fn build_shadow_cache(commands: &VecDeque<RenderCommand>) -> Vec<ShadowDraw> {
        let mut transform: Option<BufferRef> = None;
        let mut cache = Vec::new();
        for command in commands {
            match &command.payload {
                // An expired bind fails in the main pass and leaves the previous
                // transform bound; the cache keeps it too
                CommandPayload::BindConstantBuffer(bind) if bind.slot == SLOT_TRANSFORM => {
                    if bind.buffer.is_alive() {
                        transform = Some(bind.buffer.clone());
                    }
                }
                CommandPayload::Draw(draw) => cache.push(ShadowDraw {
                    draw: ShadowGeometry::Draw(draw.clone()),
                    transform: transform.clone(),
                }),
                CommandPayload::DrawIndexed(draw) => cache.push(ShadowDraw {
                    draw: ShadowGeometry::DrawIndexed(draw.clone()),
                    transform: transform.clone(),
                }),
                _ => {}
            }
        }
        cache
    }

    // ===== MAINTENANCE =====

    /// Discard every pending command without executing it
    pub fn clear(&self) {
        let discarded = {
            let mut pending = lock(&self.pending);
            let count = pending.len();
            pending.clear();
            count
        };
        if discarded > 0 {
            crate::render_debug!(SOURCE, "Cleared {} pending commands", discarded);
        }
    }

    /// Drop the shadow-draw cache (e.g. when shadows are disabled)
    pub fn clear_shadow_cache(&self) {
        lock(&self.shadow_cache).clear();
    }

    /// Extension point for state sorting. Intentionally does nothing:
    /// submission order is the execution order.
    pub fn sort_commands(&self) {}

    /// Extension point for draw batching. Intentionally does nothing.
    pub fn optimize_batching(&self) {}

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.pending).is_empty()
    }

    pub fn shadow_cache_len(&self) -> usize {
        lock(&self.shadow_cache).len()
    }
}

#[cfg(test)]
#[path = "command_queue_tests.rs"]
mod tests;
