/// Pass scopes - pipeline overrides with exact restore
///
/// A scope snapshots the backend's full binding state on `begin_*` and
/// restores it on `end_*`. Render mode and face stay global and are not part
/// of the snapshot: a `set_render_mode` issued inside a scope outlives it.

use bitflags::bitflags;
use crate::context::{CompareOp, CullMode, DepthState, PrimitiveTopology, RenderFace, RenderMode};
use crate::error::{Error, Result};
use crate::resource::VertexLayout;

/// Pipeline variant selected by the active scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Main,
    Skybox,
    Skinned,
    DebugLine,
    /// Depth-only replay of the shadow-draw cache
    Shadow,
}

/// Fixed-function state a scope overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub pass: PassKind,
    pub topology: PrimitiveTopology,
    pub depth: DepthState,
    /// Replaces the cull mode derived from `RenderFace`
    pub cull_override: Option<CullMode>,
    /// Replaces the bound shader's vertex layout
    pub layout_override: Option<VertexLayout>,
}

impl PipelineState {
    pub const MAIN: PipelineState = PipelineState {
        pass: PassKind::Main,
        topology: PrimitiveTopology::TriangleList,
        depth: DepthState::DEFAULT,
        cull_override: None,
        layout_override: None,
    };

    /// State of a freshly opened scope
    pub fn for_pass(kind: PassKind) -> Self {
        match kind {
            PassKind::Main => Self::MAIN,
            PassKind::Skybox => PipelineState {
                pass: kind,
                depth: DepthState { test: true, write: false, compare: CompareOp::LessOrEqual },
                cull_override: Some(CullMode::None),
                ..Self::MAIN
            },
            PassKind::Skinned => PipelineState {
                pass: kind,
                layout_override: Some(VertexLayout::Skinned),
                ..Self::MAIN
            },
            PassKind::DebugLine => PipelineState {
                pass: kind,
                topology: PrimitiveTopology::LineList,
                depth: DepthState { test: true, write: false, compare: CompareOp::LessOrEqual },
                cull_override: Some(CullMode::None),
                layout_override: Some(VertexLayout::PositionColor),
            },
            PassKind::Shadow => PipelineState {
                pass: kind,
                cull_override: Some(CullMode::Front),
                ..Self::MAIN
            },
        }
    }

    /// Effective cull mode given the global face selection
    pub fn cull_mode(&self, face: RenderFace) -> CullMode {
        self.cull_override.unwrap_or_else(|| face.cull_mode())
    }

    /// Effective vertex layout given the bound shader's layout
    pub fn vertex_layout(&self, shader_layout: VertexLayout) -> VertexLayout {
        self.layout_override.unwrap_or(shader_layout)
    }

    /// Key identifying one baked pipeline variant
    pub fn raster_key(&self, mode: RenderMode, face: RenderFace, shader_layout: VertexLayout) -> RasterKey {
        RasterKey {
            pass: self.pass,
            mode,
            cull: self.cull_mode(face),
            topology: self.topology,
            depth: self.depth,
            layout: self.vertex_layout(shader_layout),
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::MAIN
    }
}

/// Everything fixed-function that a baked pipeline object captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterKey {
    pub pass: PassKind,
    pub mode: RenderMode,
    pub cull: CullMode,
    pub topology: PrimitiveTopology,
    pub depth: DepthState,
    pub layout: VertexLayout,
}

bitflags! {
    /// Deferred state a backend must flush before the next draw
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u32 {
        /// Pipeline object must be looked up/rebound
        const PIPELINE = 1 << 0;
        /// Texture descriptor set/SRV table changed
        const TEXTURES = 1 << 1;
        /// Constant-buffer bindings changed
        const CONSTANTS = 1 << 2;
        /// Render mode or face changed since the last pipeline bind
        const RASTER_PENDING = 1 << 3;
        /// Extra vertex streams changed
        const VERTEX_STREAMS = 1 << 4;
    }
}

/// Stack of open scopes with the state captured when each opened
#[derive(Debug)]
pub struct ScopeStack<S> {
    stack: Vec<(PassKind, S)>,
}

impl<S> ScopeStack<S> {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Open a scope, remembering the state to restore
    pub fn push(&mut self, kind: PassKind, snapshot: S) {
        self.stack.push((kind, snapshot));
    }

    /// Close the innermost scope; it must be of `kind`
    pub fn pop(&mut self, kind: PassKind) -> Result<S> {
        match self.stack.last() {
            Some((open, _)) if *open == kind => {
                let (_, snapshot) = self.stack.pop().ok_or_else(|| {
                    Error::InvalidState(format!("No open {:?} pass", kind))
                })?;
                Ok(snapshot)
            }
            Some((open, _)) => Err(Error::InvalidState(format!(
                "Cannot end {:?} pass while {:?} pass is open", kind, open
            ))),
            None => Err(Error::InvalidState(format!("No open {:?} pass", kind))),
        }
    }

    /// Innermost open scope
    pub fn current(&self) -> Option<PassKind> {
        self.stack.last().map(|(kind, _)| *kind)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Drop every open scope (frame end); returns how many were left open
    pub fn clear(&mut self) -> usize {
        let open = self.stack.len();
        self.stack.clear();
        open
    }
}

impl<S> Default for ScopeStack<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "pass_scope_tests.rs"]
mod tests;
