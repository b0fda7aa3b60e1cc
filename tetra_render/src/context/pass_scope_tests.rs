//! Unit tests for pass_scope.rs

use crate::context::*;
use crate::resource::VertexLayout;
use crate::Error;

// ============================================================================
// PIPELINE STATE
// ============================================================================

#[test]
fn test_render_face_cull_mapping() {
    assert_eq!(RenderFace::Front.cull_mode(), CullMode::Back);
    assert_eq!(RenderFace::Back.cull_mode(), CullMode::Front);
    assert_eq!(RenderFace::Both.cull_mode(), CullMode::None);
}

#[test]
fn test_main_state_follows_render_face() {
    let state = PipelineState::MAIN;
    assert_eq!(state.cull_mode(RenderFace::Front), CullMode::Back);
    assert_eq!(state.cull_mode(RenderFace::Both), CullMode::None);
    assert_eq!(state.vertex_layout(VertexLayout::Standard), VertexLayout::Standard);
}

#[test]
fn test_skybox_overrides() {
    let state = PipelineState::for_pass(PassKind::Skybox);
    assert!(!state.depth.write);
    assert_eq!(state.depth.compare, CompareOp::LessOrEqual);
    assert_eq!(state.cull_mode(RenderFace::Front), CullMode::None);
    assert_eq!(state.topology, PrimitiveTopology::TriangleList);
}

#[test]
fn test_debug_line_overrides() {
    let state = PipelineState::for_pass(PassKind::DebugLine);
    assert_eq!(state.topology, PrimitiveTopology::LineList);
    assert_eq!(state.vertex_layout(VertexLayout::Standard), VertexLayout::PositionColor);
}

#[test]
fn test_skinned_overrides_layout_only() {
    let state = PipelineState::for_pass(PassKind::Skinned);
    assert_eq!(state.vertex_layout(VertexLayout::Standard), VertexLayout::Skinned);
    assert_eq!(state.depth, DepthState::DEFAULT);
    assert_eq!(state.cull_mode(RenderFace::Front), CullMode::Back);
}

#[test]
fn test_raster_key_changes_with_mode() {
    let state = PipelineState::MAIN;
    let solid = state.raster_key(RenderMode::Solid, RenderFace::Front, VertexLayout::Standard);
    let wire = state.raster_key(RenderMode::Wireframe, RenderFace::Front, VertexLayout::Standard);
    assert_ne!(solid, wire);
    assert_eq!(solid, state.raster_key(RenderMode::Solid, RenderFace::Front, VertexLayout::Standard));
}

// ============================================================================
// SCOPE STACK
// ============================================================================

#[test]
fn test_scope_stack_restores_snapshots_in_order() {
    let mut stack: ScopeStack<u32> = ScopeStack::new();
    stack.push(PassKind::Skybox, 1);
    stack.push(PassKind::DebugLine, 2);
    assert_eq!(stack.current(), Some(PassKind::DebugLine));
    assert_eq!(stack.pop(PassKind::DebugLine), Ok(2));
    assert_eq!(stack.pop(PassKind::Skybox), Ok(1));
    assert_eq!(stack.depth(), 0);
}

#[test]
fn test_scope_stack_rejects_mismatched_end() {
    let mut stack: ScopeStack<u32> = ScopeStack::new();
    stack.push(PassKind::Skinned, 7);
    assert!(matches!(stack.pop(PassKind::Skybox), Err(Error::InvalidState(_))));
    // Mismatch leaves the open scope in place
    assert_eq!(stack.current(), Some(PassKind::Skinned));
}

#[test]
fn test_scope_stack_end_without_begin() {
    let mut stack: ScopeStack<()> = ScopeStack::new();
    assert!(matches!(stack.pop(PassKind::DebugLine), Err(Error::InvalidState(_))));
}

#[test]
fn test_scope_stack_clear_reports_open_scopes() {
    let mut stack: ScopeStack<()> = ScopeStack::new();
    stack.push(PassKind::Skybox, ());
    stack.push(PassKind::Skinned, ());
    assert_eq!(stack.clear(), 2);
    assert_eq!(stack.current(), None);
}

#[test]
fn test_dirty_flags_compose() {
    let mut dirty = DirtyFlags::empty();
    dirty |= DirtyFlags::PIPELINE | DirtyFlags::TEXTURES;
    assert!(dirty.contains(DirtyFlags::PIPELINE));
    dirty.remove(DirtyFlags::PIPELINE);
    assert_eq!(dirty, DirtyFlags::TEXTURES);
}
