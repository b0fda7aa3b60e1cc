//! Unit tests for the frame-loop driver against MockRenderer

use super::*;
use crate::command::DrawCommand;
use crate::context::{PassKind, RenderContext};
use crate::mock::*;
use crate::renderer::{FrameStatus, LifecycleState, Renderer, SkipReason};
use crate::resource::{BufferRef, BufferUsage, ShaderRef, VertexLayout};

fn initialized_renderer() -> MockRenderer {
    let mut renderer = MockRenderer::new();
    renderer.initialize().unwrap();
    renderer
}

fn triangle() -> BufferRef {
    MockBuffer::new("triangle", BufferUsage::Vertex, 92 * 3, 92)
}

fn shader() -> ShaderRef {
    MockShader::new("lit", VertexLayout::Standard)
}

#[test]
fn test_ready_frame_drains_queue() {
    let mut renderer = initialized_renderer();
    let queue = RenderCommandQueue::new();
    queue.submit_bind_shader(None, shader());
    queue.submit_draw(None, DrawCommand::new(triangle(), 3));

    let outcome = render_frame(&mut renderer, &queue).unwrap();

    assert_eq!(outcome.status, FrameStatus::Ready);
    let report = outcome.report.unwrap();
    assert_eq!(report.executed, 2);
    assert_eq!(report.failed, 0);
    assert!(queue.is_empty());
    assert_eq!(renderer.context.draw_calls().len(), 1);
    assert_eq!(renderer.state(), LifecycleState::Initialized);
    assert_eq!(renderer.stats().presented_frames, 1);
}

#[test]
fn test_skipped_frame_discards_commands() {
    let mut renderer = initialized_renderer();
    renderer.skip_next = Some(SkipReason::SwapchainOutOfDate);
    let queue = RenderCommandQueue::new();
    queue.submit_bind_shader(None, shader());
    queue.submit_draw(None, DrawCommand::new(triangle(), 3));

    let outcome = render_frame(&mut renderer, &queue).unwrap();

    assert_eq!(outcome.status, FrameStatus::Skipped(SkipReason::SwapchainOutOfDate));
    assert!(outcome.report.is_none());
    assert!(queue.is_empty());
    assert!(renderer.context.calls.is_empty());
    assert_eq!(renderer.state(), LifecycleState::Initialized);

    // The following frame renders normally
    let outcome = render_frame(&mut renderer, &queue).unwrap();
    assert!(outcome.status.is_ready());
}

#[test]
fn test_render_before_initialize_fails() {
    let mut renderer = MockRenderer::new();
    let queue = RenderCommandQueue::new();
    assert!(render_frame(&mut renderer, &queue).is_err());
}

#[test]
fn test_resize_and_fullscreen_route_to_resize() {
    let mut renderer = initialized_renderer();
    handle_window_event(&mut renderer, WindowEvent::Resized { width: 800, height: 600 }).unwrap();
    handle_window_event(&mut renderer, WindowEvent::FullscreenToggled { width: 1920, height: 1080 }).unwrap();
    assert_eq!(renderer.resizes, vec![(800, 600), (1920, 1080)]);
}

#[test]
fn test_minimized_skips_until_restored() {
    let mut renderer = initialized_renderer();
    let queue = RenderCommandQueue::new();

    handle_window_event(&mut renderer, WindowEvent::Minimized).unwrap();
    assert_eq!(renderer.resizes, vec![(0, 0)]);

    for _ in 0..3 {
        queue.submit_draw(None, DrawCommand::new(triangle(), 3));
        let outcome = render_frame(&mut renderer, &queue).unwrap();
        assert_eq!(outcome.status, FrameStatus::Skipped(SkipReason::Minimized));
        assert!(queue.is_empty());
    }
    assert_eq!(renderer.stats().skipped_frames, 3);

    handle_window_event(&mut renderer, WindowEvent::Resized { width: 640, height: 480 }).unwrap();
    let outcome = render_frame(&mut renderer, &queue).unwrap();
    assert!(outcome.status.is_ready());
}

#[test]
fn test_shadow_pass_replays_previous_frame_draws() {
    let mut renderer = initialized_renderer();
    renderer.shadows_enabled = true;
    let queue = RenderCommandQueue::new();
    let transform: BufferRef = MockBuffer::new("transform", BufferUsage::Constant, 128, 0);
    let s = shader();

    let submit = |queue: &RenderCommandQueue| {
        queue.submit_bind_shader(None, s.clone());
        queue.submit_bind_constant_buffer(None, transform.clone(), 0);
        queue.submit_draw(None, DrawCommand::new(triangle(), 3));
    };

    // First frame: nothing cached yet
    submit(&queue);
    render_frame(&mut renderer, &queue).unwrap();
    let first = renderer.context.take_calls();
    assert_eq!(first[0], MockCall::BeginPass(PassKind::Shadow));
    assert_eq!(first[1], MockCall::EndPass(PassKind::Shadow));

    // Second frame: the shader bound last frame stays bound, so the replay draws
    submit(&queue);
    render_frame(&mut renderer, &queue).unwrap();
    let second = renderer.context.take_calls();
    let end = second.iter().position(|c| *c == MockCall::EndPass(PassKind::Shadow)).unwrap();
    assert_eq!(second[0], MockCall::BeginPass(PassKind::Shadow));
    assert!(matches!(second[1], MockCall::BindConstantBuffer { slot: 0, .. }));
    assert!(matches!(second[2], MockCall::Draw { vertex_count: 3, .. }));
    assert_eq!(end, 3);
    assert_eq!(renderer.stats().shadow_draws, 1);
}

#[test]
fn test_unbalanced_pass_scope_cleared_at_frame_end() {
    let mut renderer = initialized_renderer();
    let queue = RenderCommandQueue::new();
    queue.submit_custom(None, "leaky", |ctx| ctx.begin_skybox_pass());

    render_frame(&mut renderer, &queue).unwrap();
    assert_eq!(renderer.context.open_scopes(), 0);
}

#[test]
fn test_cleanup_is_terminal() {
    let mut renderer = initialized_renderer();
    renderer.cleanup();
    renderer.cleanup();
    assert_eq!(renderer.state(), LifecycleState::CleanedUp);
    assert!(handle_window_event(&mut renderer, WindowEvent::Minimized).is_err());
}
