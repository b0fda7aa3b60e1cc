use super::*;
use crate::d3d11_convert::DXGI_ERROR_DEVICE_REMOVED;
use crate::null_device::{NullDx11Device, ObjectKind};
use glam::Vec3;
use tetra_render::layout::{ObjectConstants, Vertex, SLOT_TRANSFORM};
use tetra_render::{
    BufferDesc, BufferRef, DrawIndexedCommand, GpuResource, RenderMode, ShaderDesc, ShaderRef, ShaderStageDesc,
    TextureDesc, VertexLayout,
};

// ============================================================================
// Helpers
// ============================================================================

fn config() -> RendererConfig {
    RendererConfig { msaa_samples: 1, ..RendererConfig::default() }
}

fn initialized(device: &Arc<NullDx11Device>, config: RendererConfig) -> Dx11Renderer {
    let mut renderer = Dx11Renderer::new(device.clone(), config);
    renderer.initialize().unwrap();
    renderer
}

fn dxbc() -> Vec<u8> {
    let mut bytes = b"DXBC".to_vec();
    bytes.resize(128, 0);
    bytes
}

fn shader(renderer: &mut Dx11Renderer, label: &str) -> ShaderRef {
    renderer
        .context()
        .create_shader(&ShaderDesc {
            label: label.to_string(),
            vertex: ShaderStageDesc::new(dxbc()),
            fragment: ShaderStageDesc::new(dxbc()),
            layout: VertexLayout::Standard,
        })
        .unwrap()
}

/// Vertex, index and transform buffers of a cube
fn cube(renderer: &mut Dx11Renderer) -> (BufferRef, BufferRef, BufferRef) {
    let vertices = vec![Vertex::new(Vec3::ZERO, Vec3::Y, [0.0, 0.0]); 24];
    let indices: Vec<u16> = (0..36).map(|i| (i % 24) as u16).collect();
    let ctx = renderer.context();
    let vertex_buffer = ctx.create_buffer(&BufferDesc::vertex("cube vertices", &vertices)).unwrap();
    let index_buffer = ctx.create_buffer(&BufferDesc::index_u16("cube indices", &indices)).unwrap();
    let transform = ctx
        .create_buffer(&BufferDesc::constant("cube transform", &ObjectConstants::default()))
        .unwrap();
    (vertex_buffer, index_buffer, transform)
}

fn submit_cube(queue: &RenderCommandQueue, shader: &ShaderRef, cube: &(BufferRef, BufferRef, BufferRef)) {
    queue.submit_bind_shader(None, shader.clone());
    queue.submit_bind_constant_buffer(None, cube.2.clone(), SLOT_TRANSFORM);
    queue.submit_draw_indexed(None, DrawIndexedCommand::new(cube.0.clone(), cube.1.clone(), 36));
}

fn run_frame(renderer: &mut Dx11Renderer, queue: &RenderCommandQueue) -> FrameStatus {
    let status = renderer.begin_render(queue).unwrap();
    if status.is_ready() {
        queue.execute_commands(renderer.context());
        renderer.end_render().unwrap();
    }
    status
}

fn srv_calls(device: &NullDx11Device) -> Vec<(u32, Vec<NativeHandle>)> {
    device
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ContextCall::PSSetShaderResources { start_slot, views } => Some((start_slot, views)),
            _ => None,
        })
        .collect()
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_begin_before_initialize_is_invalid() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = Dx11Renderer::new(device.clone(), config());
    let queue = RenderCommandQueue::new();
    assert!(matches!(renderer.begin_render(&queue), Err(Error::InvalidState(_))));
    assert_eq!(renderer.state(), LifecycleState::Uninitialized);
}

#[test]
fn test_initialize_builds_targets() {
    let device = Arc::new(NullDx11Device::new());
    let renderer = initialized(&device, config());
    assert_eq!(renderer.state(), LifecycleState::Initialized);
    assert_eq!(renderer.backend(), BackendKind::D3D11);
    assert_eq!(device.live_objects_of(ObjectKind::Swapchain), 1);
    assert_eq!(device.live_objects_of(ObjectKind::BackBuffer), 1);
    assert_eq!(device.live_objects_of(ObjectKind::Sampler), 2);
    assert_eq!(renderer.stats().live_sync_objects, 0);
}

#[test]
fn test_cleanup_releases_every_native_object() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, RendererConfig { msaa_samples: 4, ..config() });
    let lit = shader(&mut renderer, "lit");
    let cube = cube(&mut renderer);
    let queue = RenderCommandQueue::new();
    submit_cube(&queue, &lit, &cube);
    run_frame(&mut renderer, &queue);

    renderer.cleanup();
    renderer.cleanup();

    assert_eq!(renderer.state(), LifecycleState::CleanedUp);
    assert_eq!(device.live_objects(), 0);
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    assert!(!cube.0.is_alive());
    assert!(!lit.is_alive());
    assert_eq!(renderer.context.tracker().live_count(), 0);
}

#[test]
fn test_create_after_cleanup_is_invalid_state() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    renderer.cleanup();
    let result = renderer.context().create_buffer(&BufferDesc::constant_sized("late", 64));
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

#[test]
fn test_wait_idle_flushes_the_context() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    renderer.wait_idle().unwrap();
    assert_eq!(device.counters().flushes, 1);
}

// ============================================================================
// FRAMES
// ============================================================================

#[test]
fn test_cube_frame_draws_without_violations() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let lit = shader(&mut renderer, "lit");
    let cube = cube(&mut renderer);
    let queue = RenderCommandQueue::new();
    submit_cube(&queue, &lit, &cube);

    assert_eq!(run_frame(&mut renderer, &queue), FrameStatus::Ready);

    assert!(device.violations().is_empty(), "{:?}", device.violations());
    assert_eq!(device.counters().draws, 1);
    assert_eq!(device.counters().presents, 1);

    let stats = renderer.stats();
    assert_eq!(stats.draw_calls, 1);
    // Fixed-function state at frame start, then the shader
    assert_eq!(stats.pipeline_binds, 2);
    assert_eq!(stats.descriptor_allocations, 1);
    assert_eq!(stats.presented_frames, 1);
    // Rasterizer, depth-stencil and input layout
    assert_eq!(stats.cached_pipelines, 3);
}

#[test]
fn test_frame_starts_with_targets_then_clears() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    device.take_calls();
    let queue = RenderCommandQueue::new();
    run_frame(&mut renderer, &queue);

    let calls = device.calls();
    assert!(matches!(calls[0], ContextCall::OMSetRenderTargets { rtv: Some(_), dsv: Some(_) }));
    assert!(matches!(calls[1], ContextCall::RSSetViewport { width: 1280, height: 720 }));
    assert!(matches!(calls[2], ContextCall::ClearRenderTargetView { .. }));
    assert!(matches!(calls[3], ContextCall::ClearDepthStencilView { depth, .. } if depth == 1.0));
}

#[test]
fn test_msaa_resolves_into_back_buffer() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, RendererConfig { msaa_samples: 4, ..config() });
    assert_eq!(renderer.msaa_samples(), 4);
    let queue = RenderCommandQueue::new();
    run_frame(&mut renderer, &queue);

    assert!(device.calls().iter().any(|c| matches!(c, ContextCall::ResolveSubresource { .. })));
    assert!(device.violations().is_empty(), "{:?}", device.violations());
}

#[test]
fn test_msaa_clamped_to_device_support() {
    let device = Arc::new(NullDx11Device::new().with_max_samples(2));
    let renderer = initialized(&device, RendererConfig { msaa_samples: 8, ..config() });
    assert_eq!(renderer.msaa_samples(), 2);
}

#[test]
fn test_device_removed_on_present_is_fatal() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let queue = RenderCommandQueue::new();
    renderer.begin_render(&queue).unwrap();
    device.fail_next_present(DXGI_ERROR_DEVICE_REMOVED);

    let result = renderer.end_render();
    assert_eq!(result, Err(Error::DeviceLost));
    assert!(result.unwrap_err().is_fatal());
}

#[test]
fn test_end_without_begin_is_invalid() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    assert!(matches!(renderer.end_render(), Err(Error::InvalidState(_))));
}

// ============================================================================
// RESIZE
// ============================================================================

#[test]
fn test_minimized_frames_are_skipped() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let queue = RenderCommandQueue::new();

    renderer.resize(0, 0).unwrap();
    assert_eq!(run_frame(&mut renderer, &queue), FrameStatus::Skipped(SkipReason::Minimized));
    assert_eq!(renderer.state(), LifecycleState::Initialized);
    assert_eq!(renderer.stats().skipped_frames, 1);
    assert_eq!(device.counters().presents, 0);

    renderer.resize(800, 600).unwrap();
    assert_eq!(run_frame(&mut renderer, &queue), FrameStatus::Ready);
}

#[test]
fn test_resize_unbinds_and_recreates_targets() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let queue = RenderCommandQueue::new();
    run_frame(&mut renderer, &queue);

    renderer.resize(640, 480).unwrap();

    let swapchain = renderer.presentation.as_ref().map(|p| p.swapchain).unwrap();
    assert_eq!(device.swapchain_extent(swapchain), Some((640, 480)));
    assert_eq!(device.counters().resizes, 1);
    assert_eq!(device.live_objects_of(ObjectKind::BackBuffer), 1);
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    assert_eq!(run_frame(&mut renderer, &queue), FrameStatus::Ready);
}

#[test]
fn test_mid_frame_resize_is_deferred() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let queue = RenderCommandQueue::new();

    renderer.begin_render(&queue).unwrap();
    renderer.resize(1024, 768).unwrap();
    assert_eq!(device.counters().resizes, 0);
    renderer.end_render().unwrap();

    run_frame(&mut renderer, &queue);
    assert_eq!(device.counters().resizes, 1);
    assert!(device.violations().is_empty(), "{:?}", device.violations());
}

// ============================================================================
// STATE
// ============================================================================

#[test]
fn test_render_mode_applies_immediately() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let lit = shader(&mut renderer, "lit");
    let (vertices, indices, _) = cube(&mut renderer);
    let queue = RenderCommandQueue::new();
    renderer.begin_render(&queue).unwrap();

    let ctx = renderer.context();
    ctx.bind_shader(&lit).unwrap();
    ctx.draw_indexed(&vertices, &indices, 36).unwrap();
    device.take_calls();
    ctx.set_render_mode(RenderMode::Wireframe);

    assert_eq!(device.counters().rasterizer_states_created, 2);
    assert!(matches!(device.calls().as_slice(), [ContextCall::RSSetState(_)]));

    ctx.draw_indexed(&vertices, &indices, 36).unwrap();
    renderer.end_render().unwrap();
    assert_eq!(renderer.stats().draw_calls, 2);
}

#[test]
fn test_render_mode_outside_frame_waits_for_next_frame() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    renderer.context().set_render_mode(RenderMode::Wireframe);
    assert!(device.calls().is_empty());

    let queue = RenderCommandQueue::new();
    run_frame(&mut renderer, &queue);
    assert_eq!(device.counters().rasterizer_states_created, 1);
    assert!(device.calls().iter().any(|c| matches!(c, ContextCall::RSSetState(_))));
}

#[test]
fn test_skybox_scope_restores_state() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let lit = shader(&mut renderer, "lit");
    let (vertices, indices, _) = cube(&mut renderer);
    let queue = RenderCommandQueue::new();
    renderer.begin_render(&queue).unwrap();

    let ctx = renderer.context();
    ctx.bind_shader(&lit).unwrap();
    ctx.draw_indexed(&vertices, &indices, 36).unwrap();
    ctx.begin_skybox_pass().unwrap();
    ctx.draw_indexed(&vertices, &indices, 36).unwrap();
    ctx.end_skybox_pass().unwrap();
    ctx.draw_indexed(&vertices, &indices, 36).unwrap();
    assert!(matches!(ctx.end_skybox_pass(), Err(Error::InvalidState(_))));
    renderer.end_render().unwrap();

    assert_eq!(device.counters().rasterizer_states_created, 2);
    assert_eq!(device.counters().depth_states_created, 2);
    // Frame start, shader, scope open, scope close
    assert_eq!(renderer.stats().pipeline_binds, 4);
    assert!(device.violations().is_empty(), "{:?}", device.violations());
}

#[test]
fn test_debug_line_scope_uses_color_layout() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let lit = shader(&mut renderer, "lines");
    let queue = RenderCommandQueue::new();
    renderer.begin_render(&queue).unwrap();

    let ctx = renderer.context();
    ctx.bind_shader(&lit).unwrap();
    ctx.begin_debug_line_pass().unwrap();
    ctx.end_debug_line_pass().unwrap();
    renderer.end_render().unwrap();

    // Standard layout for the main pass, position + color inside the scope
    assert_eq!(device.counters().input_layouts_created, 2);
    assert!(device
        .calls()
        .iter()
        .any(|c| *c == ContextCall::IASetPrimitiveTopology(crate::d3d11_convert::D3D11_PRIMITIVE_TOPOLOGY_LINELIST)));
}

// ============================================================================
// SOFT FAILURES
// ============================================================================

#[test]
fn test_draw_without_shader_is_invalid_state() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let (vertices, _, _) = cube(&mut renderer);
    let queue = RenderCommandQueue::new();
    renderer.begin_render(&queue).unwrap();

    let result = renderer.context().draw(&vertices, 24);
    assert!(matches!(result, Err(Error::InvalidState(_))));
    renderer.end_render().unwrap();

    assert_eq!(device.counters().draws, 0);
    assert_eq!(renderer.stats().draw_calls, 0);
}

#[test]
fn test_shadow_map_slot_is_reserved() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let texture = renderer
        .context()
        .create_texture(&TextureDesc::rgba8("checker", 2, 2, vec![255; 16]))
        .unwrap();
    assert!(matches!(renderer.context().bind_texture(&texture, 4), Err(Error::InvalidResource(_))));
}

#[test]
fn test_texture_expiring_after_bind_falls_back_to_white() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let lit = shader(&mut renderer, "lit");
    let (vertices, indices, _) = cube(&mut renderer);
    let texture = renderer
        .context()
        .create_texture(&TextureDesc::rgba8("checker", 2, 2, vec![255; 16]))
        .unwrap();
    let queue = RenderCommandQueue::new();
    renderer.begin_render(&queue).unwrap();

    let ctx = renderer.context();
    ctx.bind_shader(&lit).unwrap();
    ctx.bind_texture(&texture, 0).unwrap();
    texture.cleanup();
    ctx.draw_indexed(&vertices, &indices, 36).unwrap();
    renderer.end_render().unwrap();

    let srvs = srv_calls(&device);
    let (_, table) = &srvs[0];
    assert_eq!(table.len(), 5);
    let fallback = table[0];
    assert_eq!(srvs.last(), Some(&(0, vec![fallback])));
    assert!(device.violations().is_empty(), "{:?}", device.violations());
}

#[test]
fn test_constant_buffer_expiring_after_bind_is_unbound() {
    let device = Arc::new(NullDx11Device::new());
    let mut renderer = initialized(&device, config());
    let lit = shader(&mut renderer, "lit");
    let (vertices, indices, transform) = cube(&mut renderer);
    let queue = RenderCommandQueue::new();
    renderer.begin_render(&queue).unwrap();

    let ctx = renderer.context();
    ctx.bind_shader(&lit).unwrap();
    ctx.bind_constant_buffer(&transform, SLOT_TRANSFORM).unwrap();
    transform.cleanup();
    ctx.draw_indexed(&vertices, &indices, 36).unwrap();
    renderer.end_render().unwrap();

    assert!(device
        .calls()
        .contains(&ContextCall::VSSetConstantBuffer { slot: SLOT_TRANSFORM, buffer: None }));
    assert!(device.violations().is_empty(), "{:?}", device.violations());
}
