use super::*;
use crate::d3d12_convert::DXGI_ERROR_DEVICE_REMOVED;
use crate::null_device::{NullDx12Device, ObjectKind, Submission};
use glam::Vec3;
use tetra_render::layout::{ObjectConstants, Vertex, SLOT_TRANSFORM};
use tetra_render::{
    BufferDesc, BufferRef, DrawIndexedCommand, GpuResource, RenderMode, ShaderDesc, ShaderStageDesc, TextureDesc,
    VertexLayout,
};

// ============================================================================
// Helpers
// ============================================================================

fn config() -> RendererConfig {
    RendererConfig { msaa_samples: 1, ..RendererConfig::default() }
}

fn initialized(device: &Arc<NullDx12Device>, config: RendererConfig) -> Dx12Renderer {
    let mut renderer = Dx12Renderer::new(device.clone(), config).unwrap();
    renderer.initialize().unwrap();
    renderer
}

fn dxbc() -> Vec<u8> {
    let mut bytes = b"DXBC".to_vec();
    bytes.resize(128, 0);
    bytes
}

fn shader(renderer: &mut Dx12Renderer, label: &str) -> ShaderRef {
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
fn cube(renderer: &mut Dx12Renderer) -> (BufferRef, BufferRef, BufferRef) {
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

fn run_frame(renderer: &mut Dx12Renderer, queue: &RenderCommandQueue) -> FrameStatus {
    let status = renderer.begin_render(queue).unwrap();
    if status.is_ready() {
        queue.execute_commands(renderer.context());
        renderer.end_render().unwrap();
    }
    status
}

fn direct_submissions(device: &NullDx12Device) -> Vec<Submission> {
    device
        .submissions()
        .into_iter()
        .filter(|s| s.queue == QueueKind::Direct)
        .collect()
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_begin_before_initialize_is_invalid() {
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = Dx12Renderer::new(device.clone(), config()).unwrap();
    let queue = RenderCommandQueue::new();
    assert!(matches!(renderer.begin_render(&queue), Err(Error::InvalidState(_))));
    assert_eq!(renderer.state(), LifecycleState::Uninitialized);
}

#[test]
fn test_initialize_builds_frame_slots() {
    let device = Arc::new(NullDx12Device::new());
    let renderer = initialized(&device, RendererConfig { frames_in_flight: 3, ..config() });
    assert_eq!(renderer.state(), LifecycleState::Initialized);
    assert_eq!(device.live_objects_of(ObjectKind::CommandAllocator), 3 + 1);
    assert_eq!(device.live_objects_of(ObjectKind::BackBuffer), 3);
    // Frame fence and three allocators, plus the copy path's fence and allocator
    assert_eq!(renderer.stats().live_sync_objects, 1 + 3 + 2);
    assert_eq!(
        renderer.stats().live_sync_objects as usize,
        device.live_objects_of(ObjectKind::Fence) + device.live_objects_of(ObjectKind::CommandAllocator)
    );
}

#[test]
fn test_cleanup_releases_every_native_object() {
    let device = Arc::new(NullDx12Device::new());
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
    // Handles the application still holds are expired, not dangling
    assert!(!cube.0.is_alive());
    assert!(!lit.is_alive());
    assert_eq!(renderer.context.tracker().live_count(), 0);
}

#[test]
fn test_create_after_cleanup_is_invalid_state() {
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = initialized(&device, config());
    renderer.cleanup();
    let result = renderer.context().create_buffer(&BufferDesc::constant_sized("late", 64));
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

// ============================================================================
// FRAMES
// ============================================================================

#[test]
fn test_cube_frame_records_without_violations() {
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = initialized(&device, config());
    let lit = shader(&mut renderer, "lit");
    let cube = cube(&mut renderer);
    let queue = RenderCommandQueue::new();
    submit_cube(&queue, &lit, &cube);

    assert_eq!(run_frame(&mut renderer, &queue), FrameStatus::Ready);

    assert!(device.violations().is_empty(), "{:?}", device.violations());
    let frames = direct_submissions(&device);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].draws(), 1);
    assert!(matches!(frames[0].commands[0], ListCommand::SetGraphicsRootSignature(_)));
    assert!(matches!(
        frames[0].commands.last(),
        Some(ListCommand::ResourceBarrier { after: ResourceState::Present, .. })
    ));

    let stats = renderer.stats();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.pipeline_binds, 1);
    assert_eq!(stats.descriptor_allocations, 1);
    assert_eq!(stats.presented_frames, 1);
    assert_eq!(stats.cached_pipelines, 1);
    assert_eq!(device.counters().presents, 1);
}

#[test]
fn test_slot_reuse_waits_for_its_fence() {
    let device = Arc::new(NullDx12Device::new().with_lag(2));
    let mut renderer = initialized(&device, config());
    let lit = shader(&mut renderer, "lit");
    let cube = cube(&mut renderer);
    let queue = RenderCommandQueue::new();
    let uploads = device.counters().blocking_waits;

    for _ in 0..4 {
        submit_cube(&queue, &lit, &cube);
        assert_eq!(run_frame(&mut renderer, &queue), FrameStatus::Ready);
    }

    // The null device rejects an allocator reset while its lists still execute
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    // Slot 0 comes back around while its first frame is still two signals out
    assert!(device.counters().blocking_waits > uploads);
    assert_eq!(renderer.stats().presented_frames, 4);
    assert_eq!(renderer.timing().frame_index(), 4);
}

#[test]
fn test_thousand_frames_with_minimize_keep_native_objects_constant() {
    let device = Arc::new(NullDx12Device::new().with_lag(2));
    let mut renderer = initialized(&device, config());
    let lit = shader(&mut renderer, "lit");
    let cube = cube(&mut renderer);
    let queue = RenderCommandQueue::new();

    for _ in 0..renderer.config.frames_in_flight() + 1 {
        submit_cube(&queue, &lit, &cube);
        assert_eq!(run_frame(&mut renderer, &queue), FrameStatus::Ready);
    }
    let baseline = device.live_objects();
    let sync_baseline = renderer.stats().live_sync_objects;
    let skipped_before = renderer.stats().skipped_frames;

    for frame in 0..1000 {
        match frame {
            500 => renderer.resize(0, 0).unwrap(),
            510 => renderer.resize(640, 480).unwrap(),
            _ => {}
        }
        submit_cube(&queue, &lit, &cube);
        let status = run_frame(&mut renderer, &queue);
        if (500..510).contains(&frame) {
            assert_eq!(status, FrameStatus::Skipped(SkipReason::Minimized), "frame {}", frame);
            queue.clear();
        } else {
            assert_eq!(status, FrameStatus::Ready, "frame {}", frame);
            assert_eq!(device.live_objects(), baseline, "frame {}", frame);
            assert_eq!(renderer.stats().live_sync_objects, sync_baseline, "frame {}", frame);
        }
        device.take_submissions();
    }

    assert_eq!(renderer.stats().skipped_frames - skipped_before, 10);
    assert!(device.violations().is_empty(), "{:?}", device.violations());
}

#[test]
fn test_msaa_resolves_into_back_buffer() {
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = initialized(&device, RendererConfig { msaa_samples: 4, ..config() });
    assert_eq!(renderer.msaa_samples(), 4);
    let queue = RenderCommandQueue::new();
    run_frame(&mut renderer, &queue);

    let frames = direct_submissions(&device);
    assert!(frames[0].commands.iter().any(|c| matches!(c, ListCommand::ResolveSubresource { .. })));
    assert!(device.violations().is_empty(), "{:?}", device.violations());
}

#[test]
fn test_msaa_clamped_to_device_support() {
    let device = Arc::new(NullDx12Device::new().with_max_samples(2));
    let renderer = initialized(&device, RendererConfig { msaa_samples: 8, ..config() });
    assert_eq!(renderer.msaa_samples(), 2);
}

#[test]
fn test_device_removed_on_present_is_fatal() {
    let device = Arc::new(NullDx12Device::new());
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
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = initialized(&device, config());
    assert!(matches!(renderer.end_render(), Err(Error::InvalidState(_))));
}

// ============================================================================
// RESIZE
// ============================================================================

#[test]
fn test_minimized_frames_are_skipped() {
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = initialized(&device, config());
    let queue = RenderCommandQueue::new();

    renderer.resize(0, 0).unwrap();
    assert_eq!(run_frame(&mut renderer, &queue), FrameStatus::Skipped(SkipReason::Minimized));
    assert_eq!(renderer.state(), LifecycleState::Initialized);
    assert_eq!(renderer.stats().skipped_frames, 1);
    assert!(direct_submissions(&device).is_empty());

    renderer.resize(800, 600).unwrap();
    assert_eq!(run_frame(&mut renderer, &queue), FrameStatus::Ready);
}

#[test]
fn test_resize_recreates_targets() {
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = initialized(&device, config());
    let queue = RenderCommandQueue::new();
    run_frame(&mut renderer, &queue);

    renderer.resize(640, 480).unwrap();

    let swapchain = renderer.presentation.as_ref().map(|p| p.swapchain).unwrap();
    assert_eq!(device.swapchain_extent(swapchain), Some((640, 480)));
    assert_eq!(device.counters().resizes, 1);
    assert_eq!(device.live_objects_of(ObjectKind::BackBuffer), 2);
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    assert_eq!(run_frame(&mut renderer, &queue), FrameStatus::Ready);
}

#[test]
fn test_mid_frame_resize_is_deferred() {
    let device = Arc::new(NullDx12Device::new());
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
// PIPELINE STATE
// ============================================================================

#[test]
fn test_render_mode_waits_for_next_pipeline_bind() {
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = initialized(&device, config());
    let lit = shader(&mut renderer, "lit");
    let (vertices, indices, transform) = cube(&mut renderer);
    let queue = RenderCommandQueue::new();
    renderer.begin_render(&queue).unwrap();

    let ctx = renderer.context();
    ctx.bind_shader(&lit).unwrap();
    ctx.bind_constant_buffer(&transform, SLOT_TRANSFORM).unwrap();
    ctx.draw_indexed(&vertices, &indices, 36).unwrap();
    ctx.set_render_mode(RenderMode::Wireframe);
    ctx.draw_indexed(&vertices, &indices, 36).unwrap();
    assert_eq!(device.counters().pipelines_created, 1);

    ctx.bind_shader(&lit).unwrap();
    ctx.draw_indexed(&vertices, &indices, 36).unwrap();
    renderer.end_render().unwrap();

    assert_eq!(device.counters().pipelines_created, 2);
    assert_eq!(renderer.stats().pipeline_binds, 2);
    assert_eq!(renderer.stats().draw_calls, 3);
}

#[test]
fn test_skybox_scope_restores_pipeline() {
    let device = Arc::new(NullDx12Device::new());
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

    // Main PSO is reused after the scope closes
    assert_eq!(device.counters().pipelines_created, 2);
    assert_eq!(renderer.stats().pipeline_binds, 3);
}

// ============================================================================
// SOFT FAILURES
// ============================================================================

#[test]
fn test_draw_without_shader_is_invalid_state() {
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = initialized(&device, config());
    let (vertices, _, _) = cube(&mut renderer);
    let queue = RenderCommandQueue::new();
    renderer.begin_render(&queue).unwrap();

    let result = renderer.context().draw(&vertices, 24);
    assert!(matches!(result, Err(Error::InvalidState(_))));
    renderer.end_render().unwrap();

    assert_eq!(direct_submissions(&device)[0].draws(), 0);
    assert_eq!(renderer.stats().draw_calls, 0);
}

#[test]
fn test_expired_texture_bind_is_rejected() {
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = initialized(&device, config());
    let texture = renderer
        .context()
        .create_texture(&TextureDesc::rgba8("checker", 2, 2, vec![255; 16]))
        .unwrap();
    texture.cleanup();
    assert!(matches!(renderer.context().bind_texture(&texture, 0), Err(Error::InvalidResource(_))));
}

#[test]
fn test_texture_expiring_after_bind_falls_back_to_white() {
    let device = Arc::new(NullDx12Device::new());
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

    let table = direct_submissions(&device)[0]
        .commands
        .iter()
        .find_map(|c| match c {
            ListCommand::SetGraphicsRootDescriptorTable { views, .. } => Some(views.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(table.len(), 5);
    assert_eq!(table[0], table[1], "expired slot uses the fallback SRV");
    assert!(device.violations().is_empty(), "{:?}", device.violations());
}

#[test]
fn test_texture_slot_four_is_reserved() {
    let device = Arc::new(NullDx12Device::new());
    let mut renderer = initialized(&device, config());
    let texture = renderer
        .context()
        .create_texture(&TextureDesc::rgba8("checker", 1, 1, vec![255; 4]))
        .unwrap();
    assert!(matches!(renderer.context().bind_texture(&texture, 4), Err(Error::InvalidResource(_))));
}

// ============================================================================
// SHADOW PASS
// ============================================================================

#[test]
fn test_shadow_pass_replays_last_drain() {
    let device = Arc::new(NullDx12Device::new());
    let mut shadowed = config();
    shadowed.shadow.enabled = true;
    shadowed.shadow.map_size = 512;
    let mut renderer = initialized(&device, shadowed);
    let lit = shader(&mut renderer, "lit");
    let depth_only = shader(&mut renderer, "shadow");
    renderer.set_shadow_shader(Some(depth_only));
    renderer.set_shadow_view_projection(Mat4::orthographic_rh(-5.0, 5.0, -5.0, 5.0, 0.1, 20.0));
    let cube = cube(&mut renderer);
    let queue = RenderCommandQueue::new();

    // First frame fills the shadow cache, second replays it
    submit_cube(&queue, &lit, &cube);
    run_frame(&mut renderer, &queue);
    assert_eq!(renderer.stats().shadow_draws, 0);
    submit_cube(&queue, &lit, &cube);
    run_frame(&mut renderer, &queue);

    let stats = renderer.stats();
    assert_eq!(stats.shadow_draws, 1);
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(device.counters().pipelines_created, 2);
    assert!(device.violations().is_empty(), "{:?}", device.violations());

    let frame = &direct_submissions(&device)[1];
    assert!(frame.commands.iter().any(|c| matches!(
        c,
        ListCommand::SetRenderTargets { rtv: None, dsv: Some(_) }
    )));
    assert!(frame.commands.iter().any(|c| matches!(
        c,
        ListCommand::SetViewport { width: 512, height: 512 }
    )));
}

#[test]
fn test_shadow_pass_needs_a_shader() {
    let device = Arc::new(NullDx12Device::new());
    let mut shadowed = config();
    shadowed.shadow.enabled = true;
    let mut renderer = initialized(&device, shadowed);
    let lit = shader(&mut renderer, "lit");
    let cube = cube(&mut renderer);
    let queue = RenderCommandQueue::new();

    submit_cube(&queue, &lit, &cube);
    run_frame(&mut renderer, &queue);
    submit_cube(&queue, &lit, &cube);
    run_frame(&mut renderer, &queue);

    assert_eq!(renderer.stats().shadow_draws, 0);
    assert_eq!(renderer.stats().draw_calls, 1);
}
