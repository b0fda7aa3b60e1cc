//! Integration tests for VulkanRenderer
//!
//! All tests require a GPU and a display, and are marked with #[ignore].
//!
//! Run with: cargo test -p tetra_render_vulkan --test vulkan_renderer_tests -- --ignored

use glam::Vec3;
use std::sync::Arc;
use tetra_render::frame_loop::render_frame;
use tetra_render::layout::{ObjectConstants, Vertex};
use tetra_render::{
    Buffer, BufferDesc, BufferRef, Error, FrameStatus, GpuResource, LifecycleState, RenderCommandQueue, Renderer, RendererConfig,
    SkipReason, Texture, TextureDesc, TextureKind,
};
use tetra_render_vulkan::VulkanRenderer;
use winit::event_loop::EventLoop;
use winit::window::Window;

/// Hidden window for tests
#[allow(deprecated)]
fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = EventLoop::new().unwrap();
    let window_attrs = Window::default_attributes()
        .with_title("Tetra Vulkan Test")
        .with_inner_size(winit::dpi::LogicalSize::new(800, 600))
        .with_visible(false);
    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}

fn test_config() -> RendererConfig {
    RendererConfig {
        width: 800,
        height: 600,
        enable_validation: false,
        ..RendererConfig::default()
    }
}

fn initialized_renderer(window: &Window) -> VulkanRenderer {
    let mut renderer = VulkanRenderer::new(window, test_config()).unwrap();
    renderer.initialize().unwrap();
    renderer
}

fn triangle() -> Vec<Vertex> {
    vec![
        Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::Z, [0.0, 0.0]),
        Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::Z, [1.0, 0.0]),
        Vertex::new(Vec3::new(0.0, 0.5, 0.0), Vec3::Z, [0.5, 1.0]),
    ]
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_initialize_and_cleanup() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = VulkanRenderer::new(&window, test_config()).unwrap();
    assert_eq!(renderer.state(), LifecycleState::Uninitialized);

    renderer.initialize().unwrap();
    assert_eq!(renderer.state(), LifecycleState::Initialized);
    assert_eq!(renderer.stats().live_sync_objects, 2 * 3);

    renderer.cleanup();
    assert_eq!(renderer.state(), LifecycleState::CleanedUp);
    // Idempotent
    renderer.cleanup();
    assert_eq!(renderer.state(), LifecycleState::CleanedUp);
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_double_initialize_is_rejected() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = initialized_renderer(&window);
    assert!(matches!(renderer.initialize(), Err(Error::InvalidState(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_begin_render_before_initialize() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = VulkanRenderer::new(&window, test_config()).unwrap();
    let queue = RenderCommandQueue::new();
    assert!(matches!(renderer.begin_render(&queue), Err(Error::InvalidState(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_msaa_clamped_to_device() {
    let (window, _event_loop) = create_test_window();
    let renderer = initialized_renderer(&window);
    let samples = renderer.msaa_samples();
    assert!(samples.is_power_of_two());
    assert!(samples <= renderer.device_limits().max_samples.max(1));
}

// ============================================================================
// FRAMES
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_render_empty_frames() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = initialized_renderer(&window);
    let queue = RenderCommandQueue::new();

    let mut presented = 0;
    for _ in 0..5 {
        let outcome = render_frame(&mut renderer, &queue).unwrap();
        if outcome.status == FrameStatus::Ready {
            presented += 1;
        }
    }
    assert!(presented > 0);
    assert_eq!(renderer.stats().presented_frames, presented);
    assert_eq!(renderer.state(), LifecycleState::Initialized);
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_minimized_frames_are_skipped() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = initialized_renderer(&window);
    let queue = RenderCommandQueue::new();

    renderer.resize(0, 0).unwrap();
    let status = renderer.begin_render(&queue).unwrap();
    assert_eq!(status, FrameStatus::Skipped(SkipReason::Minimized));
    assert_eq!(renderer.state(), LifecycleState::Initialized);
    assert_eq!(renderer.stats().skipped_frames, 1);

    renderer.resize(640, 480).unwrap();
    let outcome = render_frame(&mut renderer, &queue).unwrap();
    assert_ne!(outcome.status, FrameStatus::Skipped(SkipReason::Minimized));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_draw_without_shader_fails_in_queue() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = initialized_renderer(&window);
    let queue = RenderCommandQueue::new();

    let vertices = renderer
        .context()
        .create_buffer(&BufferDesc::vertex("triangle", &triangle()))
        .unwrap();
    queue.submit_draw(None, tetra_render::DrawCommand::new(vertices, 3));

    let outcome = render_frame(&mut renderer, &queue).unwrap();
    if let Some(report) = outcome.report {
        assert_eq!(report.failed, 1);
        assert_eq!(report.executed, 0);
    }
    assert_eq!(renderer.stats().draw_calls, 0);
}

// ============================================================================
// RESOURCES
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_create_buffers() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = initialized_renderer(&window);
    let ctx = renderer.context();

    let vertices = ctx.create_buffer(&BufferDesc::vertex("triangle", &triangle())).unwrap();
    assert_eq!(vertices.size(), 3 * 92);
    assert_eq!(vertices.element_count(), 3);

    let indices = ctx.create_buffer(&BufferDesc::index_u16("indices", &[0, 1, 2])).unwrap();
    assert_eq!(indices.stride(), 2);

    let constants = ctx.create_buffer(&BufferDesc::constant("object", &ObjectConstants::default())).unwrap();
    assert_eq!(constants.size(), 128);
    ctx.update_constant_buffer(&constants, bytemuck::bytes_of(&ObjectConstants::default())).unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_create_textures() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = initialized_renderer(&window);
    let ctx = renderer.context();

    let texture = ctx
        .create_texture(&TextureDesc::rgba8("checker", 4, 4, vec![255; 4 * 4 * 4]))
        .unwrap();
    assert_eq!(texture.kind(), TextureKind::Texture2D);
    assert_eq!((texture.width(), texture.height()), (4, 4));

    let faces: [Vec<u8>; 6] = std::array::from_fn(|face| vec![face as u8 * 40; 2 * 2 * 4]);
    let cubemap = ctx.create_cubemap_texture(&TextureDesc::rgba8_cubemap("sky", 2, faces)).unwrap();
    assert_eq!(cubemap.kind(), TextureKind::Cubemap);
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_texture_size_mismatch_rejected() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = initialized_renderer(&window);
    let result = renderer
        .context()
        .create_texture(&TextureDesc::rgba8("short", 4, 4, vec![0; 10]));
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_expired_buffer_cannot_be_bound() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = initialized_renderer(&window);
    let ctx = renderer.context();

    let constants: BufferRef = ctx.create_buffer(&BufferDesc::constant_sized("camera", 288)).unwrap();
    constants.cleanup();
    assert!(!constants.is_alive());
    assert!(matches!(ctx.bind_constant_buffer(&constants, 1), Err(Error::InvalidResource(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_cleanup_releases_outstanding_handles() {
    let (window, _event_loop) = create_test_window();
    let mut renderer = initialized_renderer(&window);
    let buffer = renderer
        .context()
        .create_buffer(&BufferDesc::vertex("held", &triangle()))
        .unwrap();
    let held = Arc::clone(&buffer);

    renderer.cleanup();
    assert!(!held.is_alive());
    // Dropping the last handle after teardown must not touch the device
    drop(buffer);
    drop(held);
}
