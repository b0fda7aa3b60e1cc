use super::*;
use crate::demo::headless_shader;
use crate::factory::{create_renderer_with, Drivers};
use crate::scene::CubeScene;
use tetra_render::frame_loop::{handle_window_event, render_frame, WindowEvent};
use tetra_render::{RendererConfig, SkipReason};

const HEADLESS: [BackendKind; 3] = [BackendKind::D3D12, BackendKind::D3D11, BackendKind::OpenGl];

fn initialized(kind: BackendKind, config: RendererConfig) -> AnyRenderer {
    let mut renderer = create_renderer_with(kind, config, &Drivers::headless()).unwrap();
    renderer.initialize().unwrap();
    renderer
}

// ============================================================================
// DELEGATION
// ============================================================================

#[test]
fn test_cube_frame_on_every_headless_backend() {
    for kind in HEADLESS {
        let mut renderer = initialized(kind, RendererConfig::default());
        let scene = CubeScene::create(renderer.context(), &headless_shader(kind).unwrap()).unwrap();
        let queue = RenderCommandQueue::new();
        scene.submit(&queue, 0.0);

        let outcome = render_frame(&mut renderer, &queue).unwrap();

        assert_eq!(outcome.status, FrameStatus::Ready, "{}", kind);
        assert_eq!(outcome.report.map(|r| r.failed), Some(0), "{}", kind);
        assert_eq!(renderer.stats().draw_calls, 1, "{}", kind);
        assert_eq!(renderer.stats().presented_frames, 1, "{}", kind);
        assert_eq!(renderer.timing().frame_index(), 1, "{}", kind);
    }
}

#[test]
fn test_minimized_frame_is_skipped() {
    for kind in HEADLESS {
        let mut renderer = initialized(kind, RendererConfig::default());
        handle_window_event(&mut renderer, WindowEvent::Minimized).unwrap();

        let queue = RenderCommandQueue::new();
        let outcome = render_frame(&mut renderer, &queue).unwrap();

        assert_eq!(outcome.status, FrameStatus::Skipped(SkipReason::Minimized), "{}", kind);
        assert_eq!(renderer.state(), LifecycleState::Initialized, "{}", kind);
    }
}

#[test]
fn test_msaa_samples_clamped_to_power_of_two() {
    for kind in HEADLESS {
        let renderer = initialized(kind, RendererConfig { msaa_samples: 3, ..RendererConfig::default() });
        assert_eq!(renderer.msaa_samples(), 2, "{}", kind);
    }
}

#[test]
fn test_cleanup_through_dyn_renderer_is_idempotent() {
    for kind in HEADLESS {
        let mut renderer = initialized(kind, RendererConfig::default());
        let dynamic = renderer.as_renderer();
        assert_eq!(dynamic.backend(), kind);

        dynamic.cleanup();
        dynamic.cleanup();

        assert_eq!(renderer.state(), LifecycleState::CleanedUp, "{}", kind);
    }
}
