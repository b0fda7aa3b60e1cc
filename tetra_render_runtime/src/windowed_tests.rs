use super::*;
use tetra_render::BackendKind;

// ============================================================================
// WINDOW EVENTS
// ============================================================================

#[test]
fn test_zero_extent_is_a_minimize() {
    assert_eq!(resize_event(0, 0), WindowEvent::Minimized);
    assert_eq!(resize_event(800, 0), WindowEvent::Minimized);
    assert_eq!(resize_event(0, 600), WindowEvent::Minimized);
}

#[test]
fn test_nonzero_extent_is_a_resize() {
    assert_eq!(resize_event(800, 600), WindowEvent::Resized { width: 800, height: 600 });
}

// ============================================================================
// STARTUP
// ============================================================================

#[test]
fn test_windowed_run_without_stages_fails_before_opening_a_window() {
    let options = DemoOptions::new(BackendKind::D3D12);
    let result = run_windowed_demo(&options);
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}
