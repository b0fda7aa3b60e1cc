use super::*;

// ============================================================================
// OPTIONS
// ============================================================================

#[test]
fn test_options_defaults() {
    let options = DemoOptions::from_args(Vec::<String>::new()).unwrap();
    assert_eq!(options.frames, None);
    assert_eq!(options.headless_frames(), DEFAULT_FRAMES);
    assert!(!options.headless);
    assert_ne!(options.backend, BackendKind::Vulkan);
}

#[test]
fn test_options_parse_backend_and_frames() {
    let options = DemoOptions::from_args(["--frames", "10", "--backend", "dx11"]).unwrap();
    assert_eq!(options, DemoOptions { frames: Some(10), ..DemoOptions::new(BackendKind::D3D11) });

    let options = DemoOptions::from_args(["--backend=gl", "--frames=3", "--headless"]).unwrap();
    assert_eq!(options, DemoOptions { frames: Some(3), headless: true, ..DemoOptions::new(BackendKind::OpenGl) });
}

#[test]
fn test_options_parse_stage_files() {
    let args = ["--backend", "d3d12", "--vertex", "cube.vs.cso", "--fragment=cube.ps.cso"];
    let options = DemoOptions::from_args(args).unwrap();
    assert_eq!(options.vertex_shader, Some(PathBuf::from("cube.vs.cso")));
    assert_eq!(options.fragment_shader, Some(PathBuf::from("cube.ps.cso")));
}

#[test]
fn test_explicit_vulkan_is_kept() {
    let options = DemoOptions::from_args(["--backend", "vulkan"]).unwrap();
    assert_eq!(options.backend, BackendKind::Vulkan);
}

#[test]
fn test_options_reject_bad_values() {
    assert!(DemoOptions::from_args(["--frames", "many"]).is_err());
    assert!(DemoOptions::from_args(["--frames"]).is_err());
    assert!(DemoOptions::from_args(["--vertex"]).is_err());
    assert!(DemoOptions::from_args(["--backend", "metal"]).is_err());
}

// ============================================================================
// SHADERS
// ============================================================================

#[test]
fn test_opengl_has_builtin_demo_stages() {
    let shader = demo_shader(&DemoOptions::new(BackendKind::OpenGl)).unwrap();
    assert_eq!(shader.vertex.bytecode, VERTEX_GLSL.as_bytes());
}

#[test]
fn test_other_backends_need_stage_files() {
    for backend in [BackendKind::Vulkan, BackendKind::D3D12, BackendKind::D3D11] {
        let result = demo_shader(&DemoOptions::new(backend));
        assert!(matches!(result, Err(Error::InitializationFailed(_))), "{}", backend);
    }
    let only_vertex =
        DemoOptions { vertex_shader: Some(PathBuf::from("cube.vs")), ..DemoOptions::new(BackendKind::OpenGl) };
    assert!(demo_shader(&only_vertex).is_err());
}

#[test]
fn test_unreadable_stage_file_is_reported() {
    let options = DemoOptions {
        vertex_shader: Some(PathBuf::from("/nonexistent/cube.vs")),
        fragment_shader: Some(PathBuf::from("/nonexistent/cube.fs")),
        ..DemoOptions::new(BackendKind::D3D11)
    };
    assert!(matches!(demo_shader(&options), Err(Error::InitializationFailed(_))));
}

// ============================================================================
// HEADLESS RUN
// ============================================================================

fn headless(backend: BackendKind, frames: u64) -> DemoOptions {
    DemoOptions { frames: Some(frames), headless: true, ..DemoOptions::new(backend) }
}

#[test]
fn test_demo_runs_on_every_headless_backend() {
    for backend in [BackendKind::D3D12, BackendKind::D3D11, BackendKind::OpenGl] {
        let summary = run_demo(&headless(backend, 8)).unwrap();

        // Frame 4 is minimized
        assert_eq!(
            summary,
            DemoSummary { presented_frames: 7, skipped_frames: 1, draw_calls: 7, failed_commands: 0 },
            "{}",
            backend
        );
    }
}

#[test]
fn test_short_run_has_no_window_events() {
    let summary = run_demo(&headless(BackendKind::OpenGl, 3)).unwrap();
    assert_eq!(summary.presented_frames, 3);
    assert_eq!(summary.skipped_frames, 0);
}

#[test]
fn test_vulkan_demo_fails_headless() {
    let result = run_demo(&headless(BackendKind::Vulkan, 1));
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
    assert!(headless_shader(BackendKind::Vulkan).is_err());
}
