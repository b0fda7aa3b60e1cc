//! Unit tests for config.rs and BackendKind parsing

use crate::renderer::{BackendKind, RendererConfig, ShadowConfig};

#[test]
fn test_config_defaults() {
    let config = RendererConfig::default();
    assert_eq!(config.frames_in_flight, 2);
    assert_eq!(config.frames_in_flight(), 2);
    assert_eq!(config.width, 1280);
    assert!(config.vsync);
    assert_eq!(config.shadow, ShadowConfig::default());
    assert!(!config.shadow.enabled);
}

#[test]
fn test_frames_in_flight_clamped() {
    let mut config = RendererConfig::default();
    config.frames_in_flight = 0;
    assert_eq!(config.frames_in_flight(), 1);
    config.frames_in_flight = 9;
    assert_eq!(config.frames_in_flight(), 3);
}

#[test]
fn test_msaa_clamped_to_power_of_two() {
    let mut config = RendererConfig::default();
    assert_eq!(config.msaa_samples(8), 4);
    assert_eq!(config.msaa_samples(2), 2);
    config.msaa_samples = 6;
    assert_eq!(config.msaa_samples(8), 4);
    config.msaa_samples = 0;
    assert_eq!(config.msaa_samples(8), 1);
}

#[test]
fn test_backend_from_str_aliases() {
    assert_eq!("vulkan".parse::<BackendKind>(), Ok(BackendKind::Vulkan));
    assert_eq!("VK".parse::<BackendKind>(), Ok(BackendKind::Vulkan));
    assert_eq!("dx12".parse::<BackendKind>(), Ok(BackendKind::D3D12));
    assert_eq!("D3D11".parse::<BackendKind>(), Ok(BackendKind::D3D11));
    assert_eq!("gl".parse::<BackendKind>(), Ok(BackendKind::OpenGl));
    assert!("metal".parse::<BackendKind>().is_err());
}

#[test]
fn test_backend_from_args() {
    assert_eq!(BackendKind::from_args(["demo", "--backend", "gl"]), Ok(BackendKind::OpenGl));
    assert_eq!(BackendKind::from_args(["demo", "--backend=dx11"]), Ok(BackendKind::D3D11));
    assert_eq!(BackendKind::from_args(["demo"]), Ok(BackendKind::platform_default()));
    assert!(BackendKind::from_args(["demo", "--backend"]).is_err());
}

#[test]
fn test_backend_display_round_trips() {
    for kind in BackendKind::ALL {
        assert_eq!(kind.to_string().parse::<BackendKind>(), Ok(kind));
    }
}
