use super::*;

// ============================================================================
// HRESULT MAPPING
// ============================================================================

#[test]
fn test_hr_err_out_of_memory() {
    assert_eq!(hr_err("test", "create buffer", E_OUTOFMEMORY), Error::OutOfMemory);
}

#[test]
fn test_hr_err_device_removed_is_device_lost() {
    for hr in [DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_DEVICE_HUNG, DXGI_ERROR_DEVICE_RESET] {
        assert_eq!(hr_err("test", "present", hr), Error::DeviceLost);
    }
}

#[test]
fn test_hr_err_other_codes_are_backend_errors() {
    match hr_err("test", "create view", E_INVALIDARG) {
        Error::BackendError(message) => assert!(message.contains("0x80070057")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_hr_init_err_is_fatal() {
    let error = hr_init_err("test", "create swapchain", DXGI_ERROR_INVALID_CALL);
    assert!(matches!(error, Error::InitializationFailed(_)));
    assert!(error.is_fatal());
}

// ============================================================================
// ENUMS
// ============================================================================

#[test]
fn test_depth_textures_are_typeless_with_float_view() {
    assert_eq!(texture_formats(TextureFormat::Depth32Float), (DXGI_FORMAT_R32_TYPELESS, DXGI_FORMAT_R32_FLOAT));
    assert_eq!(texture_formats(TextureFormat::Rgba8Srgb).0, DXGI_FORMAT_R8G8B8A8_UNORM_SRGB);
}

#[test]
fn test_cull_modes() {
    assert_eq!(cull_mode_to_d3d11(CullMode::None), D3D11_CULL_NONE);
    assert_eq!(cull_mode_to_d3d11(CullMode::Front), D3D11_CULL_FRONT);
    assert_eq!(cull_mode_to_d3d11(CullMode::Back), D3D11_CULL_BACK);
}

#[test]
fn test_index_formats() {
    assert_eq!(index_format_to_dxgi(IndexFormat::U16), DXGI_FORMAT_R16_UINT);
    assert_eq!(index_format_to_dxgi(IndexFormat::U32), DXGI_FORMAT_R32_UINT);
}

#[test]
fn test_topology_and_fill() {
    assert_eq!(topology_to_d3d11(PrimitiveTopology::LineList), D3D11_PRIMITIVE_TOPOLOGY_LINELIST);
    assert_eq!(fill_mode_to_d3d11(RenderMode::Wireframe), D3D11_FILL_WIREFRAME);
    assert_eq!(compare_op_to_d3d11(CompareOp::LessOrEqual), D3D11_COMPARISON_LESS_EQUAL);
}
