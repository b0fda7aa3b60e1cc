//! Unit tests for NullDx11Device

use super::*;

fn dynamic_constant(device: &NullDx11Device, size: u32) -> NativeHandle {
    device
        .create_buffer("cb", &BufferResourceDesc { size, bind: BufferBind::Constant, dynamic: true }, None)
        .unwrap()
}

/// Bind the minimum a draw needs; returns the vertex buffer
fn bind_draw_state(device: &NullDx11Device) -> NativeHandle {
    let vs = device.create_vertex_shader(b"vs").unwrap();
    let layout = device
        .create_input_layout(&[InputElement { semantic: "POSITION", format: 6, input_slot: 0, offset: 0 }], b"vs")
        .unwrap();
    let vb = device
        .create_buffer("vb", &BufferResourceDesc { size: 36, bind: BufferBind::Vertex, dynamic: false }, None)
        .unwrap();
    let target = device
        .create_texture2d(
            "target",
            &Texture2DDesc {
                width: 4,
                height: 4,
                array_size: 1,
                format: 28,
                samples: 1,
                cube: false,
                shader_resource: false,
                render_target: true,
                depth_stencil: false,
            },
            &[],
        )
        .unwrap();
    let rtv = device.create_view(target, ViewKind::RenderTarget { format: 28 }).unwrap();
    device.call(ContextCall::VSSetShader(vs));
    device.call(ContextCall::IASetInputLayout(layout));
    device.call(ContextCall::IASetVertexBuffer { slot: 0, buffer: Some(vb), stride: 12 });
    device.call(ContextCall::OMSetRenderTargets { rtv: Some(rtv), dsv: None });
    vb
}

// ============================================================================
// BUFFERS
// ============================================================================

#[test]
fn test_constant_buffer_width_must_be_16_aligned() {
    let device = NullDx11Device::new();
    let desc = BufferResourceDesc { size: 20, bind: BufferBind::Constant, dynamic: true };
    assert_eq!(device.create_buffer("cb", &desc, None), Err(E_INVALIDARG));
}

#[test]
fn test_map_discard_replaces_whole_contents() {
    let device = NullDx11Device::new();
    let buffer = dynamic_constant(&device, 16);
    device.map_discard(buffer, &[7; 16]).unwrap();
    device.map_discard(buffer, &[1, 2]).unwrap();

    let contents = device.buffer_contents(buffer).unwrap();
    assert_eq!(&contents[..2], &[1, 2]);
    assert!(contents[2..].iter().all(|&b| b == 0));
    assert_eq!(device.counters().maps, 2);
}

#[test]
fn test_map_of_default_buffer_is_a_violation() {
    let device = NullDx11Device::new();
    let desc = BufferResourceDesc { size: 16, bind: BufferBind::Vertex, dynamic: false };
    let buffer = device.create_buffer("vb", &desc, None).unwrap();
    assert_eq!(device.map_discard(buffer, &[0; 4]), Err(E_INVALIDARG));
    assert_eq!(device.violations().len(), 1);
}

#[test]
fn test_update_subresource_of_dynamic_buffer_is_a_violation() {
    let device = NullDx11Device::new();
    let buffer = dynamic_constant(&device, 16);
    assert_eq!(device.update_subresource(buffer, 0, &[0; 4]), Err(E_INVALIDARG));
    assert!(!device.violations().is_empty());
}

#[test]
fn test_update_subresource_is_range_checked() {
    let device = NullDx11Device::new();
    let desc = BufferResourceDesc { size: 8, bind: BufferBind::Index, dynamic: false };
    let buffer = device.create_buffer("ib", &desc, Some(&[1; 8])).unwrap();
    device.update_subresource(buffer, 4, &[9; 4]).unwrap();
    assert_eq!(device.buffer_contents(buffer).unwrap(), vec![1, 1, 1, 1, 9, 9, 9, 9]);
    assert_eq!(device.update_subresource(buffer, 6, &[0; 4]), Err(E_INVALIDARG));
}

// ============================================================================
// TEXTURES
// ============================================================================

#[test]
fn test_cube_texture_needs_six_layers() {
    let device = NullDx11Device::new();
    let mut desc = Texture2DDesc {
        width: 2,
        height: 2,
        array_size: 1,
        format: 28,
        samples: 1,
        cube: true,
        shader_resource: true,
        render_target: false,
        depth_stencil: false,
    };
    assert_eq!(device.create_texture2d("sky", &desc, &[]), Err(E_INVALIDARG));
    desc.array_size = 6;
    assert!(device.create_texture2d("sky", &desc, &[]).is_ok());
}

#[test]
fn test_initial_data_must_cover_each_layer() {
    let device = NullDx11Device::new();
    let desc = Texture2DDesc {
        width: 2,
        height: 2,
        array_size: 1,
        format: 28,
        samples: 1,
        cube: false,
        shader_resource: true,
        render_target: false,
        depth_stencil: false,
    };
    let short = [0u8; 12];
    let data = [SubresourceData { bytes: &short, row_pitch: 8 }];
    assert_eq!(device.create_texture2d("t", &desc, &data), Err(E_INVALIDARG));
}

// ============================================================================
// DRAW VALIDATION
// ============================================================================

#[test]
fn test_complete_draw_has_no_violations() {
    let device = NullDx11Device::new();
    bind_draw_state(&device);
    device.call(ContextCall::DrawInstanced { vertex_count: 3, instance_count: 1 });
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    assert_eq!(device.counters().draws, 1);
}

#[test]
fn test_draw_without_shader_is_a_violation() {
    let device = NullDx11Device::new();
    device.call(ContextCall::DrawInstanced { vertex_count: 3, instance_count: 1 });
    let violations = device.violations();
    assert!(violations.iter().any(|v| v.contains("input layout")));
    assert!(violations.iter().any(|v| v.contains("output target")));
}

#[test]
fn test_indexed_draw_needs_index_buffer() {
    let device = NullDx11Device::new();
    bind_draw_state(&device);
    device.call(ContextCall::DrawIndexedInstanced { index_count: 3, instance_count: 1 });
    assert_eq!(device.violations().len(), 1);
}

#[test]
fn test_draw_with_released_binding_is_a_violation() {
    let device = NullDx11Device::new();
    let vb = bind_draw_state(&device);
    device.release(vb);
    device.call(ContextCall::DrawInstanced { vertex_count: 3, instance_count: 1 });
    assert!(device.violations().iter().any(|v| v.contains("released")));
}

#[test]
fn test_double_release_is_a_violation() {
    let device = NullDx11Device::new();
    let sampler = device.create_sampler_state(SamplerKind::LinearWrap).unwrap();
    device.release(sampler);
    device.release(sampler);
    assert_eq!(device.violations().len(), 1);
    assert_eq!(device.live_objects(), 0);
}

// ============================================================================
// SWAPCHAIN
// ============================================================================

#[test]
fn test_resize_with_outstanding_back_buffer_view_fails() {
    let device = NullDx11Device::new();
    let desc = SwapchainDesc { width: 64, height: 64, buffer_count: 2, format: 28 };
    let swapchain = device.create_swapchain(&desc).unwrap();
    let back_buffer = device.swapchain_buffer(swapchain).unwrap();
    let rtv = device.create_view(back_buffer, ViewKind::RenderTarget { format: 28 }).unwrap();
    device.release(back_buffer);

    assert_eq!(device.resize_buffers(swapchain, 32, 32), Err(DXGI_ERROR_INVALID_CALL));
    device.release(rtv);
    device.resize_buffers(swapchain, 32, 32).unwrap();
    assert_eq!(device.swapchain_extent(swapchain), Some((32, 32)));
}

#[test]
fn test_bound_back_buffer_target_blocks_resize() {
    let device = NullDx11Device::new();
    let desc = SwapchainDesc { width: 64, height: 64, buffer_count: 2, format: 28 };
    let swapchain = device.create_swapchain(&desc).unwrap();
    let back_buffer = device.swapchain_buffer(swapchain).unwrap();
    let rtv = device.create_view(back_buffer, ViewKind::RenderTarget { format: 28 }).unwrap();
    device.call(ContextCall::OMSetRenderTargets { rtv: Some(rtv), dsv: None });
    device.release(rtv);
    device.release(back_buffer);

    assert!(device.resize_buffers(swapchain, 32, 32).is_err());
    device.call(ContextCall::OMSetRenderTargets { rtv: None, dsv: None });
    assert!(device.resize_buffers(swapchain, 32, 32).is_ok());
    assert_eq!(device.counters().resizes, 1);
}

#[test]
fn test_present_failure_is_injected_once() {
    let device = NullDx11Device::new();
    let desc = SwapchainDesc { width: 8, height: 8, buffer_count: 2, format: 28 };
    let swapchain = device.create_swapchain(&desc).unwrap();
    device.fail_next_present(crate::d3d11_convert::DXGI_ERROR_DEVICE_REMOVED);
    assert!(device.present(swapchain, 1).is_err());
    assert!(device.present(swapchain, 1).is_ok());
    assert_eq!(device.counters().presents, 1);
}
