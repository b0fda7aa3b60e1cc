use super::*;
use std::sync::Arc;
use tetra_render::{CompareOp, ShaderDesc, ShaderStageDesc};

use crate::d3d11_context::GpuContext;
use crate::null_device::{NullDx11Device, ObjectKind};

fn dxbc() -> Vec<u8> {
    let mut bytes = b"DXBC".to_vec();
    bytes.resize(64, 0);
    bytes
}

fn shader(ctx: &Arc<GpuContext>) -> Arc<Dx11Shader> {
    Dx11Shader::create(
        ctx,
        &ShaderDesc {
            label: "lit".to_string(),
            vertex: ShaderStageDesc::new(dxbc()),
            fragment: ShaderStageDesc::new(dxbc()),
            layout: VertexLayout::Standard,
        },
    )
    .unwrap()
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

#[test]
fn test_skinned_layout_adds_bone_elements() {
    let standard = input_elements(VertexLayout::Standard);
    let skinned = input_elements(VertexLayout::Skinned);
    assert_eq!(skinned.len(), standard.len() + 2);
    assert!(skinned.iter().any(|e| e.semantic == "BLENDINDICES" && e.offset == 60));
    assert!(skinned.iter().all(|e| e.input_slot == 0));
}

#[test]
fn test_color_layout_has_position_and_color() {
    let elements = input_elements(VertexLayout::PositionColor);
    let semantics: Vec<&str> = elements.iter().map(|e| e.semantic).collect();
    assert_eq!(semantics, vec!["POSITION", "COLOR"]);
}

#[test]
fn test_skybox_depth_desc() {
    let desc = depth_stencil_desc(DepthState { test: true, write: false, compare: CompareOp::LessOrEqual });
    assert!(desc.depth_enable);
    assert!(!desc.depth_write);
    assert_eq!(desc.depth_func, crate::d3d11_convert::D3D11_COMPARISON_LESS_EQUAL);
}

// ============================================================================
// CACHE
// ============================================================================

#[test]
fn test_rasterizer_states_are_shared_per_combination() {
    let device = NullDx11Device::new();
    let mut cache = StateCache::new();
    let a = cache.rasterizer_state(&device, RenderMode::Solid, CullMode::Back).unwrap();
    let b = cache.rasterizer_state(&device, RenderMode::Solid, CullMode::Back).unwrap();
    let c = cache.rasterizer_state(&device, RenderMode::Wireframe, CullMode::Back).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(device.counters().rasterizer_states_created, 2);
}

#[test]
fn test_input_layouts_are_keyed_by_shader_and_layout() {
    let device = Arc::new(NullDx11Device::new());
    let ctx = GpuContext::new(device.clone());
    let shader = shader(&ctx);
    let mut cache = StateCache::new();

    let standard = cache.input_layout(device.as_ref(), &shader, VertexLayout::Standard).unwrap();
    let again = cache.input_layout(device.as_ref(), &shader, VertexLayout::Standard).unwrap();
    let skinned = cache.input_layout(device.as_ref(), &shader, VertexLayout::Skinned).unwrap();
    assert_eq!(standard, again);
    assert_ne!(standard, skinned);
    assert_eq!(device.counters().input_layouts_created, 2);
}

#[test]
fn test_clear_releases_every_state_object() {
    let device = Arc::new(NullDx11Device::new());
    let ctx = GpuContext::new(device.clone());
    let shader = shader(&ctx);
    let mut cache = StateCache::new();
    cache.rasterizer_state(device.as_ref(), RenderMode::Solid, CullMode::None).unwrap();
    cache.depth_state(device.as_ref(), DepthState::DEFAULT).unwrap();
    cache.input_layout(device.as_ref(), &shader, VertexLayout::Standard).unwrap();
    assert_eq!(cache.len(), 3);

    cache.clear(device.as_ref());
    assert_eq!(cache.len(), 0);
    assert_eq!(device.live_objects_of(ObjectKind::RasterizerState), 0);
    assert_eq!(device.live_objects_of(ObjectKind::DepthStencilState), 0);
    assert_eq!(device.live_objects_of(ObjectKind::InputLayout), 0);
    assert!(device.violations().is_empty());
}
