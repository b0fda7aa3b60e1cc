use super::*;
use crate::d3d12_convert::{
    D3D12_CULL_MODE_BACK, D3D12_CULL_MODE_FRONT, D3D12_CULL_MODE_NONE, D3D12_FILL_MODE_SOLID,
    D3D12_FILL_MODE_WIREFRAME, DXGI_FORMAT_R32G32B32A32_UINT, DXGI_FORMAT_R32G32B32_FLOAT,
};
use crate::null_device::NullDx12Device;
use tetra_render::{PassKind, PipelineState, RenderFace, ShaderDesc, ShaderStageDesc};

fn key(pass: PassKind, mode: RenderMode, target: TargetKind, samples: u32) -> PipelineKey {
    PipelineKey {
        shader: ResourceId(11),
        raster: PipelineState::for_pass(pass).raster_key(mode, RenderFace::Front, VertexLayout::Standard),
        target,
        samples,
    }
}

fn dxbc() -> Vec<u8> {
    let mut bytes = b"DXBC".to_vec();
    bytes.resize(64, 0);
    bytes
}

fn shader() -> Dx12Shader {
    Dx12Shader::create(&ShaderDesc {
        label: "lit".to_string(),
        vertex: ShaderStageDesc::new(dxbc()),
        fragment: ShaderStageDesc::new(dxbc()),
        layout: VertexLayout::Standard,
    })
    .unwrap()
}

// ============================================================================
// ROOT SIGNATURE
// ============================================================================

#[test]
fn test_root_signature_layout() {
    let desc = root_signature_desc();
    assert_eq!(desc.parameters.len(), 6);
    assert_eq!(desc.parameters[0], RootParameter::Constants { register: 0, values: 32 });
    assert_eq!(desc.parameters[4], RootParameter::ConstantBufferView { register: 4 });
    assert_eq!(
        desc.parameters[ROOT_TEXTURE_TABLE as usize],
        RootParameter::ShaderResourceTable { base_register: 0, count: 5 }
    );
    assert!(desc.static_samplers.iter().any(|s| s.comparison));
}

#[test]
fn test_cbv_sizes_are_256_aligned() {
    assert_eq!(CBV_SIZES, [512, 256, 256, 4096]);
    assert_eq!(MAX_CBV_SIZE, 4096);
}

// ============================================================================
// INPUT LAYOUT AND RASTER
// ============================================================================

#[test]
fn test_skinned_input_layout() {
    let elements = input_layout(VertexLayout::Skinned);
    assert_eq!(elements.len(), 7);
    assert_eq!(elements[0].format, DXGI_FORMAT_R32G32B32_FLOAT);
    assert_eq!(elements[5].semantic, "BLENDINDICES");
    assert_eq!(elements[5].format, DXGI_FORMAT_R32G32B32A32_UINT);
    assert!(elements.iter().all(|e| e.input_slot == 0));
}

#[test]
fn test_main_rasterizer() {
    let desc = rasterizer_desc(&key(PassKind::Main, RenderMode::Wireframe, TargetKind::Main, 4), (1.25, 1.75));
    assert_eq!(desc.fill_mode, D3D12_FILL_MODE_WIREFRAME);
    assert_eq!(desc.cull_mode, D3D12_CULL_MODE_BACK);
    assert_eq!(desc.depth_bias, 0);
}

#[test]
fn test_shadow_rasterizer_is_solid_with_bias() {
    let desc = rasterizer_desc(&key(PassKind::Shadow, RenderMode::Wireframe, TargetKind::Shadow, 1), (1.25, 1.75));
    assert_eq!(desc.fill_mode, D3D12_FILL_MODE_SOLID);
    assert_eq!(desc.cull_mode, D3D12_CULL_MODE_FRONT);
    assert_eq!(desc.depth_bias, 2);
    assert_eq!(desc.slope_scaled_depth_bias, 1.75);
}

#[test]
fn test_skybox_disables_culling() {
    let desc = rasterizer_desc(&key(PassKind::Skybox, RenderMode::Solid, TargetKind::Main, 1), (0.0, 0.0));
    assert_eq!(desc.cull_mode, D3D12_CULL_MODE_NONE);
}

// ============================================================================
// CACHE
// ============================================================================

#[test]
fn test_cache_creates_once_per_key() {
    let device = NullDx12Device::new();
    let root = device.create_root_signature(&root_signature_desc()).unwrap();
    let shader = shader();
    let mut cache = PipelineCache::new();

    let main = key(PassKind::Main, RenderMode::Solid, TargetKind::Main, 4);
    let first = cache.get_or_create(&device, main, &shader, root, (1.0, 1.0)).unwrap();
    let again = cache.get_or_create(&device, main, &shader, root, (1.0, 1.0)).unwrap();
    assert_eq!(first, again);

    let wire = key(PassKind::Main, RenderMode::Wireframe, TargetKind::Main, 4);
    let other = cache.get_or_create(&device, wire, &shader, root, (1.0, 1.0)).unwrap();
    assert_ne!(first, other);
    assert_eq!(cache.len(), 2);
    assert_eq!(device.counters().pipelines_created, 2);

    cache.clear(&device);
    device.release(root);
    assert!(cache.is_empty());
    assert_eq!(device.live_objects(), 0);
}

#[test]
fn test_shadow_pso_is_depth_only() {
    let device = NullDx12Device::new();
    let root = device.create_root_signature(&root_signature_desc()).unwrap();
    let mut cache = PipelineCache::new();
    // The null device rejects a pixel shader without a render target and vice versa
    let shadow = key(PassKind::Shadow, RenderMode::Solid, TargetKind::Shadow, 4);
    assert!(cache.get_or_create(&device, shadow, &shader(), root, (1.25, 1.75)).is_ok());
}

#[test]
fn test_oversampled_pso_is_rejected() {
    let device = NullDx12Device::new().with_max_samples(4);
    let root = device.create_root_signature(&root_signature_desc()).unwrap();
    let mut cache = PipelineCache::new();
    let result = cache.get_or_create(&device, key(PassKind::Main, RenderMode::Solid, TargetKind::Main, 8), &shader(), root, (0.0, 0.0));
    assert!(matches!(result, Err(tetra_render::Error::BackendError(_))));
    assert!(cache.is_empty());
}
