use super::*;
use tetra_render::layout::{COLOR_VERTEX_STRIDE, VERTEX_STRIDE};
use tetra_render::{CullMode, PassKind, PipelineState, RenderFace};

fn key(pass: PassKind, mode: RenderMode, target: TargetKind, samples: u32) -> PipelineKey {
    PipelineKey {
        shader: ResourceId(7),
        raster: PipelineState::for_pass(pass).raster_key(mode, RenderFace::Front, VertexLayout::Standard),
        target,
        samples,
    }
}

const FEATURES: PipelineFeatures = PipelineFeatures { fill_mode_non_solid: true, depth_bias: (1.25, 1.75) };

#[test]
fn test_uniform_ranges_follow_constant_blocks() {
    assert_eq!(UNIFORM_RANGES, [288, 64, 192, 4096]);
    assert_eq!(MAX_UNIFORM_RANGE, *UNIFORM_RANGES.iter().max().unwrap());
    assert_eq!(TEXTURE_BINDINGS, 5);
}

#[test]
fn test_standard_vertex_input() {
    let input = vertex_input(VertexLayout::Standard);
    assert_eq!(input.binding.stride, VERTEX_STRIDE);
    assert_eq!(input.attributes.len(), 5);
    assert_eq!(input.attributes[0].format, vk::Format::R32G32B32_SFLOAT);
    assert_eq!(input.attributes[4].offset, 52);
    assert!(input.attributes.iter().all(|a| a.binding == 0));
}

#[test]
fn test_skinned_vertex_input_reads_bones() {
    let input = vertex_input(VertexLayout::Skinned);
    assert_eq!(input.binding.stride, VERTEX_STRIDE);
    assert_eq!(input.attributes.len(), 7);
    assert_eq!(input.attributes[5].format, vk::Format::R32G32B32A32_UINT);
    assert_eq!(input.attributes[5].offset, 60);
    assert_eq!(input.attributes[6].offset, 76);
}

#[test]
fn test_color_vertex_input() {
    let input = vertex_input(VertexLayout::PositionColor);
    assert_eq!(input.binding.stride, COLOR_VERTEX_STRIDE);
    assert_eq!(input.attributes.len(), 2);
    assert_eq!(input.attributes[1].format, vk::Format::R32G32B32A32_SFLOAT);
}

#[test]
fn test_main_raster_settings() {
    let settings = RasterSettings::new(&key(PassKind::Main, RenderMode::Wireframe, TargetKind::Main, 4), &FEATURES);
    assert_eq!(settings.polygon_mode, vk::PolygonMode::LINE);
    assert_eq!(settings.cull_mode, vk::CullModeFlags::BACK);
    assert_eq!(settings.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
    assert_eq!(settings.depth_bias, None);
    assert_eq!(settings.samples, vk::SampleCountFlags::TYPE_4);
}

#[test]
fn test_wireframe_without_feature_stays_solid() {
    let features = PipelineFeatures { fill_mode_non_solid: false, ..FEATURES };
    let settings = RasterSettings::new(&key(PassKind::Main, RenderMode::Wireframe, TargetKind::Main, 1), &features);
    assert_eq!(settings.polygon_mode, vk::PolygonMode::FILL);
}

#[test]
fn test_shadow_raster_settings() {
    let settings = RasterSettings::new(&key(PassKind::Shadow, RenderMode::Wireframe, TargetKind::Shadow, 8), &FEATURES);
    assert_eq!(settings.polygon_mode, vk::PolygonMode::FILL);
    assert_eq!(settings.cull_mode, vk::CullModeFlags::FRONT);
    assert_eq!(settings.depth_bias, Some((1.25, 1.75)));
    assert_eq!(settings.samples, vk::SampleCountFlags::TYPE_1);
}

#[test]
fn test_debug_line_settings() {
    let raster_key = key(PassKind::DebugLine, RenderMode::Solid, TargetKind::Main, 1);
    assert_eq!(raster_key.raster.layout, VertexLayout::PositionColor);
    assert_eq!(raster_key.raster.cull, CullMode::None);

    let settings = RasterSettings::new(&raster_key, &FEATURES);
    assert_eq!(settings.topology, vk::PrimitiveTopology::LINE_LIST);
    assert_eq!(settings.cull_mode, vk::CullModeFlags::NONE);
}

#[test]
fn test_keys_differ_by_face_and_samples() {
    let base = key(PassKind::Main, RenderMode::Solid, TargetKind::Main, 4);
    let mut back = base;
    back.raster = PipelineState::MAIN.raster_key(RenderMode::Solid, RenderFace::Back, VertexLayout::Standard);
    let mut single = base;
    single.samples = 1;

    assert_ne!(base, back);
    assert_ne!(base, single);
    assert_eq!(base, key(PassKind::Main, RenderMode::Solid, TargetKind::Main, 4));
}
