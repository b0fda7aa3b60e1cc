//! Unit tests for layout.rs
//!
//! Offsets are checked field by field because shaders read them by byte offset.

use crate::layout::*;
use glam::{Mat4, Vec3};
use std::mem::{align_of, offset_of, size_of};

// ============================================================================
// VERTEX LAYOUT
// ============================================================================

#[test]
fn test_vertex_field_offsets() {
    assert_eq!(offset_of!(Vertex, position), 0);
    assert_eq!(offset_of!(Vertex, normal), 12);
    assert_eq!(offset_of!(Vertex, tangent), 24);
    assert_eq!(offset_of!(Vertex, color), 36);
    assert_eq!(offset_of!(Vertex, uv), 52);
    assert_eq!(offset_of!(Vertex, bone_ids), 60);
    assert_eq!(offset_of!(Vertex, bone_weights), 76);
    assert_eq!(size_of::<Vertex>(), 92);
}

#[test]
fn test_color_vertex_offsets() {
    assert_eq!(offset_of!(ColorVertex, position), 0);
    assert_eq!(offset_of!(ColorVertex, color), 12);
    assert_eq!(size_of::<ColorVertex>(), 28);
}

#[test]
fn test_attribute_tables_match_struct_offsets() {
    let attributes = vertex_attributes(true);
    assert_eq!(attributes.len(), 7);
    assert_eq!(attributes[3].offset as usize, offset_of!(Vertex, color));
    assert_eq!(attributes[5].offset as usize, offset_of!(Vertex, bone_ids));
    assert_eq!(attributes[6].offset as usize, offset_of!(Vertex, bone_weights));
    assert_eq!(vertex_attributes(false).len(), 5);
    assert_eq!(color_vertex_attributes()[1].offset as usize, offset_of!(ColorVertex, color));
}

#[test]
fn test_vertex_helpers() {
    let v = Vertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::Y, [0.5, 0.25])
        .with_bones([1, 2, 0, 0], [0.75, 0.25, 0.0, 0.0]);
    assert_eq!(v.position, [1.0, 2.0, 3.0]);
    assert_eq!(v.bone_ids, [1, 2, 0, 0]);
    let bytes: &[u8] = bytemuck::bytes_of(&v);
    assert_eq!(bytes.len(), 92);
}

// ============================================================================
// CONSTANT BLOCKS
// ============================================================================

#[test]
fn test_object_constants_fit_push_constants() {
    assert_eq!(size_of::<ObjectConstants>(), PUSH_CONSTANT_SIZE as usize);
    assert_eq!(offset_of!(ObjectConstants, normal_matrix), 64);
}

#[test]
fn test_frame_constants_rows_aligned() {
    assert_eq!(offset_of!(FrameConstants, projection), 64);
    assert_eq!(offset_of!(FrameConstants, view_projection), 128);
    assert_eq!(offset_of!(FrameConstants, light_view_projection), 192);
    assert_eq!(offset_of!(FrameConstants, camera_position), 256);
    assert_eq!(offset_of!(FrameConstants, time), 272);
    assert_eq!(size_of::<FrameConstants>(), 288);
}

#[test]
fn test_material_and_lighting_layout() {
    assert_eq!(offset_of!(MaterialConstants, emissive), 16);
    assert_eq!(offset_of!(MaterialConstants, flags), 48);
    assert_eq!(offset_of!(LightingConstants, point_lights), 32);
    assert_eq!(offset_of!(LightingConstants, ambient), 160);
    assert_eq!(offset_of!(LightingConstants, counts), 176);
    assert_eq!(size_of::<LightingConstants>(), 192);
}

#[test]
fn test_constant_blocks_are_16_byte_aligned() {
    assert_eq!(align_of::<ObjectConstants>(), 16);
    assert_eq!(align_of::<FrameConstants>(), 16);
    assert_eq!(align_of::<MaterialConstants>(), 16);
    assert_eq!(align_of::<LightingConstants>(), 16);
    assert_eq!(size_of::<BoneConstants>() % 16, 0);
}

#[test]
fn test_normal_matrix_of_uniform_scale() {
    let constants = ObjectConstants::from_world(Mat4::from_scale(Vec3::splat(2.0)));
    let expected = Mat4::from_scale(Vec3::splat(0.5));
    assert!(constants.normal_matrix.abs_diff_eq(expected, 1e-6));
}

#[test]
fn test_light_frame_constants_project_through_light() {
    let light = Mat4::orthographic_rh(-10.0, 10.0, -10.0, 10.0, 0.1, 50.0)
        * Mat4::look_at_rh(Vec3::new(5.0, 10.0, 5.0), Vec3::ZERO, Vec3::Y);
    let constants = FrameConstants::for_light(light);

    assert_eq!(constants.view_projection, light);
    assert_eq!(constants.light_view_projection, light);
    assert_eq!(constants.projection * constants.view, light);
    assert_eq!(constants.camera_position, glam::Vec4::ZERO);
    assert_eq!(constants.time, glam::Vec4::ZERO);
}
